//! Landmark alignment, affine warping and paste-back blending

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::{filter, morphology};

use crate::swap::{Point, SwapError};

/// Crop size the ArcFace template is defined for
pub const ARCFACE_SIZE: u32 = 112;

/// ArcFace five-point template for a 112x112 crop
pub const ARCFACE_TEMPLATE: [Point; 5] = [
    Point::new(38.2946, 51.6963),
    Point::new(73.5318, 51.5014),
    Point::new(56.0252, 71.7366),
    Point::new(41.5493, 92.3655),
    Point::new(70.7299, 92.2041),
];

/// Landmark template scaled to a square crop of `size` pixels
///
/// Sizes that are a multiple of 112 scale the template directly; others are
/// treated as a 128 crop with the face shifted right.
pub fn template_for(size: u32) -> [Point; 5] {
    let (ratio, diff_x) = if size % ARCFACE_SIZE == 0 {
        (size as f32 / ARCFACE_SIZE as f32, 0.0)
    } else {
        let ratio = size as f32 / 128.0;
        (ratio, 8.0 * ratio)
    };
    ARCFACE_TEMPLATE.map(|p| Point::new(p.x * ratio + diff_x, p.y * ratio))
}

/// 2x3 affine matrix: x' = a*x + b*y + c, y' = d*x + e*y + f
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.b * p.y + self.c,
            self.d * p.x + self.e * p.y + self.f,
        )
    }

    pub fn invert(&self) -> Result<Self, SwapError> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < 1e-8 {
            return Err(SwapError::DegenerateLandmarks);
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Ok(Self {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }

    /// Same transform as an imageproc projection
    fn to_projection(self) -> Result<Projection, SwapError> {
        Projection::from_matrix([self.a, self.b, self.c, self.d, self.e, self.f, 0.0, 0.0, 1.0])
            .ok_or(SwapError::DegenerateLandmarks)
    }
}

/// Least-squares similarity transform (rotation, uniform scale, translation)
/// mapping `src` onto `dst`
pub fn estimate_similarity(src: &[Point], dst: &[Point]) -> Result<AffineTransform, SwapError> {
    if src.len() != dst.len() || src.len() < 2 {
        return Err(SwapError::DegenerateLandmarks);
    }
    let n = src.len() as f32;
    let mean = |pts: &[Point]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
        Point::new(sx / n, sy / n)
    };
    let src_mean = mean(src);
    let dst_mean = mean(dst);

    let mut variance = 0.0f32;
    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    for (p, q) in src.iter().zip(dst) {
        let (px, py) = (p.x - src_mean.x, p.y - src_mean.y);
        let (qx, qy) = (q.x - dst_mean.x, q.y - dst_mean.y);
        variance += px * px + py * py;
        dot += px * qx + py * qy;
        cross += px * qy - py * qx;
    }
    if variance < 1e-6 {
        return Err(SwapError::DegenerateLandmarks);
    }

    let cos = dot / variance;
    let sin = cross / variance;
    Ok(AffineTransform {
        a: cos,
        b: -sin,
        c: dst_mean.x - (cos * src_mean.x - sin * src_mean.y),
        d: sin,
        e: cos,
        f: dst_mean.y - (sin * src_mean.x + cos * src_mean.y),
    })
}

/// Warp `image` into a `width` x `height` raster using `transform`
/// (source to destination coordinates). Pixels mapping outside `image` are black.
pub fn warp_affine(
    image: &RgbImage,
    transform: &AffineTransform,
    width: u32,
    height: u32,
) -> Result<RgbImage, SwapError> {
    let projection = transform.to_projection()?;
    let mut output = RgbImage::new(width, height);
    warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut output);
    Ok(output)
}

/// Crop a face to a `size` x `size` raster aligned to the landmark template.
/// Also returns the image-to-crop transform.
pub fn align_face(
    image: &RgbImage,
    landmarks: &[Point; 5],
    size: u32,
) -> Result<(RgbImage, AffineTransform), SwapError> {
    let transform = estimate_similarity(landmarks, &template_for(size))?;
    let crop = warp_affine(image, &transform, size, size)?;
    Ok((crop, transform))
}

/// Mask values above this count as fully inside the warped crop
const MASK_THRESHOLD: u8 = 20;

/// Blend a swapped face crop back into `target`
///
/// `to_crop` maps target coordinates into crop coordinates. The crop
/// footprint becomes a mask that is eroded and feathered before blending.
pub fn paste_back(
    target: &RgbImage,
    crop: &RgbImage,
    to_crop: &AffineTransform,
) -> Result<RgbImage, SwapError> {
    let from_crop = to_crop.invert()?;
    let (cw, ch) = (crop.width() as f32, crop.height() as f32);
    let corners = [
        Point::new(0.0, 0.0),
        Point::new(cw, 0.0),
        Point::new(0.0, ch),
        Point::new(cw, ch),
    ]
    .map(|p| from_crop.apply(p));

    let min_x = corners.iter().map(|p| p.x).fold(f32::MAX, f32::min);
    let max_x = corners.iter().map(|p| p.x).fold(f32::MIN, f32::max);
    let min_y = corners.iter().map(|p| p.y).fold(f32::MAX, f32::min);
    let max_y = corners.iter().map(|p| p.y).fold(f32::MIN, f32::max);

    // Region of interest: the crop footprint plus a small border, clipped
    let (tw, th) = (target.width() as i64, target.height() as i64);
    let x0 = ((min_x.floor() as i64) - 2).clamp(0, tw);
    let y0 = ((min_y.floor() as i64) - 2).clamp(0, th);
    let x1 = ((max_x.ceil() as i64) + 2).clamp(0, tw);
    let y1 = ((max_y.ceil() as i64) + 2).clamp(0, th);
    if x1 <= x0 || y1 <= y0 {
        return Ok(target.clone());
    }
    let (rw, rh) = ((x1 - x0) as u32, (y1 - y0) as u32);

    // Crop coordinates to region coordinates
    let to_region = AffineTransform {
        c: from_crop.c - x0 as f32,
        f: from_crop.f - y0 as f32,
        ..from_crop
    }
    .to_projection()?;

    let mut fake = RgbImage::new(rw, rh);
    warp_into(crop, &to_region, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut fake);

    let white = GrayImage::from_pixel(crop.width(), crop.height(), Luma([255]));
    let mut mask = GrayImage::new(rw, rh);
    warp_into(&white, &to_region, Interpolation::Bilinear, Luma([0]), &mut mask);

    let mut full: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if pixel[0] > MASK_THRESHOLD {
            pixel[0] = 255;
            full = Some(match full {
                None => (x, y, x, y),
                Some((fx0, fy0, fx1, fy1)) => (fx0.min(x), fy0.min(y), fx1.max(x), fy1.max(y)),
            });
        }
    }
    let Some((fx0, fy0, fx1, fy1)) = full else {
        return Ok(target.clone());
    };

    let mask_size = (((fy1 - fy0) * (fx1 - fx0)) as f32).sqrt() as u32;
    // Square kernel of side erode_size, as a radius
    let erode_size = (mask_size / 10).max(10);
    let radius = (erode_size / 2).min(u8::MAX as u32) as u8;
    let eroded = morphology::erode(&mask, Norm::LInf, radius);

    let blur_size = 2 * (mask_size / 20).max(5) + 1;
    let sigma = 0.3 * ((blur_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let feathered = filter::gaussian_blur_f32(&eroded, sigma);

    let mut output = target.clone();
    for (rx, ry, m) in feathered.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }
        let m = m[0] as f32 / 255.0;
        let f = fake.get_pixel(rx, ry);
        let pixel = output.get_pixel_mut(x0 as u32 + rx, y0 as u32 + ry);
        for c in 0..3 {
            let blended = m * f[c] as f32 + (1.0 - m) * pixel[c] as f32;
            pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn test_template_for_inswapper_crop() {
        let template = template_for(128);
        assert!((template[0].x - (38.2946 + 8.0)).abs() < 1e-4);
        assert!((template[0].y - 51.6963).abs() < 1e-4);
        assert_eq!(template_for(ARCFACE_SIZE), ARCFACE_TEMPLATE);
    }

    #[test]
    fn test_similarity_recovers_known_transform() {
        let angle = 0.3f32;
        let scale = 1.7f32;
        let known = AffineTransform {
            a: scale * angle.cos(),
            b: -scale * angle.sin(),
            c: 12.0,
            d: scale * angle.sin(),
            e: scale * angle.cos(),
            f: -4.0,
        };
        let src = ARCFACE_TEMPLATE;
        let dst = src.map(|p| known.apply(p));

        let estimated = estimate_similarity(&src, &dst).unwrap();
        for (p, q) in src.iter().zip(dst.iter()) {
            assert!(close(estimated.apply(*p), *q));
        }
        let det = estimated.a * estimated.e - estimated.b * estimated.d;
        assert!((det.sqrt() - scale).abs() < 1e-3);
    }

    #[test]
    fn test_similarity_rejects_coincident_points() {
        let src = [Point::new(5.0, 5.0); 5];
        assert!(matches!(
            estimate_similarity(&src, &ARCFACE_TEMPLATE),
            Err(SwapError::DegenerateLandmarks)
        ));
    }

    #[test]
    fn test_invert_round_trips_point() {
        let t = AffineTransform { a: 2.0, b: -0.5, c: 3.0, d: 0.5, e: 2.0, f: -7.0 };
        let inv = t.invert().unwrap();
        let p = Point::new(13.0, -2.5);
        assert!(close(inv.apply(t.apply(p)), p));
    }

    #[test]
    fn test_warp_translation_and_zero_border() {
        let image = RgbImage::from_fn(6, 6, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 200]));
        let shift = AffineTransform { c: 1.0, ..AffineTransform::IDENTITY };
        let warped = warp_affine(&image, &shift, 6, 6).unwrap();

        assert_eq!(warped.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(warped.get_pixel(1, 2), image.get_pixel(0, 2));
        assert_eq!(warped.get_pixel(3, 3), image.get_pixel(2, 3));
    }

    #[test]
    fn test_paste_back_blends_centre_and_keeps_far_pixels() {
        let target = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
        let crop = RgbImage::from_pixel(128, 128, Rgb([255, 255, 255]));
        // Crop placed at (36, 36) in the target
        let to_crop = AffineTransform { c: -36.0, f: -36.0, ..AffineTransform::IDENTITY };

        let result = paste_back(&target, &crop, &to_crop).unwrap();
        assert_eq!(result.get_pixel(100, 100), &Rgb([255, 255, 255]));
        assert_eq!(result.get_pixel(5, 5), &Rgb([0, 0, 0]));
        assert_eq!(result.get_pixel(195, 100), &Rgb([0, 0, 0]));
        // Feathered edge sits between the two
        let edge = result.get_pixel(44, 100)[0];
        assert!(edge < 255);
    }

    #[test]
    fn test_paste_back_erodes_crop_border() {
        let target = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
        let crop = RgbImage::from_pixel(128, 128, Rgb([255, 255, 255]));
        let to_crop = AffineTransform { c: -36.0, f: -36.0, ..AffineTransform::IDENTITY };

        let result = paste_back(&target, &crop, &to_crop).unwrap();
        // Just inside the crop edge the mask has been eroded away
        assert!(result.get_pixel(37, 100)[0] < 64);
        assert!(result.get_pixel(100, 37)[0] < 64);
        assert!(result.get_pixel(60, 100)[0] > 240);
    }

    #[test]
    fn test_paste_back_outside_target_is_noop() {
        let target = RgbImage::from_pixel(50, 50, Rgb([10, 20, 30]));
        let crop = RgbImage::from_pixel(16, 16, Rgb([255, 0, 0]));
        let to_crop = AffineTransform { c: 500.0, f: 500.0, ..AffineTransform::IDENTITY };

        let result = paste_back(&target, &crop, &to_crop).unwrap();
        assert_eq!(result, target);
    }
}
