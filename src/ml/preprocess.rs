//! Image to tensor conversion

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// Resize `image` to fit a `size` x `size` canvas, anchored top-left.
///
/// Returns the canvas and the scale from image to canvas coordinates.
pub fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, f32) {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = if height > width {
        let new_width = ((size as f32 * width as f32 / height as f32) as u32).max(1);
        (new_width, size)
    } else {
        let new_height = ((size as f32 * height as f32 / width as f32) as u32).max(1);
        (size, new_height)
    };
    let scale = new_height as f32 / height as f32;

    let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
    let mut canvas = RgbImage::new(size, size);
    imageops::replace(&mut canvas, &resized, 0, 0);
    (canvas, scale)
}

/// NCHW RGB blob with `(px - mean) / std` normalisation
pub fn blob_from_image(image: &RgbImage, mean: f32, std: f32) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut blob = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            blob[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - mean) / std;
        }
    }
    blob
}
