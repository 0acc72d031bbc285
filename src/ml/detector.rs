//! SCRFD face detector (`det_10g.onnx`)

use std::path::Path;

use image::RgbImage;
use ort::session::Session;
use parking_lot::Mutex;

use super::preprocess::{blob_from_image, letterbox};
use super::ModelConfig;
use crate::swap::{BoundingBox, DetectedFace, Point, SwapError, LANDMARK_COUNT};

const MODEL_NAME: &str = "face detector";

/// Feature map strides of the three detection heads
pub const STRIDES: [u32; 3] = [8, 16, 32];

/// Anchors per feature map cell
pub const ANCHORS_PER_CELL: usize = 2;

/// Raw outputs of one detection head
pub struct StrideOutput<'a> {
    pub stride: u32,
    /// One score per anchor
    pub scores: &'a [f32],
    /// Four box distances per anchor (left, top, right, bottom)
    pub boxes: &'a [f32],
    /// Ten landmark offsets per anchor
    pub landmarks: &'a [f32],
}

/// Decode detection heads into faces in input-canvas coordinates
pub fn decode_outputs(
    heads: &[StrideOutput<'_>],
    input_size: u32,
    score_threshold: f32,
) -> Result<Vec<DetectedFace>, SwapError> {
    let mut faces = Vec::new();

    for head in heads {
        let cells = (input_size / head.stride) as usize;
        let anchors = cells * cells * ANCHORS_PER_CELL;
        if head.scores.len() < anchors
            || head.boxes.len() < anchors * 4
            || head.landmarks.len() < anchors * LANDMARK_COUNT * 2
        {
            return Err(SwapError::UnexpectedOutput {
                model: MODEL_NAME,
                message: format!(
                    "stride {} expects {} anchors, got {} scores",
                    head.stride,
                    anchors,
                    head.scores.len()
                ),
            });
        }

        let stride = head.stride as f32;
        for (i, &score) in head.scores.iter().take(anchors).enumerate() {
            if score < score_threshold {
                continue;
            }
            let cell = i / ANCHORS_PER_CELL;
            let cx = (cell % cells) as f32 * stride;
            let cy = (cell / cells) as f32 * stride;

            let d = &head.boxes[i * 4..i * 4 + 4];
            let bbox = BoundingBox {
                x1: cx - d[0] * stride,
                y1: cy - d[1] * stride,
                x2: cx + d[2] * stride,
                y2: cy + d[3] * stride,
            };

            let k = &head.landmarks[i * LANDMARK_COUNT * 2..(i + 1) * LANDMARK_COUNT * 2];
            let landmarks = std::array::from_fn(|j| {
                Point::new(cx + k[j * 2] * stride, cy + k[j * 2 + 1] * stride)
            });

            faces.push(DetectedFace {
                bbox,
                score,
                landmarks,
            });
        }
    }

    Ok(faces)
}

/// Greedy non-maximum suppression; output is sorted by descending score
pub fn non_max_suppression(mut faces: Vec<DetectedFace>, iou_threshold: f32) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<DetectedFace> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| k.bbox.iou(&face.bbox) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}

/// SCRFD detector session
pub struct ScrfdDetector {
    session: Mutex<Session>,
    input_size: u32,
    score_threshold: f32,
    nms_threshold: f32,
}

impl ScrfdDetector {
    pub fn load(path: &Path, config: &ModelConfig) -> Result<Self, SwapError> {
        let session = super::build_session(path, MODEL_NAME, config)?;
        Ok(Self {
            session: Mutex::new(session),
            input_size: config.detection_size,
            score_threshold: config.detection_threshold,
            nms_threshold: config.nms_threshold,
        })
    }

    /// Detect faces, best first
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, SwapError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SwapError::InvalidImage("empty image".into()));
        }

        let (canvas, scale) = letterbox(image, self.input_size);
        let blob = blob_from_image(&canvas, 127.5, 128.0);
        let outputs = self.run(blob)?;

        let head_count = STRIDES.len();
        if outputs.len() < head_count * 3 {
            return Err(SwapError::UnexpectedOutput {
                model: MODEL_NAME,
                message: format!("expected {} outputs, got {}", head_count * 3, outputs.len()),
            });
        }
        let heads: Vec<StrideOutput<'_>> = STRIDES
            .iter()
            .enumerate()
            .map(|(idx, &stride)| StrideOutput {
                stride,
                scores: &outputs[idx],
                boxes: &outputs[idx + head_count],
                landmarks: &outputs[idx + head_count * 2],
            })
            .collect();

        let faces = decode_outputs(&heads, self.input_size, self.score_threshold)?;
        let mut faces = non_max_suppression(faces, self.nms_threshold);

        let inverse = 1.0 / scale;
        for face in &mut faces {
            face.bbox = face.bbox.scaled(inverse);
            for point in &mut face.landmarks {
                point.x *= inverse;
                point.y *= inverse;
            }
        }
        Ok(faces)
    }

    fn run(&self, blob: ndarray::Array4<f32>) -> Result<Vec<Vec<f32>>, SwapError> {
        let inference_error = |e: ort::Error| SwapError::Inference {
            model: MODEL_NAME,
            message: e.to_string(),
        };

        let input_tensor = ort::value::Tensor::from_array(blob).map_err(inference_error)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(inference_error)?;

        let mut tensors = Vec::new();
        for (_name, value) in outputs.iter() {
            let (_shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(inference_error)?;
            tensors.push(data.to_vec());
        }
        Ok(tensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, size: f32, score: f32) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox { x1, y1, x2: x1 + size, y2: y1 + size },
            score,
            landmarks: [Point::default(); LANDMARK_COUNT],
        }
    }

    #[test]
    fn test_nms_suppresses_overlaps_and_sorts() {
        let faces = vec![
            face(0.0, 0.0, 100.0, 0.7),
            face(2.0, 2.0, 100.0, 0.9),
            face(300.0, 300.0, 50.0, 0.8),
        ];
        let kept = non_max_suppression(faces, 0.4);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.8);
    }

    #[test]
    fn test_decode_single_anchor() {
        // 32x32 canvas: stride 8 -> 4x4 cells, 32 anchors
        let input_size = 32;
        let stride = 8u32;
        let anchors = 4 * 4 * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut boxes = vec![0.0f32; anchors * 4];
        let mut landmarks = vec![0.0f32; anchors * 10];

        // Second anchor of cell (x=2, y=1)
        let idx = (1 * 4 + 2) * ANCHORS_PER_CELL + 1;
        scores[idx] = 0.95;
        boxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 0.5, 1.0, 2.0]);
        landmarks[idx * 10] = 0.25;
        landmarks[idx * 10 + 1] = -0.5;

        let heads = [StrideOutput {
            stride,
            scores: &scores,
            boxes: &boxes,
            landmarks: &landmarks,
        }];
        let faces = decode_outputs(&heads, input_size, 0.5).unwrap();

        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        // Anchor centre (16, 8)
        assert_eq!(f.bbox, BoundingBox { x1: 8.0, y1: 4.0, x2: 24.0, y2: 24.0 });
        assert_eq!(f.landmarks[0], Point::new(18.0, 4.0));
        assert_eq!(f.landmarks[1], Point::new(16.0, 8.0));
    }

    #[test]
    fn test_decode_rejects_short_head() {
        let heads = [StrideOutput {
            stride: 8,
            scores: &[0.9; 3],
            boxes: &[0.0; 12],
            landmarks: &[0.0; 30],
        }];
        assert!(decode_outputs(&heads, 32, 0.5).is_err());
    }
}
