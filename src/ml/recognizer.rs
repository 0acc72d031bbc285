//! ArcFace recognizer (`w600k_r50.onnx`)

use std::path::Path;

use image::RgbImage;
use ort::session::Session;
use parking_lot::Mutex;

use super::align::{align_face, ARCFACE_SIZE};
use super::preprocess::blob_from_image;
use super::ModelConfig;
use crate::swap::{DetectedFace, Embedding, SwapError};

const MODEL_NAME: &str = "face recognizer";

/// Length of the identity embedding
pub const EMBEDDING_SIZE: usize = 512;

/// Scale `values` to unit length. Zero vectors are left untouched.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

pub struct ArcFaceRecognizer {
    session: Mutex<Session>,
}

impl ArcFaceRecognizer {
    pub fn load(path: &Path, config: &ModelConfig) -> Result<Self, SwapError> {
        let session = super::build_session(path, MODEL_NAME, config)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Normalised identity embedding of `face`
    pub fn embed(&self, image: &RgbImage, face: &DetectedFace) -> Result<Embedding, SwapError> {
        let (crop, _) = align_face(image, &face.landmarks, ARCFACE_SIZE)?;
        let blob = blob_from_image(&crop, 127.5, 127.5);

        let inference_error = |e: ort::Error| SwapError::Inference {
            model: MODEL_NAME,
            message: e.to_string(),
        };
        let input_tensor = ort::value::Tensor::from_array(blob).map_err(inference_error)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(inference_error)?;
        let (_name, value) = outputs.iter().next().ok_or(SwapError::UnexpectedOutput {
            model: MODEL_NAME,
            message: "no output".into(),
        })?;
        let (_shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        if data.len() != EMBEDDING_SIZE {
            return Err(SwapError::UnexpectedOutput {
                model: MODEL_NAME,
                message: format!("expected {} values, got {}", EMBEDDING_SIZE, data.len()),
            });
        }
        let mut embedding = data.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert!(zero.iter().all(|&x| x == 0.0));
    }
}
