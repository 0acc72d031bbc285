//! inswapper face swap model (`inswapper_128.onnx`)
//!
//! The model takes an aligned 128x128 target crop and a source latent. The
//! latent is the source identity embedding projected through `emap`, a
//! 512x512 matrix shipped with the model and read from a sidecar file.

use std::path::Path;

use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayView1};
use ort::session::Session;
use parking_lot::Mutex;

use super::align::{align_face, paste_back};
use super::preprocess::blob_from_image;
use super::recognizer::{l2_normalize, EMBEDDING_SIZE};
use super::ModelConfig;
use crate::swap::{DetectedFace, FaceSwapModel, SwapError};

const MODEL_NAME: &str = "face swapper";

/// Crop size the swapper works on
pub const SWAP_SIZE: u32 = 128;

/// Read the `emap` projection matrix (little-endian f32, row-major)
pub fn load_emap(path: &Path) -> Result<Array2<f32>, SwapError> {
    let bytes = std::fs::read(path).map_err(|source| SwapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    emap_from_bytes(&bytes)
}

pub fn emap_from_bytes(bytes: &[u8]) -> Result<Array2<f32>, SwapError> {
    let expected = EMBEDDING_SIZE * EMBEDDING_SIZE * 4;
    if bytes.len() != expected {
        return Err(SwapError::ModelLoad {
            model: MODEL_NAME,
            message: format!("emap has {} bytes, expected {}", bytes.len(), expected),
        });
    }
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Array2::from_shape_vec((EMBEDDING_SIZE, EMBEDDING_SIZE), values).map_err(|e| {
        SwapError::ModelLoad {
            model: MODEL_NAME,
            message: e.to_string(),
        }
    })
}

/// Project a source embedding into the swapper's latent space (1 x 512, unit length)
pub fn source_latent(embedding: &[f32], emap: &Array2<f32>) -> Result<Array2<f32>, SwapError> {
    if embedding.len() != emap.nrows() {
        return Err(SwapError::Inference {
            model: MODEL_NAME,
            message: format!(
                "embedding has {} values, expected {}",
                embedding.len(),
                emap.nrows()
            ),
        });
    }
    let mut normed = embedding.to_vec();
    l2_normalize(&mut normed);

    let mut latent = ArrayView1::from(normed.as_slice()).dot(emap).to_vec();
    l2_normalize(&mut latent);
    let len = latent.len();
    Array2::from_shape_vec((1, len), latent).map_err(|e| SwapError::Inference {
        model: MODEL_NAME,
        message: e.to_string(),
    })
}

/// Convert a 1x3xHxW output in [0, 1] into an RGB crop
fn crop_from_output(data: &[f32], size: u32) -> Result<RgbImage, SwapError> {
    let plane = (size * size) as usize;
    if data.len() != plane * 3 {
        return Err(SwapError::UnexpectedOutput {
            model: MODEL_NAME,
            message: format!("expected {} values, got {}", plane * 3, data.len()),
        });
    }
    let to_u8 = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;
    Ok(RgbImage::from_fn(size, size, |x, y| {
        let i = (y * size + x) as usize;
        Rgb([to_u8(data[i]), to_u8(data[plane + i]), to_u8(data[2 * plane + i])])
    }))
}

pub struct InSwapper {
    session: Mutex<Session>,
    emap: Array2<f32>,
}

impl InSwapper {
    pub fn load(model_path: &Path, emap_path: &Path, config: &ModelConfig) -> Result<Self, SwapError> {
        let emap = load_emap(emap_path)?;
        let session = super::build_session(model_path, MODEL_NAME, config)?;
        Ok(Self {
            session: Mutex::new(session),
            emap,
        })
    }

    fn infer(&self, crop: &RgbImage, latent: Array2<f32>) -> Result<RgbImage, SwapError> {
        let inference_error = |e: ort::Error| SwapError::Inference {
            model: MODEL_NAME,
            message: e.to_string(),
        };
        let target_tensor = ort::value::Tensor::from_array(blob_from_image(crop, 0.0, 255.0))
            .map_err(inference_error)?;
        let source_tensor = ort::value::Tensor::from_array(latent).map_err(inference_error)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs!["target" => target_tensor, "source" => source_tensor])
            .map_err(inference_error)?;
        let (_name, value) = outputs.iter().next().ok_or(SwapError::UnexpectedOutput {
            model: MODEL_NAME,
            message: "no output".into(),
        })?;
        let (_shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;
        crop_from_output(data, SWAP_SIZE)
    }
}

impl FaceSwapModel for InSwapper {
    fn swap(
        &self,
        target: &RgbImage,
        target_face: &DetectedFace,
        source: &[f32],
    ) -> Result<RgbImage, SwapError> {
        let latent = source_latent(source, &self.emap)?;
        let (crop, to_crop) = align_face(target, &target_face.landmarks, SWAP_SIZE)?;
        let fake = self.infer(&crop, latent)?;
        paste_back(target, &fake, &to_crop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emap_rejects_wrong_size() {
        assert!(emap_from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_emap_reads_little_endian() {
        let mut bytes = vec![0u8; EMBEDDING_SIZE * EMBEDDING_SIZE * 4];
        bytes[4..8].copy_from_slice(&2.5f32.to_le_bytes());
        let emap = emap_from_bytes(&bytes).unwrap();
        assert_eq!(emap[[0, 1]], 2.5);
        assert_eq!(emap[[1, 0]], 0.0);
    }

    #[test]
    fn test_source_latent_identity_emap() {
        let emap = Array2::<f32>::eye(EMBEDDING_SIZE);
        let mut embedding = vec![0.0f32; EMBEDDING_SIZE];
        embedding[3] = 4.0;

        let latent = source_latent(&embedding, &emap).unwrap();
        assert_eq!(latent.shape(), &[1, EMBEDDING_SIZE]);
        assert!((latent[[0, 3]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_source_latent_rejects_wrong_length() {
        let emap = Array2::<f32>::eye(EMBEDDING_SIZE);
        assert!(source_latent(&[1.0, 2.0], &emap).is_err());
    }

    #[test]
    fn test_crop_from_output_planes() {
        let size = 2;
        let mut data = vec![0.0f32; 12];
        data[0] = 1.0; // R of (0, 0)
        data[4 + 3] = 0.5; // G of (1, 1)
        let crop = crop_from_output(&data, size).unwrap();
        assert_eq!(crop.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(crop.get_pixel(1, 1), &Rgb([0, 127, 0]));
    }
}
