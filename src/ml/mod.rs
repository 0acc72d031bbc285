//! ONNX model backends
//!
//! Face detection (SCRFD), recognition (ArcFace) and swapping (inswapper)
//! using the insightface `buffalo_l` pack and `inswapper_128.onnx`, executed
//! with ONNX Runtime.

pub mod align;
pub mod detector;
pub mod inswapper;
pub mod preprocess;
pub mod recognizer;

use std::path::{Path, PathBuf};

use image::RgbImage;
use ort::session::Session;

use crate::swap::{DetectedFace, Embedding, FaceAnalyzer, FaceModels, SwapError};

pub use detector::ScrfdDetector;
pub use inswapper::InSwapper;
pub use recognizer::ArcFaceRecognizer;

pub const DETECTOR_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_FILE: &str = "w600k_r50.onnx";
pub const SWAPPER_FILE: &str = "inswapper_128.onnx";
pub const EMAP_FILE: &str = "inswapper_emap.bin";

/// Sub-directory holding the detector and recognizer
pub const MODEL_PACK_DIR: &str = "buffalo_l";

/// Environment variable overriding the model directory
pub const MODEL_DIR_ENV: &str = "FACE_SWAP_MODELS";

/// Model loading options
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    /// Directory to search first
    pub model_dir: Option<PathBuf>,
    /// Square detector input size in pixels
    pub detection_size: u32,
    pub detection_threshold: f32,
    pub nms_threshold: f32,
    /// Intra-op threads per session
    pub intra_threads: usize,
    /// Try the platform's hardware execution provider
    pub use_gpu: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            detection_size: 320,
            detection_threshold: 0.5,
            nms_threshold: 0.4,
            intra_threads: 4,
            use_gpu: true,
        }
    }
}

/// Directories searched for models, in priority order
pub fn model_dir_candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = configured {
        candidates.push(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV) {
        candidates.push(PathBuf::from(dir));
    }

    // Next to the executable, and up from target/{debug,release} for cargo run
    if let Ok(exe_path) = std::env::current_exe() {
        let mut dir = exe_path.parent();
        for _ in 0..3 {
            let Some(current) = dir else { break };
            candidates.push(current.join("models"));
            dir = current.parent();
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("models"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".insightface").join("models"));
    }

    candidates
}

/// First candidate directory containing the swapper model
pub fn find_model_dir(configured: Option<&Path>) -> Result<PathBuf, SwapError> {
    let candidates = model_dir_candidates(configured);
    if let Some(dir) = candidates.iter().find(|dir| dir.join(SWAPPER_FILE).is_file()) {
        return Ok(dir.clone());
    }

    let searched = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(SwapError::ModelDirNotFound(searched))
}

/// Locate a model of the recognition pack: `<dir>/buffalo_l/<file>`, then `<dir>/<file>`
pub fn pack_model_path(dir: &Path, file: &str) -> Result<PathBuf, SwapError> {
    let in_pack = dir.join(MODEL_PACK_DIR).join(file);
    if in_pack.is_file() {
        return Ok(in_pack);
    }
    let flat = dir.join(file);
    if flat.is_file() {
        return Ok(flat);
    }
    Err(SwapError::ModelNotFound(in_pack))
}

fn require_file(path: PathBuf) -> Result<PathBuf, SwapError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(SwapError::ModelNotFound(path))
    }
}

/// Create an inference session for `path`
pub(crate) fn build_session(
    path: &Path,
    model: &'static str,
    config: &ModelConfig,
) -> Result<Session, SwapError> {
    let load_error = |message: String| SwapError::ModelLoad { model, message };

    let mut builder = Session::builder()
        .map_err(|e| load_error(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(config.intra_threads.max(1))
        .map_err(|e| load_error(format!("Failed to set threads: {}", e)))?;

    if config.use_gpu {
        builder = with_hardware_provider(builder)
            .map_err(|e| load_error(format!("Failed to register execution provider: {}", e)))?;
    }

    let session = builder
        .commit_from_file(path)
        .map_err(|e| load_error(e.to_string()))?;

    log::info!("Loaded {} from {:?}", model, path);
    Ok(session)
}

#[cfg(target_os = "macos")]
fn with_hardware_provider(
    builder: ort::session::builder::SessionBuilder,
) -> Result<ort::session::builder::SessionBuilder, String> {
    use ort::execution_providers::CoreMLExecutionProvider;
    builder
        .with_execution_providers([CoreMLExecutionProvider::default().build()])
        .map_err(|e| e.to_string())
}

#[cfg(target_os = "windows")]
fn with_hardware_provider(
    builder: ort::session::builder::SessionBuilder,
) -> Result<ort::session::builder::SessionBuilder, String> {
    use ort::execution_providers::DirectMLExecutionProvider;
    builder
        .with_execution_providers([DirectMLExecutionProvider::default().build()])
        .map_err(|e| e.to_string())
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn with_hardware_provider(
    builder: ort::session::builder::SessionBuilder,
) -> Result<ort::session::builder::SessionBuilder, String> {
    Ok(builder)
}

/// Detector and recognizer behind the [`FaceAnalyzer`] seam
pub struct OnnxFaceAnalyzer {
    detector: ScrfdDetector,
    recognizer: ArcFaceRecognizer,
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, SwapError> {
        self.detector.detect(image)
    }

    fn embed(&self, image: &RgbImage, face: &DetectedFace) -> Result<Embedding, SwapError> {
        self.recognizer.embed(image, face)
    }
}

/// Load all three models
pub fn load_models(config: &ModelConfig) -> Result<FaceModels, SwapError> {
    let model_dir = find_model_dir(config.model_dir.as_deref())?;
    log::info!("Model directory: {:?}", model_dir);

    let detector_path = pack_model_path(&model_dir, DETECTOR_FILE)?;
    let recognizer_path = pack_model_path(&model_dir, RECOGNIZER_FILE)?;
    let swapper_path = require_file(model_dir.join(SWAPPER_FILE))?;
    let emap_path = require_file(model_dir.join(EMAP_FILE))?;

    let analyzer = OnnxFaceAnalyzer {
        detector: ScrfdDetector::load(&detector_path, config)?,
        recognizer: ArcFaceRecognizer::load(&recognizer_path, config)?,
    };
    let swapper = InSwapper::load(&swapper_path, &emap_path, config)?;

    Ok(FaceModels::new(analyzer, swapper))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("live-face-swap-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_configured_dir_searched_first() {
        let configured = PathBuf::from("/opt/faces");
        let candidates = model_dir_candidates(Some(&configured));
        assert_eq!(candidates[0], configured);
        assert!(candidates.len() > 1);
    }

    #[test]
    fn test_find_model_dir_uses_configured_dir() {
        let dir = temp_dir("find");
        std::fs::write(dir.join(SWAPPER_FILE), b"").unwrap();
        assert_eq!(find_model_dir(Some(&dir)).unwrap(), dir);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_pack_model_path_prefers_pack_dir() {
        let dir = temp_dir("pack");
        std::fs::create_dir_all(dir.join(MODEL_PACK_DIR)).unwrap();
        std::fs::write(dir.join(DETECTOR_FILE), b"").unwrap();
        assert_eq!(pack_model_path(&dir, DETECTOR_FILE).unwrap(), dir.join(DETECTOR_FILE));

        std::fs::write(dir.join(MODEL_PACK_DIR).join(DETECTOR_FILE), b"").unwrap();
        assert_eq!(
            pack_model_path(&dir, DETECTOR_FILE).unwrap(),
            dir.join(MODEL_PACK_DIR).join(DETECTOR_FILE)
        );

        assert!(matches!(
            pack_model_path(&dir, RECOGNIZER_FILE),
            Err(SwapError::ModelNotFound(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_models_reports_missing_files() {
        let dir = temp_dir("incomplete");
        std::fs::write(dir.join(SWAPPER_FILE), b"").unwrap();
        let config = ModelConfig {
            model_dir: Some(dir.clone()),
            ..ModelConfig::default()
        };

        match load_models(&config) {
            Err(SwapError::ModelNotFound(path)) => {
                assert_eq!(path, dir.join(MODEL_PACK_DIR).join(DETECTOR_FILE));
            }
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("loaded models from an incomplete directory"),
        }

        let pack = dir.join(MODEL_PACK_DIR);
        std::fs::create_dir_all(&pack).unwrap();
        std::fs::write(pack.join(DETECTOR_FILE), b"").unwrap();
        std::fs::write(pack.join(RECOGNIZER_FILE), b"").unwrap();
        match load_models(&config) {
            Err(SwapError::ModelNotFound(path)) => assert_eq!(path, dir.join(EMAP_FILE)),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("loaded models without an emap"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
