//! Errors raised inside the face swap pipeline
//!
//! None of these cross the `FaceSwapper` boundary: they are logged and the
//! caller receives its input frame back.

use std::path::PathBuf;

/// Error type for model loading and inference
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Models directory not found (searched: {0})")]
    ModelDirNotFound(String),

    #[error("Failed to load {model}: {message}")]
    ModelLoad { model: &'static str, message: String },

    #[error("{model} inference failed: {message}")]
    Inference { model: &'static str, message: String },

    #[error("Unexpected {model} output: {message}")]
    UnexpectedOutput { model: &'static str, message: String },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Face landmarks are degenerate, cannot align face")]
    DegenerateLandmarks,

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model loader panicked")]
    LoaderPanicked,

    #[error("Model panicked during inference")]
    ModelPanicked,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}
