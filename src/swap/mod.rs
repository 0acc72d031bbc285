//! Face swap wrapper
//!
//! Loads the face models on a background thread and exposes a best-effort
//! swap call. Every failure path hands the target frame back unchanged, so
//! callers never have to deal with model errors.

mod error;
pub mod models;
pub mod worker;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use parking_lot::{Condvar, Mutex};

use crate::ml::{self, ModelConfig};

pub use error::SwapError;
pub use models::{
    BoundingBox, DetectedFace, Embedding, FaceAnalyzer, FaceModels, FaceSwapModel, Point,
    LANDMARK_COUNT,
};
pub use worker::{ResultTracker, SwapJob, SwapResult, SwapWorker};

/// Public view of the model loading state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed(String),
}

/// What happened during a swap call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapStatus {
    /// The source face was composited onto the target face
    Swapped,
    /// Models are still loading
    ModelsLoading,
    /// Models failed to load
    ModelsUnavailable,
    /// No face found in the source image
    NoSourceFace,
    /// No face found in the target frame
    NoTargetFace,
    /// Detection or inference raised an error
    Failed,
}

impl SwapStatus {
    pub fn is_swapped(self) -> bool {
        matches!(self, SwapStatus::Swapped)
    }

    /// Short text for the preview status line
    pub fn description(self) -> &'static str {
        match self {
            SwapStatus::Swapped => "Face swapped",
            SwapStatus::ModelsLoading => "Models loading...",
            SwapStatus::ModelsUnavailable => "Models not loaded",
            SwapStatus::NoSourceFace => "No face in source image",
            SwapStatus::NoTargetFace => "No face detected",
            SwapStatus::Failed => "Face swap failed",
        }
    }
}

/// Result of a swap call: the image to display and how it was produced
#[derive(Clone, Debug)]
pub struct SwapOutput {
    pub image: RgbImage,
    pub status: SwapStatus,
}

impl SwapOutput {
    fn unchanged(image: RgbImage, status: SwapStatus) -> Self {
        Self { image, status }
    }
}

enum ModelState {
    Loading,
    Ready(Arc<FaceModels>),
    Failed(String),
}

struct Shared {
    state: Mutex<ModelState>,
    loaded: Condvar,
}

impl Shared {
    fn finish(&self, state: ModelState) {
        *self.state.lock() = state;
        self.loaded.notify_all();
    }
}

enum Outcome {
    Swapped(RgbImage),
    NoSourceFace,
    NoTargetFace,
}

/// Asynchronously loaded face swapper
pub struct FaceSwapper {
    shared: Arc<Shared>,
}

impl FaceSwapper {
    /// Start loading models with `loader` on a background thread
    ///
    /// Returns immediately. Swap calls made before the loader finishes return
    /// their target unchanged.
    pub fn spawn<F>(loader: F) -> Self
    where
        F: FnOnce() -> Result<FaceModels, SwapError> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(ModelState::Loading),
            loaded: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let spawned = std::thread::Builder::new()
            .name("model-loader".to_string())
            .spawn(move || {
                log::info!("Loading face models...");
                let started = Instant::now();

                let result = match panic::catch_unwind(AssertUnwindSafe(loader)) {
                    Ok(result) => result,
                    Err(_) => Err(SwapError::LoaderPanicked),
                };

                let state = match result {
                    Ok(models) => {
                        log::info!(
                            "Face models loaded in {:.1}s",
                            started.elapsed().as_secs_f32()
                        );
                        ModelState::Ready(Arc::new(models))
                    }
                    Err(e) => {
                        log::error!("Model loading failed: {}", e);
                        ModelState::Failed(e.to_string())
                    }
                };
                thread_shared.finish(state);
            });

        if let Err(e) = spawned {
            let error = SwapError::ThreadSpawn(e);
            log::error!("Model loading failed: {}", error);
            shared.finish(ModelState::Failed(error.to_string()));
        }

        Self { shared }
    }

    /// Start loading the ONNX models described by `config`
    pub fn with_onnx_models(config: ModelConfig) -> Self {
        Self::spawn(move || ml::load_models(&config))
    }

    pub fn load_status(&self) -> LoadStatus {
        match &*self.shared.state.lock() {
            ModelState::Loading => LoadStatus::Loading,
            ModelState::Ready(_) => LoadStatus::Ready,
            ModelState::Failed(message) => LoadStatus::Failed(message.clone()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.shared.state.lock(), ModelState::Loading)
    }

    /// Block until loading finished or `timeout` elapsed.
    ///
    /// Returns true once loading has finished, successfully or not.
    pub fn wait_for_load(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while matches!(*state, ModelState::Loading) {
            if self.shared.loaded.wait_until(&mut state, deadline).timed_out() {
                return !matches!(*state, ModelState::Loading);
            }
        }
        true
    }

    /// Swap the first face of `source` onto the first face of `target`
    ///
    /// Never fails: when models are unavailable, no face is found, or
    /// inference errors or panics, `target` comes back untouched with a
    /// status saying why.
    pub fn swap(&self, source: &RgbImage, target: RgbImage) -> SwapOutput {
        let models = match &*self.shared.state.lock() {
            ModelState::Loading => {
                log::debug!("Models still loading, frame passed through");
                return SwapOutput::unchanged(target, SwapStatus::ModelsLoading);
            }
            ModelState::Failed(_) => {
                log::debug!("Models not loaded, frame passed through");
                return SwapOutput::unchanged(target, SwapStatus::ModelsUnavailable);
            }
            ModelState::Ready(models) => models.clone(),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            Self::run_models(&models, source, &target)
        }))
        .unwrap_or(Err(SwapError::ModelPanicked));

        match outcome {
            Ok(Outcome::Swapped(image)) => SwapOutput {
                image,
                status: SwapStatus::Swapped,
            },
            Ok(Outcome::NoSourceFace) => {
                log::debug!("No face detected in source image");
                SwapOutput::unchanged(target, SwapStatus::NoSourceFace)
            }
            Ok(Outcome::NoTargetFace) => {
                log::debug!("No face detected in target frame");
                SwapOutput::unchanged(target, SwapStatus::NoTargetFace)
            }
            Err(e) => {
                log::warn!("Face swap failed: {}", e);
                SwapOutput::unchanged(target, SwapStatus::Failed)
            }
        }
    }

    /// Like [`swap`](Self::swap) but only returns the image
    pub fn swap_face(&self, source: &RgbImage, target: RgbImage) -> RgbImage {
        self.swap(source, target).image
    }

    fn run_models(
        models: &FaceModels,
        source: &RgbImage,
        target: &RgbImage,
    ) -> Result<Outcome, SwapError> {
        let source_faces = models.analyzer.detect(source)?;
        let target_faces = models.analyzer.detect(target)?;

        let Some(source_face) = source_faces.first() else {
            return Ok(Outcome::NoSourceFace);
        };
        let Some(target_face) = target_faces.first() else {
            return Ok(Outcome::NoTargetFace);
        };

        let embedding = models.analyzer.embed(source, source_face)?;
        let swapped = models.swapper.swap(target, target_face, &embedding)?;
        Ok(Outcome::Swapped(swapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_descriptions() {
        assert!(SwapStatus::Swapped.is_swapped());
        assert!(!SwapStatus::NoTargetFace.is_swapped());
        assert_eq!(SwapStatus::NoTargetFace.description(), "No face detected");
    }

    #[test]
    fn test_failed_loader_reports_message() {
        let swapper = FaceSwapper::spawn(|| Err(SwapError::ModelDirNotFound("nowhere".into())));
        assert!(swapper.wait_for_load(Duration::from_secs(5)));
        match swapper.load_status() {
            LoadStatus::Failed(message) => assert!(message.contains("nowhere")),
            other => panic!("unexpected status {:?}", other),
        }
    }
}
