//! Swapper and worker behaviour with stand-in models

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use live_face_swap::swap::{
    BoundingBox, DetectedFace, Embedding, FaceAnalyzer, FaceModels, FaceSwapModel, FaceSwapper,
    LoadStatus, Point, SwapError, SwapJob, SwapStatus, SwapWorker,
};

const LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Finds a face only in images whose top-left pixel is not black
struct StubAnalyzer;

impl FaceAnalyzer for StubAnalyzer {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, SwapError> {
        if image.get_pixel(0, 0).0 == [0, 0, 0] {
            return Ok(Vec::new());
        }
        Ok(vec![DetectedFace {
            bbox: BoundingBox { x1: 0.0, y1: 0.0, x2: 8.0, y2: 8.0 },
            score: 0.9,
            landmarks: [
                Point::new(2.0, 3.0),
                Point::new(6.0, 3.0),
                Point::new(4.0, 5.0),
                Point::new(2.5, 6.5),
                Point::new(5.5, 6.5),
            ],
        }])
    }

    fn embed(&self, _image: &RgbImage, _face: &DetectedFace) -> Result<Embedding, SwapError> {
        Ok(vec![1.0; 4])
    }
}

/// Paints the whole frame red
struct PaintSwapper {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl FaceSwapModel for PaintSwapper {
    fn swap(
        &self,
        target: &RgbImage,
        _target_face: &DetectedFace,
        source: &[f32],
    ) -> Result<RgbImage, SwapError> {
        assert_eq!(source.len(), 4);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(RgbImage::from_pixel(target.width(), target.height(), Rgb([255, 0, 0])))
    }
}

struct FailingSwapper;

impl FaceSwapModel for FailingSwapper {
    fn swap(
        &self,
        _target: &RgbImage,
        _target_face: &DetectedFace,
        _source: &[f32],
    ) -> Result<RgbImage, SwapError> {
        Err(SwapError::Inference {
            model: "swapper",
            message: "stub failure".to_string(),
        })
    }
}

/// Panics on every call, like a model hitting an out-of-bounds index
struct PanickingAnalyzer;

impl FaceAnalyzer for PanickingAnalyzer {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>, SwapError> {
        panic!("detector output shape mismatch");
    }

    fn embed(&self, _image: &RgbImage, _face: &DetectedFace) -> Result<Embedding, SwapError> {
        panic!("recognizer output shape mismatch");
    }
}

struct PanickingSwapper;

impl FaceSwapModel for PanickingSwapper {
    fn swap(
        &self,
        _target: &RgbImage,
        _target_face: &DetectedFace,
        _source: &[f32],
    ) -> Result<RgbImage, SwapError> {
        panic!("swapper output shape mismatch");
    }
}

fn face_image() -> RgbImage {
    RgbImage::from_pixel(16, 16, Rgb([120, 110, 100]))
}

fn blank_image() -> RgbImage {
    RgbImage::new(16, 16)
}

fn paint_models(delay: Duration) -> (FaceModels, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let models = FaceModels::new(
        StubAnalyzer,
        PaintSwapper {
            calls: calls.clone(),
            delay,
        },
    );
    (models, calls)
}

fn ready_swapper(delay: Duration) -> (FaceSwapper, Arc<AtomicUsize>) {
    let (models, calls) = paint_models(delay);
    let swapper = FaceSwapper::spawn(move || Ok(models));
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));
    (swapper, calls)
}

#[test]
fn test_swap_while_loading_returns_frame_unchanged() {
    let (release, gate) = crossbeam_channel::bounded::<()>(1);
    let swapper = FaceSwapper::spawn(move || {
        let _ = gate.recv();
        Ok(paint_models(Duration::ZERO).0)
    });

    assert!(swapper.is_loading());
    let target = face_image();
    let output = swapper.swap(&face_image(), target.clone());
    assert_eq!(output.status, SwapStatus::ModelsLoading);
    assert_eq!(output.image, target);

    release.send(()).unwrap();
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));
    assert_eq!(swapper.load_status(), LoadStatus::Ready);
}

#[test]
fn test_swap_replaces_face_once_loaded() {
    let (swapper, calls) = ready_swapper(Duration::ZERO);

    let output = swapper.swap(&face_image(), face_image());
    assert_eq!(output.status, SwapStatus::Swapped);
    assert_eq!(output.image.get_pixel(3, 3).0, [255, 0, 0]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_source_face_leaves_target() {
    let (swapper, calls) = ready_swapper(Duration::ZERO);

    let target = face_image();
    let output = swapper.swap(&blank_image(), target.clone());
    assert_eq!(output.status, SwapStatus::NoSourceFace);
    assert_eq!(output.image, target);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_no_target_face_leaves_target() {
    let (swapper, _) = ready_swapper(Duration::ZERO);

    let target = blank_image();
    let output = swapper.swap(&face_image(), target.clone());
    assert_eq!(output.status, SwapStatus::NoTargetFace);
    assert_eq!(output.image, target);
}

#[test]
fn test_inference_error_leaves_target() {
    let swapper = FaceSwapper::spawn(|| Ok(FaceModels::new(StubAnalyzer, FailingSwapper)));
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));

    let target = face_image();
    let output = swapper.swap(&face_image(), target.clone());
    assert_eq!(output.status, SwapStatus::Failed);
    assert_eq!(output.image, target);
}

#[test]
fn test_failed_load_passes_frames_through() {
    let swapper = FaceSwapper::spawn(|| {
        Err(SwapError::ModelNotFound("models/det_10g.onnx".into()))
    });
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));
    assert!(matches!(swapper.load_status(), LoadStatus::Failed(_)));

    let target = face_image();
    let output = swapper.swap(&face_image(), target.clone());
    assert_eq!(output.status, SwapStatus::ModelsUnavailable);
    assert_eq!(output.image, target);
    assert_eq!(swapper.swap_face(&face_image(), target.clone()), target);
}

#[test]
fn test_panicking_loader_is_reported_as_failure() {
    let swapper = FaceSwapper::spawn(|| panic!("loader exploded"));
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));
    assert!(matches!(swapper.load_status(), LoadStatus::Failed(_)));

    let output = swapper.swap(&face_image(), face_image());
    assert_eq!(output.status, SwapStatus::ModelsUnavailable);
}

fn wait_for_result(worker: &SwapWorker, frame_number: u64) -> live_face_swap::swap::SwapResult {
    let deadline = Instant::now() + LOAD_TIMEOUT;
    loop {
        if let Some(result) = worker.latest_result() {
            if result.frame_number == frame_number {
                return result;
            }
        }
        assert!(Instant::now() < deadline, "no swap result for frame {}", frame_number);
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_worker_delivers_latest_result() {
    let (swapper, _) = ready_swapper(Duration::ZERO);
    let worker = SwapWorker::new(Arc::new(swapper)).unwrap();

    assert!(worker.try_submit(SwapJob {
        source: Arc::new(face_image()),
        frame: face_image(),
        frame_number: 7,
        generation: 0,
    }));

    let result = wait_for_result(&worker, 7);
    assert_eq!(result.status, SwapStatus::Swapped);
    assert_eq!(result.image.get_pixel(0, 0).0, [255, 0, 0]);

    worker.clear_result();
    assert!(worker.latest_result().is_none());
}

#[test]
fn test_worker_skips_frames_while_busy() {
    let (swapper, calls) = ready_swapper(Duration::from_millis(200));
    let mut worker = SwapWorker::new(Arc::new(swapper)).unwrap();
    let source = Arc::new(face_image());

    assert!(worker.try_submit(SwapJob {
        source: source.clone(),
        frame: face_image(),
        frame_number: 1,
        generation: 0,
    }));
    assert!(worker.is_busy());
    assert!(!worker.try_submit(SwapJob {
        source: source.clone(),
        frame: face_image(),
        frame_number: 2,
        generation: 0,
    }));

    let result = wait_for_result(&worker, 1);
    assert_eq!(result.status, SwapStatus::Swapped);

    worker.stop();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!worker.try_submit(SwapJob {
        source,
        frame: face_image(),
        frame_number: 3,
        generation: 0,
    }));
}

#[test]
fn test_panicking_analyzer_leaves_target() {
    let swapper = FaceSwapper::spawn(|| Ok(FaceModels::new(PanickingAnalyzer, FailingSwapper)));
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));

    let target = face_image();
    let output = swapper.swap(&face_image(), target.clone());
    assert_eq!(output.status, SwapStatus::Failed);
    assert_eq!(output.image, target);

    // Models stay usable after a panic
    let again = swapper.swap(&face_image(), target.clone());
    assert_eq!(again.status, SwapStatus::Failed);
}

#[test]
fn test_panicking_swapper_leaves_target() {
    let swapper = FaceSwapper::spawn(|| Ok(FaceModels::new(StubAnalyzer, PanickingSwapper)));
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));

    let target = face_image();
    let output = swapper.swap(&face_image(), target.clone());
    assert_eq!(output.status, SwapStatus::Failed);
    assert_eq!(output.image, target);
}

#[test]
fn test_worker_keeps_running_after_model_panic() {
    let swapper = FaceSwapper::spawn(|| Ok(FaceModels::new(PanickingAnalyzer, PanickingSwapper)));
    assert!(swapper.wait_for_load(LOAD_TIMEOUT));
    let worker = SwapWorker::new(Arc::new(swapper)).unwrap();
    let source = Arc::new(face_image());

    assert!(worker.try_submit(SwapJob {
        source: source.clone(),
        frame: face_image(),
        frame_number: 1,
        generation: 0,
    }));
    let first = wait_for_result(&worker, 1);
    assert_eq!(first.status, SwapStatus::Failed);

    let deadline = Instant::now() + LOAD_TIMEOUT;
    while worker.is_busy() {
        assert!(Instant::now() < deadline, "worker stayed busy after a model panic");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(worker.try_submit(SwapJob {
        source,
        frame: face_image(),
        frame_number: 2,
        generation: 0,
    }));
    assert_eq!(wait_for_result(&worker, 2).status, SwapStatus::Failed);
}
