//! Model seams used by the face swapper
//!
//! `FaceAnalyzer` and `FaceSwapModel` are implemented by the ONNX backends in
//! [`crate::ml`]; tests swap in their own implementations.

use image::RgbImage;

use super::SwapError;

/// Number of facial landmarks produced by the detector
pub const LANDMARK_COUNT: usize = 5;

/// 2D point in image coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned face box (corner form)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Area using the inclusive pixel convention of the detector
    pub fn pixel_area(&self) -> f32 {
        (self.x2 - self.x1 + 1.0).max(0.0) * (self.y2 - self.y1 + 1.0).max(0.0)
    }

    /// Intersection over union (inclusive pixel convention)
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1) + 1.0).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1) + 1.0).max(0.0);
        let inter = w * h;
        let union = self.pixel_area() + other.pixel_area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x1: self.x1 * factor,
            y1: self.y1 * factor,
            x2: self.x2 * factor,
            y2: self.y2 * factor,
        }
    }
}

/// A face found by the detector
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    /// Detection confidence in [0, 1]
    pub score: f32,
    /// Left eye, right eye, nose tip, left mouth corner, right mouth corner
    pub landmarks: [Point; LANDMARK_COUNT],
}

/// Identity embedding of a face (L2-normalised)
pub type Embedding = Vec<f32>;

/// Face detection and recognition
pub trait FaceAnalyzer: Send + Sync {
    /// Detect faces, best score first
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, SwapError>;

    /// Compute the identity embedding of a detected face
    fn embed(&self, image: &RgbImage, face: &DetectedFace) -> Result<Embedding, SwapError>;
}

/// Face swap inference
pub trait FaceSwapModel: Send + Sync {
    /// Replace `target_face` in `target` with the identity described by `source`
    fn swap(
        &self,
        target: &RgbImage,
        target_face: &DetectedFace,
        source: &[f32],
    ) -> Result<RgbImage, SwapError>;
}

/// Loaded model set handed from the loader thread to the swapper
pub struct FaceModels {
    pub analyzer: Box<dyn FaceAnalyzer>,
    pub swapper: Box<dyn FaceSwapModel>,
}

impl FaceModels {
    pub fn new(
        analyzer: impl FaceAnalyzer + 'static,
        swapper: impl FaceSwapModel + 'static,
    ) -> Self {
        Self {
            analyzer: Box::new(analyzer),
            swapper: Box::new(swapper),
        }
    }
}
