//! Live Face Swap - webcam preview with real-time face swapping
//!
//! Captures frames from a camera, replaces the detected face with the face of
//! a chosen source image using ONNX models (SCRFD detection, ArcFace
//! embedding and inswapper) and shows the result in an egui window.

pub mod app;
pub mod camera;
pub mod ml;
pub mod settings;
pub mod sources;
pub mod swap;
pub mod telemetry;
pub mod ui;

pub use app::App;
