//! Camera capture module
//!
//! Captures frames with nokhwa on a background thread and provides the
//! latest frame to the UI thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;

use crate::settings::CaptureResolution;

/// How long `CameraCapture::new` waits for the device to open
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Camera errors
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("Cannot open camera {index}: {message}")]
    Open { index: u32, message: String },

    #[error("Camera {0} did not respond in time")]
    Timeout(u32),

    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGB pixels
    pub image: RgbImage,
    /// Frame number
    pub frame_number: u64,
    /// Capture time
    pub timestamp: Instant,
}

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

type FrameSlots = [Arc<Mutex<Option<CameraFrame>>>; 3];

/// Camera capture interface
pub struct CameraCapture {
    /// Triple-buffered frames
    frames: FrameSlots,
    /// Index of the latest complete frame
    latest_frame_idx: Arc<AtomicU64>,
    /// Set once the first frame is written
    has_frame: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    /// Resolution reported by the device
    width: u32,
    height: u32,
    name: String,
}

impl CameraCapture {
    /// List available cameras
    pub fn list_cameras() -> Vec<CameraInfo> {
        match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
            Ok(camera_list) => camera_list
                .iter()
                .enumerate()
                .map(|(idx, info)| CameraInfo {
                    index: idx as u32,
                    name: info.human_name().to_string(),
                })
                .collect(),
            Err(e) => {
                log::warn!("Failed to enumerate cameras: {:?}", e);
                Vec::new()
            }
        }
    }

    /// Open camera `camera_index` and start capturing
    ///
    /// Blocks until the device is open (or failed to open), so errors surface here.
    pub fn new(camera_index: u32, resolution: CaptureResolution) -> Result<Self, CameraError> {
        let frames: FrameSlots = [
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
        ];
        let latest_frame_idx = Arc::new(AtomicU64::new(0));
        let has_frame = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let (open_sender, open_receiver) =
            crossbeam_channel::bounded::<Result<(u32, u32, String), String>>(1);

        let frames_clone = frames.clone();
        let latest_frame_idx_clone = latest_frame_idx.clone();
        let has_frame_clone = has_frame.clone();
        let running_clone = running.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let mut camera = match Self::open_camera(camera_index, resolution) {
                    Ok(camera) => camera,
                    Err(message) => {
                        let _ = open_sender.send(Err(message));
                        return;
                    }
                };
                let opened = camera.resolution();
                let _ = open_sender.send(Ok((
                    opened.width(),
                    opened.height(),
                    camera.info().human_name().to_string(),
                )));

                Self::capture_loop(
                    &mut camera,
                    frames_clone,
                    latest_frame_idx_clone,
                    has_frame_clone,
                    running_clone,
                );
            })
            .map_err(CameraError::ThreadSpawn)?;

        let mut capture = Self {
            frames,
            latest_frame_idx,
            has_frame,
            running,
            thread_handle: Some(thread_handle),
            width: 0,
            height: 0,
            name: String::new(),
        };

        match open_receiver.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok((width, height, name))) => {
                log::debug!("Camera opened: {} ({}x{})", name, width, height);
                capture.width = width;
                capture.height = height;
                capture.name = name;
                Ok(capture)
            }
            Ok(Err(message)) => {
                capture.stop();
                Err(CameraError::Open {
                    index: camera_index,
                    message,
                })
            }
            Err(_) => {
                // Leave the thread detached; it may still be stuck in the driver
                capture.running.store(false, Ordering::Release);
                capture.thread_handle = None;
                Err(CameraError::Timeout(camera_index))
            }
        }
    }

    fn open_camera(camera_index: u32, resolution: CaptureResolution) -> Result<Camera, String> {
        log::info!(
            "Opening camera {} at {}",
            camera_index,
            resolution.label()
        );
        let index = CameraIndex::Index(camera_index);
        let (width, height) = resolution.dimensions();

        let attempts = [
            RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                30,
            )),
            RequestedFormatType::HighestResolution(Resolution::new(width, height)),
            RequestedFormatType::None,
        ];

        let mut last_error = String::from("no capture format available");
        for requested_type in attempts {
            let requested = RequestedFormat::new::<RgbFormat>(requested_type);
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(e) => {
                        log::warn!("Failed to open camera stream: {:?}", e);
                        last_error = e.to_string();
                    }
                },
                Err(e) => {
                    log::warn!("Camera format rejected: {:?}", e);
                    last_error = e.to_string();
                }
            }
        }
        Err(last_error)
    }

    fn capture_loop(
        camera: &mut Camera,
        frames: FrameSlots,
        latest_frame_idx: Arc<AtomicU64>,
        has_frame: Arc<AtomicBool>,
        running: Arc<AtomicBool>,
    ) {
        let mut write_idx: u64 = 0;
        let mut frame_number: u64 = 0;

        while running.load(Ordering::Acquire) {
            let frame = match camera.frame() {
                Ok(frame) => frame,
                Err(e) => {
                    log::debug!("Failed to capture frame: {:?}", e);
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };

            let (width, height) = (frame.resolution().width(), frame.resolution().height());
            let image = match frame.decode_image::<RgbFormat>() {
                Ok(decoded) => RgbImage::from_raw(width, height, decoded.into_raw()),
                Err(e) => {
                    log::warn!("Failed to decode frame: {:?}", e);
                    continue;
                }
            };
            let Some(image) = image else {
                log::warn!("Decoded frame does not match {}x{}", width, height);
                continue;
            };

            let camera_frame = CameraFrame {
                image,
                frame_number,
                timestamp: Instant::now(),
            };

            let slot = (write_idx % 3) as usize;
            *frames[slot].lock() = Some(camera_frame);
            latest_frame_idx.store(write_idx, Ordering::Release);
            has_frame.store(true, Ordering::Release);
            write_idx = write_idx.wrapping_add(1);
            frame_number += 1;
        }

        if let Err(e) = camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {:?}", e);
        }
        log::info!("Camera capture thread stopped");
    }

    /// Get the latest captured frame
    pub fn latest_frame(&self) -> Option<CameraFrame> {
        if !self.has_frame.load(Ordering::Acquire) {
            return None;
        }
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.frames[slot].lock().clone()
    }

    /// Resolution the device actually delivers
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop capturing and release the device
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
