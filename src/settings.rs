//! Persisted user settings
//!
//! Stored as JSON under the platform config directory. Missing or unreadable
//! files fall back to defaults.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ml::ModelConfig;

/// Capture resolutions offered in the camera panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureResolution {
    #[serde(rename = "640x480")]
    Vga,
    #[default]
    #[serde(rename = "1280x720")]
    Hd,
    #[serde(rename = "1920x1080")]
    FullHd,
}

impl CaptureResolution {
    pub const ALL: [CaptureResolution; 3] = [
        CaptureResolution::Vga,
        CaptureResolution::Hd,
        CaptureResolution::FullHd,
    ];

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            CaptureResolution::Vga => (640, 480),
            CaptureResolution::Hd => (1280, 720),
            CaptureResolution::FullHd => (1920, 1080),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CaptureResolution::Vga => "640x480",
            CaptureResolution::Hd => "1280x720",
            CaptureResolution::FullHd => "1920x1080",
        }
    }
}

impl fmt::Display for CaptureResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CaptureResolution {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.label() == s.trim())
            .ok_or_else(|| SettingsError::InvalidResolution(s.to_string()))
    }
}

/// Settings-related errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not find config directory")]
    NoConfigDir,

    #[error("Unknown resolution: {0}")]
    InvalidResolution(String),
}

/// Application settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Directory holding the ONNX models (searched before the defaults)
    pub model_dir: Option<PathBuf>,
    pub camera_index: u32,
    pub resolution: CaptureResolution,
    /// UI tick interval
    pub frame_interval_ms: u64,
    /// Square detector input size
    pub detection_size: u32,
    pub detection_threshold: f32,
    pub nms_threshold: f32,
    /// Whether the face swap is applied to the live preview
    pub swap_enabled: bool,
    pub intra_threads: usize,
    pub use_gpu: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_dir: None,
            camera_index: 0,
            resolution: CaptureResolution::default(),
            frame_interval_ms: 30,
            detection_size: 320,
            detection_threshold: 0.5,
            nms_threshold: 0.4,
            swap_enabled: true,
            intra_threads: 4,
            use_gpu: true,
        }
    }
}

impl AppSettings {
    const APP_DIR: &'static str = "LiveFaceSwap";
    const FILE_NAME: &'static str = "settings.json";

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(Self::APP_DIR);
            p.push(Self::FILE_NAME);
            p
        })
    }

    /// Pull every field back into its valid range
    pub fn clamp(&mut self) {
        self.frame_interval_ms = self.frame_interval_ms.clamp(10, 1000);
        let size = self.detection_size.clamp(160, 1024);
        self.detection_size = (size / 32) * 32;
        self.detection_threshold = sanitize_unit(self.detection_threshold, 0.5);
        self.nms_threshold = sanitize_unit(self.nms_threshold, 0.4);
        self.intra_threads = self.intra_threads.clamp(1, 16);
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&contents)?;
        settings.clamp();
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => {
                log::debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                log::warn!("Failed to load settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::default_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to_file(&path)
    }

    /// Model loading options derived from these settings
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_dir: self.model_dir.clone(),
            detection_size: self.detection_size,
            detection_threshold: self.detection_threshold,
            nms_threshold: self.nms_threshold,
            intra_threads: self.intra_threads,
            use_gpu: self.use_gpu,
        }
    }
}

fn sanitize_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.frame_interval_ms, 30);
        assert_eq!(settings.resolution, CaptureResolution::Hd);
        assert!(settings.swap_enabled);
        assert_eq!(settings.model_config(), ModelConfig::default());
    }

    #[test]
    fn test_clamping() {
        let mut settings = AppSettings {
            frame_interval_ms: 1,
            detection_size: 650,
            detection_threshold: 1.5,
            nms_threshold: f32::NAN,
            intra_threads: 0,
            ..AppSettings::default()
        };
        settings.clamp();
        assert_eq!(settings.frame_interval_ms, 10);
        assert_eq!(settings.detection_size, 640);
        assert_eq!(settings.detection_threshold, 1.0);
        assert_eq!(settings.nms_threshold, 0.4);
        assert_eq!(settings.intra_threads, 1);

        settings.detection_size = 5000;
        settings.clamp();
        assert_eq!(settings.detection_size, 1024);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir()
            .join(format!("live-face-swap-settings-{}", std::process::id()))
            .join("settings.json");
        let settings = AppSettings {
            camera_index: 2,
            resolution: CaptureResolution::FullHd,
            swap_enabled: false,
            model_dir: Some(PathBuf::from("/models")),
            ..AppSettings::default()
        };
        settings.save_to_file(&path).unwrap();

        let loaded = AppSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{ "resolution": "640x480", "camera_index": 1 }"#).unwrap();
        assert_eq!(settings.resolution, CaptureResolution::Vga);
        assert_eq!(settings.camera_index, 1);
        assert_eq!(settings.frame_interval_ms, 30);
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("1920x1080".parse::<CaptureResolution>().unwrap(), CaptureResolution::FullHd);
        assert_eq!(CaptureResolution::Vga.dimensions(), (640, 480));
        assert!("800x600".parse::<CaptureResolution>().is_err());
    }
}
