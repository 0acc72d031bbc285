//! Status bar with timed messages

use std::time::{Duration, Instant};

use log::Level;

/// How long warnings stay visible
pub const WARNING_DURATION: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
struct StatusMessage {
    text: String,
    level: Level,
    expires_at: Option<Instant>,
}

/// Single-line status bar
///
/// Info messages stay until replaced; warnings disappear after
/// [`WARNING_DURATION`] and the previous info message shows again.
#[derive(Default)]
pub struct StatusBar {
    info: Option<String>,
    warning: Option<StatusMessage>,
}

impl StatusBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_info(&mut self, text: impl Into<String>) {
        self.info = Some(text.into());
    }

    pub fn set_warning(&mut self, text: impl Into<String>, now: Instant) {
        self.warning = Some(StatusMessage {
            text: text.into(),
            level: Level::Warn,
            expires_at: Some(now + WARNING_DURATION),
        });
    }

    /// Route a log record: warnings are timed, everything else is info
    pub fn push(&mut self, level: Level, text: impl Into<String>, now: Instant) {
        match level {
            Level::Warn => self.set_warning(text, now),
            _ => self.set_info(text),
        }
    }

    /// Text to show at `now`, with its level
    pub fn current(&mut self, now: Instant) -> Option<(&str, Level)> {
        if let Some(expires_at) = self.warning.as_ref().and_then(|w| w.expires_at) {
            if now >= expires_at {
                self.warning = None;
            }
        }

        match &self.warning {
            Some(warning) => Some((warning.text.as_str(), warning.level)),
            None => self.info.as_deref().map(|text| (text, Level::Info)),
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, now: Instant) {
        let (text, color) = match self.current(now) {
            Some((text, Level::Warn)) => (text.to_string(), egui::Color32::from_rgb(230, 180, 60)),
            Some((text, _)) => (text.to_string(), egui::Color32::LIGHT_GRAY),
            None => ("Ready".to_string(), egui::Color32::GRAY),
        };
        ui.label(egui::RichText::new(text).color(color));
    }
}
