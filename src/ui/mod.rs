//! UI panels and widgets

pub mod control_panel;
pub mod dialogs;
pub mod preview;
pub mod status_bar;

pub use control_panel::{ControlPanel, ControlPanelState};
pub use dialogs::{DialogKind, DialogQueue};
pub use preview::ImagePreview;
pub use status_bar::StatusBar;

use crate::settings::CaptureResolution;

/// Actions returned from the UI for the app to apply
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    /// Open the file dialog for source images
    AddSourceImages,
    SelectSource(String),
    SetResolution(CaptureResolution),
    SetCameraIndex(u32),
    RefreshCameras,
    /// Start or stop the camera
    ToggleCamera,
    SetSwapEnabled(bool),
}

/// Dark theme
pub fn apply_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.visuals = egui::Visuals::dark();
    style.visuals.window_shadow = egui::epaint::Shadow::NONE;
    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    ctx.set_style(style);
}
