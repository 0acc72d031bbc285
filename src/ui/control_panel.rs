//! Left-hand control panel

use crate::camera::CameraInfo;
use crate::settings::CaptureResolution;

use super::UiAction;

/// Snapshot of app state the panel displays
pub struct ControlPanelState<'a> {
    pub source_names: Vec<&'a str>,
    pub selected_source: Option<&'a str>,
    pub resolution: CaptureResolution,
    pub camera_index: u32,
    pub camera_running: bool,
    /// Models finished loading (successfully or not)
    pub camera_available: bool,
    pub swap_enabled: bool,
    pub fps: u32,
    /// Most recent swap duration
    pub swap_latency_ms: f64,
    pub swap_average_ms: f64,
}

/// Control panel
pub struct ControlPanel {
    cameras: Vec<CameraInfo>,
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPanel {
    pub fn new() -> Self {
        Self {
            cameras: Vec::new(),
        }
    }

    pub fn set_cameras(&mut self, cameras: Vec<CameraInfo>) {
        self.cameras = cameras;
    }

    pub fn render(&mut self, ui: &mut egui::Ui, state: &ControlPanelState<'_>) -> Vec<UiAction> {
        let mut actions = Vec::new();

        ui.heading("Source images");
        ui.separator();
        if ui.button("Add source images...").clicked() {
            actions.push(UiAction::AddSourceImages);
        }
        ui.add_space(4.0);
        if state.source_names.is_empty() {
            ui.label(egui::RichText::new("No source images").italics().color(egui::Color32::GRAY));
        } else {
            egui::ComboBox::from_label("Source")
                .selected_text(state.selected_source.unwrap_or("-"))
                .width(180.0)
                .show_ui(ui, |ui| {
                    for name in &state.source_names {
                        let selected = state.selected_source == Some(*name);
                        if ui.selectable_label(selected, *name).clicked() && !selected {
                            actions.push(UiAction::SelectSource(name.to_string()));
                        }
                    }
                });
        }

        ui.add_space(12.0);
        ui.heading("Camera");
        ui.separator();

        ui.add_enabled_ui(!state.camera_running, |ui| {
            egui::ComboBox::from_label("Resolution")
                .selected_text(state.resolution.label())
                .show_ui(ui, |ui| {
                    for resolution in CaptureResolution::ALL {
                        if ui
                            .selectable_label(state.resolution == resolution, resolution.label())
                            .clicked()
                        {
                            actions.push(UiAction::SetResolution(resolution));
                        }
                    }
                });

            ui.horizontal(|ui| {
                let selected_text = self
                    .cameras
                    .iter()
                    .find(|c| c.index == state.camera_index)
                    .map(|c| format!("{}: {}", c.index, c.name))
                    .unwrap_or_else(|| format!("Camera {}", state.camera_index));
                egui::ComboBox::from_id_salt("camera_index")
                    .selected_text(selected_text)
                    .width(180.0)
                    .show_ui(ui, |ui| {
                        for camera in &self.cameras {
                            let label = format!("{}: {}", camera.index, camera.name);
                            if ui
                                .selectable_label(state.camera_index == camera.index, label)
                                .clicked()
                            {
                                actions.push(UiAction::SetCameraIndex(camera.index));
                            }
                        }
                        if self.cameras.is_empty() {
                            for index in 0..4 {
                                if ui
                                    .selectable_label(
                                        state.camera_index == index,
                                        format!("Camera {}", index),
                                    )
                                    .clicked()
                                {
                                    actions.push(UiAction::SetCameraIndex(index));
                                }
                            }
                        }
                    });
                if ui.small_button("Refresh").on_hover_text("Refresh cameras").clicked() {
                    actions.push(UiAction::RefreshCameras);
                }
            });
        });

        ui.add_space(4.0);
        let label = if state.camera_running { "Stop camera" } else { "Start camera" };
        let button = ui.add_enabled(
            state.camera_available || state.camera_running,
            egui::Button::new(label).min_size(egui::vec2(140.0, 28.0)),
        );
        if button.clicked() {
            actions.push(UiAction::ToggleCamera);
        }
        if !state.camera_available && !state.camera_running {
            ui.label(egui::RichText::new("Waiting for models...").small().color(egui::Color32::GRAY));
        }

        ui.add_space(12.0);
        ui.heading("Swap settings");
        ui.separator();
        let mut swap_enabled = state.swap_enabled;
        if ui.checkbox(&mut swap_enabled, "Enable face swap").changed() {
            actions.push(UiAction::SetSwapEnabled(swap_enabled));
        }

        ui.add_space(12.0);
        ui.heading("Performance");
        ui.separator();
        ui.label(format!("FPS: {}", state.fps));
        if state.swap_latency_ms > 0.0 {
            ui.label(format!(
                "Swap: {:.0} ms (avg {:.0} ms)",
                state.swap_latency_ms, state.swap_average_ms
            ));
        }

        actions
    }
}
