//! Image previews backed by egui textures

use egui::{ColorImage, TextureHandle, TextureOptions};
use image::RgbImage;

/// Largest size fitting `image` into `max` with the aspect ratio kept
pub fn fit_size(image: [usize; 2], max: egui::Vec2) -> egui::Vec2 {
    let (w, h) = (image[0] as f32, image[1] as f32);
    if w <= 0.0 || h <= 0.0 {
        return egui::Vec2::ZERO;
    }
    let scale = (max.x / w).min(max.y / h);
    egui::vec2(w * scale, h * scale)
}

/// A texture updated in place from RGB frames
pub struct ImagePreview {
    name: &'static str,
    max_size: egui::Vec2,
    texture: Option<TextureHandle>,
    status: String,
}

impl ImagePreview {
    pub fn new(name: &'static str, max_size: egui::Vec2, status: impl Into<String>) -> Self {
        Self {
            name,
            max_size,
            texture: None,
            status: status.into(),
        }
    }

    /// Upload `image`, reusing the texture when one exists
    pub fn set_image(&mut self, ctx: &egui::Context, image: &RgbImage) {
        let size = [image.width() as usize, image.height() as usize];
        let color_image = ColorImage::from_rgb(size, image.as_raw());
        match &mut self.texture {
            Some(texture) => texture.set(color_image, TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture(self.name, color_image, TextureOptions::LINEAR));
            }
        }
    }

    pub fn clear(&mut self) {
        self.texture = None;
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Draw the image (or a placeholder box) within `available`, followed by
    /// the status line
    pub fn show(&self, ui: &mut egui::Ui, available: egui::Vec2, placeholder: &str) {
        let max = self.max_size.min(available).max(egui::vec2(64.0, 48.0));

        match &self.texture {
            Some(texture) => {
                let size = fit_size(texture.size(), max);
                ui.add(egui::Image::new((texture.id(), size)));
            }
            None => {
                let (rect, _) = ui.allocate_exact_size(max, egui::Sense::hover());
                ui.painter().rect_filled(rect, 4.0, egui::Color32::from_gray(30));
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    placeholder,
                    egui::FontId::proportional(16.0),
                    egui::Color32::GRAY,
                );
            }
        }
        ui.label(egui::RichText::new(&self.status).color(egui::Color32::LIGHT_GRAY));
    }
}
