//! Modal message dialogs

use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogKind {
    Warning,
    Error,
}

impl DialogKind {
    /// Prefix shown before the message, and its colour
    fn label(self) -> (&'static str, egui::Color32) {
        match self {
            DialogKind::Warning => ("Warning:", egui::Color32::from_rgb(230, 180, 60)),
            DialogKind::Error => ("Error:", egui::Color32::from_rgb(220, 80, 80)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDialog {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
}

/// Queue of dialogs shown one at a time
#[derive(Default)]
pub struct DialogQueue {
    pending: VecDeque<MessageDialog>,
}

impl DialogQueue {
    /// Queued dialogs beyond this are dropped
    const MAX_PENDING: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DialogKind, title: impl Into<String>, message: impl Into<String>) {
        let dialog = MessageDialog {
            kind,
            title: title.into(),
            message: message.into(),
        };
        // Same dialog twice in a row is noise
        if self.pending.back() == Some(&dialog) || self.pending.len() >= Self::MAX_PENDING {
            return;
        }
        self.pending.push_back(dialog);
    }

    pub fn warning(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.push(DialogKind::Warning, title, message);
    }

    pub fn error(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.push(DialogKind::Error, title, message);
    }

    pub fn current(&self) -> Option<&MessageDialog> {
        self.pending.front()
    }

    pub fn dismiss(&mut self) {
        self.pending.pop_front();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Show the front dialog centred over the window
    pub fn show(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.pending.front() else {
            return;
        };

        let (label, color) = dialog.kind.label();

        let mut dismissed = false;
        egui::Window::new(dialog.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(label).strong().color(color));
                    ui.label(dialog.message.as_str());
                });
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });

        if dismissed {
            self.dismiss();
        }
    }
}
