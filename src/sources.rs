//! Source image library
//!
//! Named collection of the face images the user can swap in. Names are file
//! base names; the first image added becomes the selection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;

/// Extensions offered in the file dialog
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Cannot load image {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image {} has no file name", .0.display())]
    NoFileName(PathBuf),

    #[error("Unsupported image format: {}", .0.display())]
    Unsupported(PathBuf),
}

struct SourceEntry {
    name: String,
    image: Arc<RgbImage>,
}

/// Ordered source images with an optional selection
#[derive(Default)]
pub struct SourceLibrary {
    entries: Vec<SourceEntry>,
    selected: Option<usize>,
}

impl SourceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `image` under `name`, replacing an entry with the same name.
    ///
    /// Returns the entry index.
    pub fn add(&mut self, name: impl Into<String>, image: RgbImage) -> usize {
        let name = name.into();
        let image = Arc::new(image);

        let index = match self.entries.iter().position(|e| e.name == name) {
            Some(index) => {
                self.entries[index].image = image;
                index
            }
            None => {
                self.entries.push(SourceEntry { name, image });
                self.entries.len() - 1
            }
        };

        if self.selected.is_none() {
            self.selected = Some(index);
        }
        index
    }

    /// Decode an image file and add it under its base name
    pub fn load_file(&mut self, path: &Path) -> Result<usize, SourceError> {
        if !is_supported(path) {
            return Err(SourceError::Unsupported(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SourceError::NoFileName(path.to_path_buf()))?;
        let image = image::open(path)
            .map_err(|source| SourceError::Load {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();

        log::info!("Loaded source image {} ({}x{})", name, image.width(), image.height());
        Ok(self.add(name, image))
    }

    /// Select the entry called `name`. Returns false if there is none.
    pub fn select(&mut self, name: &str) -> bool {
        match self.entries.iter().position(|e| e.name == name) {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected.map(|i| self.entries[i].name.as_str())
    }

    /// The selected image, shared so it can be handed to the swap worker
    pub fn selected(&self) -> Option<Arc<RgbImage>> {
        self.selected.map(|i| self.entries[i].image.clone())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// True if `path` has one of the [`SUPPORTED_EXTENSIONS`]
fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
