//! Media classification and validity filtering
//!
//! Both checks look at the path string only; file contents are never read.

use std::path::{Path, PathBuf};

use crate::config::LibraryConfig;
use crate::models::MediaType;

/// Classify a path by its extension's MIME type
pub fn classify(path: &Path) -> MediaType {
    mime_guess::from_path(path)
        .first()
        .map(|mime| MediaType::from_mime_top_level(mime.type_().as_str()))
        .unwrap_or(MediaType::Unknown)
}

/// Decides which walked files become catalog entries
#[derive(Debug, Clone)]
pub struct Classifier {
    cache_path: PathBuf,
    config: LibraryConfig,
}

impl Classifier {
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            cache_path: config.cache_path(),
            config: config.clone(),
        }
    }

    /// False for files inside the thumbnail cache and OS noise files
    pub fn is_valid(&self, path: &Path) -> bool {
        if path.starts_with(&self.cache_path) {
            return false;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => !self.config.is_noise_file(name),
            None => false,
        }
    }

    /// Whether a type gets catalog entries under this configuration
    pub fn is_cataloged(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Image | MediaType::Video => true,
            MediaType::Text => self.config.catalog_text,
            MediaType::Audio | MediaType::Unknown => false,
        }
    }

    /// Combined decision: the type bucket if the file should be cataloged
    pub fn catalog_type(&self, path: &Path) -> Option<MediaType> {
        if !self.is_valid(path) {
            return None;
        }
        let media_type = classify(path);
        self.is_cataloged(media_type).then_some(media_type)
    }
}
