//! Error types for the media catalog

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur while cataloging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// I/O error during file operations
    IoError,
    /// Catalog store operation failed
    DatabaseError,
    /// Image could not be decoded or encoded
    DecodeError,
    /// Embedded metadata could not be read
    MetadataError,
    /// External probe or transcoder failed
    ExternalTool,
    /// Background worker could not be started or joined
    Worker,
    /// Unknown error
    Unknown,
}

/// Represents an error that occurred in one of the pipeline stages
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct CatalogError {
    /// The kind of error
    pub kind: CatalogErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub fn new(kind: CatalogErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            CatalogErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    pub fn io_error(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::IoError, path, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::DatabaseError, None, message)
    }

    pub fn external_tool(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::ExternalTool, Some(path), message)
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::Worker, None, message)
    }

    /// Attach the path the error relates to
    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Short form used in step outcomes and log lines
    pub fn reason(&self) -> String {
        format!("{:?}: {}", self.kind, self.message)
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => CatalogErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => CatalogErrorKind::NotFound,
            _ => CatalogErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<walkdir::Error> for CatalogError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let kind = if err.io_error().map(|e| e.kind()) == Some(std::io::ErrorKind::PermissionDenied)
        {
            CatalogErrorKind::PermissionDenied
        } else {
            CatalogErrorKind::IoError
        };
        Self::new(kind, path, err.to_string())
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database_error(err.to_string())
    }
}

impl From<image::ImageError> for CatalogError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => io.into(),
            other => Self::new(CatalogErrorKind::DecodeError, None, other.to_string()),
        }
    }
}

impl From<exif::Error> for CatalogError {
    fn from(err: exif::Error) -> Self {
        match err {
            exif::Error::Io(io) => io.into(),
            other => Self::new(CatalogErrorKind::MetadataError, None, other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(CatalogErrorKind::ExternalTool, None, err.to_string())
    }
}
