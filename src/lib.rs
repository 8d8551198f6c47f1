//! Media catalog pipeline
//!
//! Scans a media root into a SQLite catalog, imports per-type metadata
//! (hash, dimensions, capture time, location, fingerprint) and keeps a
//! thumbnail cache, reporting progress through a shared status value.

pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod importer;
pub mod library;
pub mod metadata;
pub mod models;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod thumbnail;

pub use classify::{classify, Classifier};
pub use config::{LibraryConfig, LibraryConfigBuilder};
pub use db::CatalogDatabase;
pub use error::{CatalogError, CatalogErrorKind, Result};
pub use importer::import_pending;
pub use library::{ImportTicket, MediaLibrary};
pub use models::{
    CatalogEntry, EntryOutcome, EntryReport, FileStatus, GeoPoint, ImageDetails, ImportStep,
    ImportSummary, MediaDetails, MediaType, ScanResult, StepOutcome, TextDetails,
    ThumbnailSummary, VideoDetails,
};
pub use probe::{Ffprobe, ProbeReport, VideoProber};
pub use progress::{Stage, StatusSnapshot, StatusTracker};
pub use scanner::scan_library;
pub use thumbnail::{generate_thumbnails, FfmpegPreview, PreviewRenderer};
