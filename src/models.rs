//! Core data models for the media catalog

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CatalogError;

/// Lifecycle status of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    /// Discovered by a scan, no metadata yet
    #[default]
    Scanned,
    /// Metadata extraction ran
    Imported,
    /// Reserved for soft deletion
    Trashed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Scanned => "SCANNED",
            FileStatus::Imported => "IMPORTED",
            FileStatus::Trashed => "TRASHED",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown file status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for FileStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCANNED" => Ok(FileStatus::Scanned),
            "IMPORTED" => Ok(FileStatus::Imported),
            "TRASHED" => Ok(FileStatus::Trashed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    /// Recognized as media, but the catalog keeps no audio records
    Audio,
    Text,
    /// Unmapped extension; not media
    Unknown,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Text => "text",
            MediaType::Unknown => "unknown",
        }
    }

    /// Reduce a MIME top-level type to a media bucket
    pub fn from_mime_top_level(top: &str) -> Self {
        match top {
            "image" => MediaType::Image,
            "video" => MediaType::Video,
            "audio" => MediaType::Audio,
            "text" => MediaType::Text,
            _ => MediaType::Unknown,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capture timestamp stored when no embedded timestamp exists (Unix epoch)
pub fn unknown_taken_date() -> NaiveDateTime {
    NaiveDateTime::default()
}

/// Decimal-degree coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetails {
    pub width: u32,
    pub height: u32,
    /// Average-hash fingerprint, hex encoded
    pub phash: String,
    pub taken_date: NaiveDateTime,
    pub geo: Option<GeoPoint>,
}

impl Default for ImageDetails {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            phash: String::new(),
            taken_date: unknown_taken_date(),
            geo: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    /// Seconds
    pub duration: f64,
    pub codec: String,
    /// On-screen width after rotation correction
    pub width: u32,
    /// On-screen height after rotation correction
    pub height: u32,
    pub taken_date: NaiveDateTime,
}

impl Default for VideoDetails {
    fn default() -> Self {
        Self {
            duration: 0.0,
            codec: String::new(),
            width: 0,
            height: 0,
            taken_date: unknown_taken_date(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextDetails {
    pub character_count: u64,
    pub language: String,
}

/// Type-specific extension of a catalog entry; the variant is the type tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaDetails {
    Image(ImageDetails),
    Video(VideoDetails),
    Text(TextDetails),
}

impl MediaDetails {
    /// Empty extension for a freshly scanned file, if the type has one
    pub fn empty_for(media_type: MediaType) -> Option<Self> {
        match media_type {
            MediaType::Image => Some(MediaDetails::Image(ImageDetails::default())),
            MediaType::Video => Some(MediaDetails::Video(VideoDetails::default())),
            MediaType::Text => Some(MediaDetails::Text(TextDetails::default())),
            MediaType::Audio | MediaType::Unknown => None,
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            MediaDetails::Image(_) => MediaType::Image,
            MediaDetails::Video(_) => MediaType::Video,
            MediaDetails::Text(_) => MediaType::Text,
        }
    }
}

/// One managed file and its type extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub path: String,
    pub size: u64,
    /// Hex SHA-256 of the content; empty until imported
    pub hash: String,
    pub status: FileStatus,
    pub created_date: DateTime<Utc>,
    pub added_date: DateTime<Utc>,
    pub details: MediaDetails,
}

impl CatalogEntry {
    /// New entry at `SCANNED` with a fresh identity
    pub fn scanned(
        path: impl Into<String>,
        size: u64,
        created_date: DateTime<Utc>,
        details: MediaDetails,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            size,
            hash: String::new(),
            status: FileStatus::Scanned,
            created_date,
            added_date: Utc::now(),
            details,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.details.media_type()
    }

    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn image(&self) -> Option<&ImageDetails> {
        match &self.details {
            MediaDetails::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoDetails> {
        match &self.details {
            MediaDetails::Video(video) => Some(video),
            _ => None,
        }
    }
}

/// Result of a scan operation
#[derive(Debug, Default, Serialize)]
pub struct ScanResult {
    /// Newly cataloged paths in discovery order
    pub new_paths: Vec<String>,
    /// Regular files visited
    pub total_files: u64,
    /// Files rejected by the classifier or validity filter
    pub skipped_files: u64,
    /// Files already present in the catalog
    pub known_files: u64,
    /// Errors encountered during scanning
    #[serde(skip)]
    pub errors: Vec<CatalogError>,
    /// Total scan duration in milliseconds
    pub duration_ms: u64,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_files(&self) -> usize {
        self.new_paths.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single metadata extraction step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStep {
    Hash,
    Dimensions,
    CaptureTime,
    Location,
    Fingerprint,
    Probe,
    Rotation,
}

/// How a step went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum StepOutcome {
    Done,
    /// The file carries no such metadata
    Absent,
    Failed(String),
}

/// Aggregate outcome of all steps for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOutcome {
    Complete,
    Partial,
    Failed,
}

/// Per-entry record of an import pass
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub id: Uuid,
    pub path: String,
    pub media_type: MediaType,
    pub steps: Vec<(ImportStep, StepOutcome)>,
}

impl EntryReport {
    pub fn new(entry: &CatalogEntry) -> Self {
        Self {
            id: entry.id,
            path: entry.path.clone(),
            media_type: entry.media_type(),
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: ImportStep, outcome: StepOutcome) {
        self.steps.push((step, outcome));
    }

    pub fn step(&self, step: ImportStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn failures(&self) -> impl Iterator<Item = (ImportStep, &str)> {
        self.steps.iter().filter_map(|(step, outcome)| match outcome {
            StepOutcome::Failed(reason) => Some((*step, reason.as_str())),
            _ => None,
        })
    }

    pub fn outcome(&self) -> EntryOutcome {
        let failed = self.failures().count();
        if failed == 0 {
            EntryOutcome::Complete
        } else if failed == self.steps.len() {
            EntryOutcome::Failed
        } else {
            EntryOutcome::Partial
        }
    }
}

/// Result of an import pass
#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub images: u64,
    pub videos: u64,
    pub complete: u64,
    pub partial: u64,
    pub failed: u64,
    /// Entries whose imported state could not be persisted
    pub unsaved: u64,
    pub reports: Vec<EntryReport>,
    pub duration_ms: u64,
}

impl ImportSummary {
    pub fn processed(&self) -> u64 {
        self.images + self.videos
    }

    pub fn push(&mut self, report: EntryReport) {
        match report.media_type {
            MediaType::Video => self.videos += 1,
            _ => self.images += 1,
        }
        match report.outcome() {
            EntryOutcome::Complete => self.complete += 1,
            EntryOutcome::Partial => self.partial += 1,
            EntryOutcome::Failed => self.failed += 1,
        }
        self.reports.push(report);
    }

    pub fn report_for(&self, id: &Uuid) -> Option<&EntryReport> {
        self.reports.iter().find(|r| r.id == *id)
    }
}

/// Result of a thumbnail pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct ThumbnailSummary {
    pub total: u64,
    pub generated: u64,
    /// Artifact already cached
    pub skipped: u64,
    pub failed: u64,
    pub duration_ms: u64,
}
