//! Scanner module - discovers new media files under the managed root

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Mutex;
use walkdir::{DirEntry, WalkDir};

use crate::classify::Classifier;
use crate::config::LibraryConfig;
use crate::db::{lock_catalog, CatalogDatabase};
use crate::error::{CatalogError, Result};
use crate::models::{CatalogEntry, MediaDetails, MediaType, ScanResult};
use crate::progress::{Stage, StageTimer, StatusTracker};

/// Walk the root and register every unseen media file at `SCANNED`
///
/// Re-running against an unchanged tree registers nothing. Per-file
/// failures are collected in [`ScanResult::errors`] and never stop the walk.
pub fn scan_library(
    config: &LibraryConfig,
    db: &Mutex<CatalogDatabase>,
    status: &StatusTracker,
) -> ScanResult {
    let timer = StageTimer::start();
    let classifier = Classifier::new(config);
    let cache_path = config.cache_path();
    let mut result = ScanResult::new();

    status.set(Stage::Scan, "Scanning...");
    info!("Scanning {}", config.root.display());

    if !config.root.exists() {
        result.errors.push(CatalogError::not_found(config.root.clone()));
    } else {
        let walker = WalkDir::new(&config.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_pruned(entry, config, &cache_path));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let err = CatalogError::from(e);
                    warn!("Skipping unreadable entry: {}", err);
                    result.errors.push(err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            result.total_files += 1;

            let path = entry.path();
            let Some(media_type) = classifier.catalog_type(path) else {
                debug!("Skipped non-media file: {}", path.display());
                result.skipped_files += 1;
                continue;
            };

            let path_str = path.to_string_lossy().into_owned();
            match register(db, path, &path_str, media_type) {
                Ok(true) => {
                    debug!("New file scanned: {}", path_str);
                    result.new_paths.push(path_str);
                    status.set(
                        Stage::Scan,
                        format!("Scanning... {} new files", result.new_paths.len()),
                    );
                }
                Ok(false) => {
                    debug!("Skipped already cataloged file: {}", path_str);
                    result.known_files += 1;
                }
                Err(e) => {
                    warn!("Failed to catalog {}: {}", path_str, e);
                    result.errors.push(e.at(path));
                }
            }
        }
    }

    result.duration_ms = timer.elapsed_ms();
    let summary = format!(
        "Scan of {} is over in {}",
        result.new_paths.len(),
        timer.seconds()
    );
    info!(
        "{} ({} files visited, {} known, {} skipped, {} errors)",
        summary,
        result.total_files,
        result.known_files,
        result.skipped_files,
        result.error_count()
    );
    status.finish(Stage::Scan, summary);
    result
}

/// Directories the walk never descends into
fn is_pruned(entry: &DirEntry, config: &LibraryConfig, cache_path: &Path) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    if entry.path() == cache_path {
        return true;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| config.should_ignore_dir(name))
        .unwrap_or(false)
}

/// Create the entry unless the path is already cataloged
///
/// Lookup and insert happen under one lock acquisition.
fn register(
    db: &Mutex<CatalogDatabase>,
    path: &Path,
    path_str: &str,
    media_type: MediaType,
) -> Result<bool> {
    let Some(details) = MediaDetails::empty_for(media_type) else {
        return Ok(false);
    };

    let mut db = lock_catalog(db);
    if db.contains_path(path_str)? {
        return Ok(false);
    }

    let metadata = std::fs::metadata(path)?;
    let created_date: DateTime<Utc> = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let entry = CatalogEntry::scanned(path_str, metadata.len(), created_date, details);
    db.insert_entry(&entry)?;
    Ok(true)
}
