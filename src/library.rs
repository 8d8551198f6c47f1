//! Library facade tying the pipeline stages to one catalog

use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::config::LibraryConfig;
use crate::db::{lock_catalog, CatalogDatabase};
use crate::error::{CatalogError, Result};
use crate::importer::import_pending;
use crate::models::{CatalogEntry, ImportSummary, ScanResult, ThumbnailSummary};
use crate::probe::{Ffprobe, VideoProber};
use crate::progress::{StatusSnapshot, StatusTracker};
use crate::scanner::scan_library;
use crate::thumbnail::{self, FfmpegPreview, PreviewRenderer};

/// A managed media root with its catalog, status and external tools
///
/// Cloning is cheap; clones share the catalog and status.
#[derive(Clone)]
pub struct MediaLibrary {
    config: Arc<LibraryConfig>,
    db: Arc<Mutex<CatalogDatabase>>,
    status: StatusTracker,
    prober: Arc<dyn VideoProber>,
    renderer: Arc<dyn PreviewRenderer>,
    importing: Arc<AtomicBool>,
}

impl MediaLibrary {
    /// Open (creating if needed) the catalog file for this root
    pub fn open(config: LibraryConfig) -> Result<Self> {
        let path = config.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::from(e).at(parent))?;
        }
        info!("Opening catalog {}", path.display());
        let db = CatalogDatabase::open(&path).map_err(|e| CatalogError::from(e).at(&path))?;
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: LibraryConfig, db: CatalogDatabase) -> Self {
        let prober = Arc::new(Ffprobe::new(config.ffprobe_path.clone()));
        let renderer = Arc::new(FfmpegPreview::from_config(&config));
        Self {
            config: Arc::new(config),
            db: Arc::new(Mutex::new(db)),
            status: StatusTracker::new(),
            prober,
            renderer,
            importing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_prober(mut self, prober: Arc<dyn VideoProber>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PreviewRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Share an existing status value, e.g. one a UI already polls
    pub fn with_status(mut self, status: StatusTracker) -> Self {
        self.status = status;
        self
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn status_tracker(&self) -> &StatusTracker {
        &self.status
    }

    pub fn scan(&self) -> Result<ScanResult> {
        Ok(scan_library(&self.config, &self.db, &self.status))
    }

    /// Import pending entries on the calling thread
    ///
    /// Fails with a `Worker` error while another import of this library
    /// (or of any clone) is still running.
    pub fn import(&self) -> Result<ImportSummary> {
        let _guard = ImportGuard::acquire(&self.importing)?;
        self.import_unguarded()
    }

    fn import_unguarded(&self) -> Result<ImportSummary> {
        import_pending(&self.config, &self.db, self.prober.as_ref(), &self.status)
    }

    /// Start the import on a background thread and return immediately
    ///
    /// The running flag is taken before the thread starts, so a second call
    /// made before this import ends is rejected.
    pub fn spawn_import(&self) -> Result<ImportTicket> {
        let guard = ImportGuard::acquire(&self.importing)?;
        let library = self.clone();
        let started_at = Utc::now();
        let handle = thread::Builder::new()
            .name("catalog-import".into())
            .spawn(move || {
                let _guard = guard;
                library.import_unguarded()
            })
            .map_err(|e| CatalogError::worker(format!("failed to start import: {}", e)))?;
        info!("Import started in the background at {}", started_at);
        Ok(ImportTicket { handle, started_at })
    }

    pub fn is_importing(&self) -> bool {
        self.importing.load(Ordering::Acquire)
    }

    pub fn generate_thumbnails(&self) -> Result<ThumbnailSummary> {
        thumbnail::generate_thumbnails(
            &self.config,
            &self.db,
            self.renderer.as_ref(),
            &self.status,
        )
    }

    /// Latest human-readable status line
    pub fn status(&self) -> String {
        self.status.current()
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Entry counts keyed by status name
    pub fn catalog_counts(&self) -> Result<HashMap<String, u64>> {
        Ok(lock_catalog(&self.db).get_status_counts()?)
    }

    pub fn entry(&self, id: &Uuid) -> Result<Option<CatalogEntry>> {
        Ok(lock_catalog(&self.db).get_entry(id)?)
    }

    pub fn find_by_path(&self, path: &str) -> Result<Option<CatalogEntry>> {
        Ok(lock_catalog(&self.db).find_by_path(path)?)
    }
}

/// Holds the library's import flag until dropped
struct ImportGuard(Arc<AtomicBool>);

impl ImportGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CatalogError::worker("an import is already running"))?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Acknowledgement of a background import
///
/// Dropping the ticket detaches the import; it keeps running.
#[derive(Debug)]
pub struct ImportTicket {
    handle: JoinHandle<Result<ImportSummary>>,
    pub started_at: DateTime<Utc>,
}

impl ImportTicket {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the import ends
    pub fn wait(self) -> Result<ImportSummary> {
        self.handle
            .join()
            .map_err(|_| CatalogError::worker("import thread panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogErrorKind;
    use crate::models::FileStatus;
    use crate::probe::ProbeReport;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_open_creates_database_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let library = MediaLibrary::open(LibraryConfig::new(dir.path().to_path_buf())).unwrap();
        assert!(dir.path().join("catalog.db").exists());
        assert_eq!(library.status(), crate::progress::DEFAULT_STATUS);
        assert!(library.catalog_counts().unwrap().is_empty());
    }

    #[test]
    fn test_clones_share_status_and_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.gif"), b"gif").unwrap();
        let config = LibraryConfig::new(dir.path().to_path_buf());
        let library = MediaLibrary::with_database(config, CatalogDatabase::open_memory().unwrap());
        let other = library.clone();

        library.scan().unwrap();
        assert!(other.status().starts_with("Scan of 1 is over in "));
        assert_eq!(
            other.catalog_counts().unwrap().get(FileStatus::Scanned.as_str()),
            Some(&1)
        );
    }

    #[test]
    fn test_spawn_import_on_empty_catalog() {
        let config = LibraryConfig::new(PathBuf::from("/nonexistent/root"));
        let library = MediaLibrary::with_database(config, CatalogDatabase::open_memory().unwrap());
        let before = Utc::now();
        let ticket = library.spawn_import().unwrap();
        assert!(ticket.started_at >= before);
        let summary = ticket.wait().unwrap();
        assert_eq!(summary.processed(), 0);
        assert!(library.status().starts_with("Last import: "));
        assert!(!library.is_importing());
    }

    struct SlowProbe {
        calls: AtomicUsize,
    }

    impl VideoProber for SlowProbe {
        fn probe(&self, _path: &Path) -> Result<ProbeReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            Ok(ProbeReport {
                duration: Some(1.0),
                codec: Some("h264".into()),
                width: Some(640),
                height: Some(480),
                creation_time: None,
                rotation: None,
            })
        }
    }

    #[test]
    fn test_overlapping_imports_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"\0\0\0\x18ftypmp42").unwrap();
        let probe = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
        });
        let library = MediaLibrary::with_database(
            LibraryConfig::new(dir.path().to_path_buf()),
            CatalogDatabase::open_memory().unwrap(),
        )
        .with_prober(probe.clone());
        library.scan().unwrap();

        let first = library.spawn_import().unwrap();
        assert!(library.is_importing());

        let second = library.spawn_import().unwrap_err();
        assert_eq!(second.kind, CatalogErrorKind::Worker);
        let inline = library.clone().import().unwrap_err();
        assert_eq!(inline.kind, CatalogErrorKind::Worker);

        let summary = first.wait().unwrap();
        assert_eq!(summary.processed(), 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(!library.is_importing());

        let again = library.spawn_import().unwrap().wait().unwrap();
        assert_eq!(again.processed(), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }
}
