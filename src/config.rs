//! Configuration for the media catalog

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Name of the thumbnail cache directory under the managed root
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Name of the catalog database file under the managed root
pub const DEFAULT_DB_FILE: &str = "catalog.db";

/// Bounding box (square) for generated thumbnails
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 256;

/// Length of the animated video preview in seconds
pub const DEFAULT_PREVIEW_SECONDS: f32 = 2.0;

/// Frame rate of the animated video preview
pub const DEFAULT_PREVIEW_FPS: u32 = 10;

/// Read buffer used for streaming content hashes
pub const DEFAULT_HASH_BUFFER: usize = 64 * 1024;

/// Configuration for the catalog pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Managed root directory
    pub root: PathBuf,

    /// Thumbnail cache directory, relative to the root unless absolute
    pub cache_dir: PathBuf,

    /// Database path; defaults to `<root>/catalog.db`
    pub db_path: Option<PathBuf>,

    /// OS-generated file names that are never cataloged
    pub noise_files: HashSet<String>,

    /// Directory names that are never descended into
    pub ignore_dirs: HashSet<String>,

    /// Whether text files get catalog entries
    pub catalog_text: bool,

    /// Thumbnail bounding box edge in pixels
    pub thumbnail_size: u32,

    /// Seconds of video sampled into the animated preview
    pub preview_seconds: f32,

    /// Frame rate of the animated preview
    pub preview_fps: u32,

    /// Number of thumbnail workers
    /// 0 means auto-detect (CPU cores × 2)
    pub num_threads: usize,

    /// Buffer size for streaming content hashes
    pub hash_buffer_size: usize,

    /// ffmpeg executable used for video previews
    pub ffmpeg_path: String,

    /// ffprobe executable used for video metadata
    pub ffprobe_path: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            db_path: None,
            noise_files: Self::default_noise_files(),
            ignore_dirs: Self::default_ignore_dirs(),
            catalog_text: false,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            preview_seconds: DEFAULT_PREVIEW_SECONDS,
            preview_fps: DEFAULT_PREVIEW_FPS,
            num_threads: 0,
            hash_buffer_size: DEFAULT_HASH_BUFFER,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl LibraryConfig {
    /// Create a new config for the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Create a config builder
    pub fn builder() -> LibraryConfigBuilder {
        LibraryConfigBuilder::new()
    }

    /// File names dropped by operating systems next to real media
    pub fn default_noise_files() -> HashSet<String> {
        [".DS_Store", "Thumbs.db", "desktop.ini", ".directory"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Get the default directories to ignore
    pub fn default_ignore_dirs() -> HashSet<String> {
        [
            "$RECYCLE.BIN",
            "System Volume Information",
            ".Trash",
            ".Trash-1000",
            "@eaDir",
            ".git",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Absolute-or-root-relative location of the thumbnail cache
    pub fn cache_path(&self) -> PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        } else {
            self.root.join(&self.cache_dir)
        }
    }

    /// Location of the catalog database
    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_DB_FILE))
    }

    /// Check if a file name is OS noise
    pub fn is_noise_file(&self, name: &str) -> bool {
        // AppleDouble resource forks
        name.starts_with("._") || self.noise_files.contains(name)
    }

    /// Check if a directory should be ignored
    pub fn should_ignore_dir(&self, name: &str) -> bool {
        self.ignore_dirs.contains(name)
    }

    /// Get the effective number of threads
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            // Auto-detect: CPU cores × 2
            std::thread::available_parallelism()
                .map(|p| p.get() * 2)
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }
}

/// Builder for LibraryConfig
#[derive(Debug, Default)]
pub struct LibraryConfigBuilder {
    config: LibraryConfig,
}

impl LibraryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: PathBuf) -> Self {
        self.config.root = root;
        self
    }

    pub fn cache_dir(mut self, dir: PathBuf) -> Self {
        self.config.cache_dir = dir;
        self
    }

    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Add a file name to the noise list
    pub fn add_noise_file(mut self, name: impl Into<String>) -> Self {
        self.config.noise_files.insert(name.into());
        self
    }

    pub fn ignore_dirs(mut self, dirs: HashSet<String>) -> Self {
        self.config.ignore_dirs = dirs;
        self
    }

    pub fn add_ignore_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.ignore_dirs.insert(dir.into());
        self
    }

    /// Enable or disable cataloging of text files
    pub fn catalog_text(mut self, enabled: bool) -> Self {
        self.config.catalog_text = enabled;
        self
    }

    pub fn thumbnail_size(mut self, size: u32) -> Self {
        self.config.thumbnail_size = size;
        self
    }

    pub fn preview_seconds(mut self, seconds: f32) -> Self {
        self.config.preview_seconds = seconds;
        self
    }

    pub fn preview_fps(mut self, fps: u32) -> Self {
        self.config.preview_fps = fps;
        self
    }

    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    pub fn hash_buffer_size(mut self, size: usize) -> Self {
        self.config.hash_buffer_size = size.max(1);
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn ffprobe_path(mut self, path: impl Into<String>) -> Self {
        self.config.ffprobe_path = path.into();
        self
    }

    pub fn build(self) -> LibraryConfig {
        self.config
    }
}
