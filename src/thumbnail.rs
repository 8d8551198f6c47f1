//! Thumbnail cache generation
//!
//! Images get a JPEG still, videos an animated WebP preview rendered by an
//! external tool. Artifacts are named after the entry id and written through
//! a temp file so a reader never sees a half-written thumbnail.

use image::ImageFormat;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::config::LibraryConfig;
use crate::db::{lock_catalog, CatalogDatabase};
use crate::error::{CatalogError, CatalogErrorKind, Result};
use crate::metadata::decode_image;
use crate::models::{CatalogEntry, MediaType, ThumbnailSummary};
use crate::progress::{Stage, StageTimer, StatusTracker};

pub const IMAGE_THUMBNAIL_EXTENSION: &str = "jpg";
pub const VIDEO_THUMBNAIL_EXTENSION: &str = "webp";

/// Cache location of an entry's thumbnail
pub fn thumbnail_path(cache_dir: &Path, entry: &CatalogEntry) -> PathBuf {
    let extension = match entry.media_type() {
        MediaType::Video => VIDEO_THUMBNAIL_EXTENSION,
        _ => IMAGE_THUMBNAIL_EXTENSION,
    };
    cache_dir.join(format!("{}.{}", entry.id, extension))
}

/// Hidden sibling used while an artifact is being written
fn temp_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple()))
}

fn persist(tmp: &Path, destination: &Path) -> Result<()> {
    fs::rename(tmp, destination).map_err(|e| CatalogError::from(e).at(destination))
}

/// Renders a video preview into `destination`
pub trait PreviewRenderer: Send + Sync {
    fn render(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// [`PreviewRenderer`] backed by the `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct FfmpegPreview {
    ffmpeg_path: String,
    seconds: f32,
    fps: u32,
    size: u32,
}

impl FfmpegPreview {
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            seconds: config.preview_seconds,
            fps: config.preview_fps,
            size: config.thumbnail_size,
        }
    }

    fn filter(&self) -> String {
        format!(
            "fps={fps},scale='min({size},iw)':'min({size},ih)':force_original_aspect_ratio=decrease",
            fps = self.fps,
            size = self.size
        )
    }

    fn run(&self, source: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .arg("-i")
            .arg(source)
            .args(["-t", &self.seconds.to_string()])
            .args(["-vf", &self.filter()])
            .args(["-c:v", "libwebp", "-lossless", "1", "-loop", "0"])
            .args(["-fps_mode", "passthrough", "-preset", "default"])
            .args(["-an", "-f", "webp"])
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                CatalogError::external_tool(
                    source.to_path_buf(),
                    format!("failed to execute {}: {}", self.ffmpeg_path, e),
                )
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CatalogError::external_tool(
                source.to_path_buf(),
                format!("ffmpeg exited with {}: {}", result.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

impl PreviewRenderer for FfmpegPreview {
    fn render(&self, source: &Path, destination: &Path) -> Result<()> {
        let tmp = temp_path(destination);
        let rendered = self
            .run(source, &tmp)
            .and_then(|_| persist(&tmp, destination));
        if rendered.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        rendered
    }
}

/// Write a JPEG still fitting inside `size`×`size`
///
/// Aspect ratio is preserved and small images are never upscaled.
pub fn write_image_thumbnail(source: &Path, destination: &Path, size: u32) -> Result<()> {
    let image = decode_image(source)?;
    let image = if image.width() > size || image.height() > size {
        image.thumbnail(size, size)
    } else {
        image
    };

    let tmp = temp_path(destination);
    let written = image
        .to_rgb8()
        .save_with_format(&tmp, ImageFormat::Jpeg)
        .map_err(|e| CatalogError::from(e).at(destination))
        .and_then(|_| persist(&tmp, destination));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

enum Produced {
    Generated,
    Cached,
}

fn thumbnail_entry(
    entry: &CatalogEntry,
    cache_dir: &Path,
    size: u32,
    renderer: &dyn PreviewRenderer,
) -> Result<Produced> {
    let destination = thumbnail_path(cache_dir, entry);
    if destination.exists() {
        return Ok(Produced::Cached);
    }

    let source = entry.file_path();
    match entry.media_type() {
        MediaType::Video => renderer.render(&source, &destination)?,
        _ => write_image_thumbnail(&source, &destination, size)?,
    }
    Ok(Produced::Generated)
}

/// Produce missing thumbnails for every image and video entry
///
/// Entries whose artifact already exists are left alone. Individual
/// failures are counted and logged; only setup failures (cache directory,
/// catalog read, worker pool) are returned as errors.
pub fn generate_thumbnails(
    config: &LibraryConfig,
    db: &Mutex<CatalogDatabase>,
    renderer: &dyn PreviewRenderer,
    status: &StatusTracker,
) -> Result<ThumbnailSummary> {
    let timer = StageTimer::start();
    status.set(Stage::Thumbnail, "Thumbnailing...");

    let cache_dir = config.cache_path();
    fs::create_dir_all(&cache_dir).map_err(|e| CatalogError::from(e).at(&cache_dir))?;

    let entries: Vec<CatalogEntry> = {
        let db = lock_catalog(db);
        let mut entries = db.entries(MediaType::Image, None)?;
        entries.extend(db.entries(MediaType::Video, None)?);
        entries
    };
    let total = entries.len() as u64;
    info!(
        "Thumbnailing {} entries into {} with {} threads",
        total,
        cache_dir.display(),
        config.effective_threads()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_threads())
        .thread_name(|i| format!("thumbnail-{}", i))
        .build()
        .map_err(|e| CatalogError::new(CatalogErrorKind::Worker, None, e.to_string()))?;

    let generated = AtomicU64::new(0);
    let skipped = AtomicU64::new(0);
    let failed = AtomicU64::new(0);
    let done = AtomicU64::new(0);

    pool.install(|| {
        entries.par_iter().for_each(|entry| {
            match thumbnail_entry(entry, &cache_dir, config.thumbnail_size, renderer) {
                Ok(Produced::Generated) => {
                    debug!("Thumbnail written for {}", entry.path);
                    generated.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Produced::Cached) => {
                    debug!("Thumbnail already cached for {}", entry.path);
                    skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Thumbnail failed for {}: {}", entry.path, e);
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            status.set(
                Stage::Thumbnail,
                format!("Thumbnailing... {}/{}", finished, total),
            );
        });
    });

    let summary = ThumbnailSummary {
        total,
        generated: generated.into_inner(),
        skipped: skipped.into_inner(),
        failed: failed.into_inner(),
        duration_ms: timer.elapsed_ms(),
    };
    let message = format!(
        "Thumbnailing of {} is over in {}",
        summary.generated,
        timer.seconds()
    );
    info!(
        "{} ({} cached, {} failed)",
        message, summary.skipped, summary.failed
    );
    status.finish(Stage::Thumbnail, message);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaDetails;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    struct CountingRenderer(AtomicUsize);

    impl PreviewRenderer for CountingRenderer {
        fn render(&self, _source: &Path, destination: &Path) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            fs::write(destination, b"RIFF....WEBP")?;
            Ok(())
        }
    }

    fn entry(path: &Path, media_type: MediaType) -> CatalogEntry {
        CatalogEntry::scanned(
            path.to_string_lossy(),
            0,
            Utc::now(),
            MediaDetails::empty_for(media_type).unwrap(),
        )
    }

    #[test]
    fn test_thumbnail_path_by_type() {
        let image = entry(Path::new("/m/a.jpg"), MediaType::Image);
        let video = entry(Path::new("/m/b.mp4"), MediaType::Video);
        let cache = Path::new("/m/cache");
        assert_eq!(
            thumbnail_path(cache, &image),
            cache.join(format!("{}.jpg", image.id))
        );
        assert_eq!(
            thumbnail_path(cache, &video),
            cache.join(format!("{}.webp", video.id))
        );
    }

    #[test]
    fn test_image_thumbnail_fits_and_keeps_aspect() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        image::RgbImage::from_pixel(800, 400, image::Rgb([0, 128, 255]))
            .save(&source)
            .unwrap();
        let destination = dir.path().join("wide.jpg");

        write_image_thumbnail(&source, &destination, 256).unwrap();

        let thumb = image::open(&destination).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (256, 128));
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_image_thumbnail_never_upscales() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tiny.png");
        image::RgbImage::new(40, 20).save(&source).unwrap();
        let destination = dir.path().join("tiny.jpg");

        write_image_thumbnail(&source, &destination, 256).unwrap();

        let thumb = image::open(&destination).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (40, 20));
    }

    #[test]
    fn test_undecodable_image_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bad.jpg");
        fs::write(&source, b"nope").unwrap();
        let destination = dir.path().join("out.jpg");

        assert!(write_image_thumbnail(&source, &destination, 256).is_err());
        assert!(!destination.exists());
    }

    #[test]
    fn test_ffmpeg_filter_bounds_longest_side() {
        let config = LibraryConfig::builder()
            .root(PathBuf::from("/m"))
            .thumbnail_size(128)
            .preview_fps(5)
            .build();
        let preview = FfmpegPreview::from_config(&config);
        assert_eq!(
            preview.filter(),
            "fps=5,scale='min(128,iw)':'min(128,ih)':force_original_aspect_ratio=decrease"
        );
    }

    #[test]
    fn test_missing_ffmpeg_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LibraryConfig::builder()
            .root(dir.path().to_path_buf())
            .ffmpeg_path("/nonexistent/ffmpeg")
            .build();
        let destination = dir.path().join("x.webp");
        let err = FfmpegPreview::from_config(&config)
            .render(Path::new("clip.mp4"), &destination)
            .unwrap_err();
        assert_eq!(err.kind, CatalogErrorKind::ExternalTool);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_generate_skips_cached_and_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::RgbImage::new(300, 300).save(&good).unwrap();
        let bad = dir.path().join("bad.jpg");
        fs::write(&bad, b"garbage").unwrap();
        let clip = dir.path().join("clip.mp4");
        fs::write(&clip, b"mp4").unwrap();

        let config = LibraryConfig::builder()
            .root(dir.path().to_path_buf())
            .num_threads(2)
            .build();
        let db = Mutex::new(CatalogDatabase::open_memory().unwrap());
        {
            let mut db = db.lock().unwrap();
            db.insert_entry(&entry(&good, MediaType::Image)).unwrap();
            db.insert_entry(&entry(&bad, MediaType::Image)).unwrap();
            db.insert_entry(&entry(&clip, MediaType::Video)).unwrap();
        }
        let renderer = CountingRenderer(AtomicUsize::new(0));
        let status = StatusTracker::new();

        let first = generate_thumbnails(&config, &db, &renderer, &status).unwrap();
        assert_eq!((first.total, first.generated, first.failed), (3, 2, 1));
        assert_eq!(renderer.0.load(Ordering::SeqCst), 1);
        assert!(status.current().starts_with("Thumbnailing of 2 is over in "));

        let second = generate_thumbnails(&config, &db, &renderer, &status).unwrap();
        assert_eq!((second.generated, second.skipped, second.failed), (0, 2, 1));
        assert_eq!(renderer.0.load(Ordering::SeqCst), 1);
    }
}
