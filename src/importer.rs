//! Metadata importer - fills in per-type details for scanned entries

use image::GenericImageView;
use log::{debug, error, info, warn};
use std::sync::Mutex;

use crate::config::LibraryConfig;
use crate::db::{lock_catalog, CatalogDatabase};
use crate::error::{CatalogError, Result};
use crate::metadata::{
    average_hash, content_hash, decode_image, parse_iso_datetime, true_resolution, ExifData,
};
use crate::models::{
    CatalogEntry, EntryOutcome, EntryReport, FileStatus, ImportStep, ImportSummary,
    MediaDetails, MediaType, StepOutcome, VideoDetails,
};
use crate::probe::VideoProber;
use crate::progress::{Stage, StageTimer, StatusTracker};

/// Import every image and video entry still at `SCANNED`
///
/// Entries are processed one at a time, images first. Step failures are
/// recorded in the entry's report and the entry still advances to
/// `IMPORTED`. Only failing to read the pending list is an error.
pub fn import_pending(
    config: &LibraryConfig,
    db: &Mutex<CatalogDatabase>,
    prober: &dyn VideoProber,
    status: &StatusTracker,
) -> Result<ImportSummary> {
    let timer = StageTimer::start();
    status.set(Stage::Import, "Importing...");

    let (images, videos) = {
        let db = lock_catalog(db);
        (
            db.entries(MediaType::Image, Some(FileStatus::Scanned))?,
            db.entries(MediaType::Video, Some(FileStatus::Scanned))?,
        )
    };
    let total = images.len() + videos.len();
    info!(
        "Importing {} pending entries ({} images, {} videos)",
        total,
        images.len(),
        videos.len()
    );

    let mut summary = ImportSummary::default();
    for (index, mut entry) in images.into_iter().chain(videos).enumerate() {
        status.set(Stage::Import, format!("Importing {} / {}", index + 1, total));

        let report = match entry.media_type() {
            MediaType::Video => import_video(&mut entry, config, prober),
            _ => import_image(&mut entry, config),
        };
        entry.status = FileStatus::Imported;

        match report.outcome() {
            EntryOutcome::Complete => debug!("Imported {}", entry.path),
            outcome => {
                let reasons: Vec<String> = report
                    .failures()
                    .map(|(step, reason)| format!("{:?}: {}", step, reason))
                    .collect();
                warn!(
                    "Import of {} is {:?}: {}",
                    entry.path,
                    outcome,
                    reasons.join("; ")
                );
            }
        }

        if let Err(e) = lock_catalog(db).save_entry(&entry) {
            error!("Failed to save {}: {}", entry.path, CatalogError::from(e));
            summary.unsaved += 1;
        }
        summary.push(report);
    }

    summary.duration_ms = timer.elapsed_ms();
    let message = format!(
        "Last import: {} secs ({})",
        timer.seconds(),
        summary.processed()
    );
    info!(
        "{} - {} complete, {} partial, {} failed, {} unsaved",
        message, summary.complete, summary.partial, summary.failed, summary.unsaved
    );
    status.finish(Stage::Import, message);
    Ok(summary)
}

fn failed(err: CatalogError) -> StepOutcome {
    StepOutcome::Failed(err.reason())
}

fn hash_step(entry: &mut CatalogEntry, config: &LibraryConfig, report: &mut EntryReport) {
    let outcome = match content_hash(&entry.file_path(), config.hash_buffer_size) {
        Ok(hash) => {
            entry.hash = hash;
            StepOutcome::Done
        }
        Err(e) => failed(e),
    };
    report.record(ImportStep::Hash, outcome);
}

/// Hash, decode, fingerprint and read EXIF for one image
pub fn import_image(entry: &mut CatalogEntry, config: &LibraryConfig) -> EntryReport {
    let mut report = EntryReport::new(entry);
    hash_step(entry, config, &mut report);

    let path = entry.file_path();
    let mut details = entry.image().cloned().unwrap_or_default();

    match decode_image(&path) {
        Ok(image) => {
            let (width, height) = image.dimensions();
            details.width = width;
            details.height = height;
            report.record(ImportStep::Dimensions, StepOutcome::Done);

            details.phash = average_hash(&image);
            report.record(ImportStep::Fingerprint, StepOutcome::Done);
        }
        Err(e) => {
            let reason = e.reason();
            report.record(ImportStep::Dimensions, StepOutcome::Failed(reason.clone()));
            report.record(ImportStep::Fingerprint, StepOutcome::Failed(reason));
        }
    }

    match ExifData::from_path(&path) {
        Ok(Some(exif)) => {
            let capture = match exif.taken_date() {
                Ok(Some(taken)) => {
                    details.taken_date = taken;
                    StepOutcome::Done
                }
                Ok(None) => StepOutcome::Absent,
                Err(e) => failed(e),
            };
            report.record(ImportStep::CaptureTime, capture);

            let location = match exif.location() {
                Ok(Some(point)) => {
                    details.geo = Some(point);
                    StepOutcome::Done
                }
                Ok(None) => StepOutcome::Absent,
                Err(e) => failed(e),
            };
            report.record(ImportStep::Location, location);
        }
        Ok(None) => {
            report.record(ImportStep::CaptureTime, StepOutcome::Absent);
            report.record(ImportStep::Location, StepOutcome::Absent);
        }
        Err(e) => {
            let reason = e.reason();
            report.record(ImportStep::CaptureTime, StepOutcome::Failed(reason.clone()));
            report.record(ImportStep::Location, StepOutcome::Failed(reason));
        }
    }

    entry.details = MediaDetails::Image(details);
    report
}

/// Hash and probe one video, correcting dimensions for display rotation
pub fn import_video(
    entry: &mut CatalogEntry,
    config: &LibraryConfig,
    prober: &dyn VideoProber,
) -> EntryReport {
    let mut report = EntryReport::new(entry);
    hash_step(entry, config, &mut report);

    let mut details: VideoDetails = entry.video().cloned().unwrap_or_default();

    match prober.probe(&entry.file_path()) {
        Ok(probe) => {
            details.duration = probe.duration.unwrap_or_default();
            details.codec = probe.codec.unwrap_or_default();
            details.width = probe.width.unwrap_or_default();
            details.height = probe.height.unwrap_or_default();
            report.record(ImportStep::Probe, StepOutcome::Done);

            let capture = match probe.creation_time {
                Some(raw) => match parse_iso_datetime(&raw) {
                    Some(taken) => {
                        details.taken_date = taken;
                        StepOutcome::Done
                    }
                    None => StepOutcome::Failed(format!("unrecognised timestamp {:?}", raw)),
                },
                None => StepOutcome::Absent,
            };
            report.record(ImportStep::CaptureTime, capture);

            let rotation = match probe.rotation {
                Some(degrees) => {
                    let (width, height) = true_resolution(details.width, details.height, degrees);
                    details.width = width;
                    details.height = height;
                    StepOutcome::Done
                }
                None => StepOutcome::Absent,
            };
            report.record(ImportStep::Rotation, rotation);
        }
        Err(e) => report.record(ImportStep::Probe, failed(e)),
    }

    entry.details = MediaDetails::Video(details);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use crate::probe::ProbeReport;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::path::{Path, PathBuf};

    struct FixedProbe(ProbeReport);

    impl VideoProber for FixedProbe {
        fn probe(&self, _path: &Path) -> Result<ProbeReport> {
            Ok(self.0.clone())
        }
    }

    struct BrokenProbe;

    impl VideoProber for BrokenProbe {
        fn probe(&self, path: &Path) -> Result<ProbeReport> {
            Err(CatalogError::external_tool(path.to_path_buf(), "moov atom not found"))
        }
    }

    fn scanned(path: &Path, media_type: MediaType) -> CatalogEntry {
        CatalogEntry::scanned(
            path.to_string_lossy(),
            0,
            DateTime::<Utc>::UNIX_EPOCH,
            MediaDetails::empty_for(media_type).unwrap(),
        )
    }

    fn config() -> LibraryConfig {
        LibraryConfig::new(PathBuf::from("/media"))
    }

    #[test]
    fn test_import_plain_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        image::RgbImage::from_pixel(40, 30, image::Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let mut entry = scanned(&path, MediaType::Image);
        let report = import_image(&mut entry, &config());

        let details = entry.image().unwrap();
        assert_eq!((details.width, details.height), (40, 30));
        assert_eq!(details.phash.len(), 16);
        assert_eq!(details.taken_date, crate::models::unknown_taken_date());
        assert!(details.geo.is_none());
        assert_eq!(entry.hash.len(), 64);
        assert_eq!(report.step(ImportStep::CaptureTime), Some(&StepOutcome::Absent));
        assert_eq!(report.outcome(), EntryOutcome::Complete);
    }

    #[test]
    fn test_import_gif_and_bmp_without_exif() {
        let dir = tempfile::tempdir().unwrap();
        let gif = dir.path().join("a.gif");
        image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 255, 255]))
            .save(&gif)
            .unwrap();
        let bmp = dir.path().join("b.bmp");
        image::RgbImage::from_pixel(8, 8, image::Rgb([0, 255, 0]))
            .save(&bmp)
            .unwrap();

        for path in [gif, bmp] {
            let mut entry = scanned(&path, MediaType::Image);
            let report = import_image(&mut entry, &config());
            assert_eq!(report.outcome(), EntryOutcome::Complete, "{}", entry.path);
            assert_eq!(report.step(ImportStep::CaptureTime), Some(&StepOutcome::Absent));
            assert_eq!(report.step(ImportStep::Location), Some(&StepOutcome::Absent));
            assert_eq!(entry.image().unwrap().width, 8);
        }
    }

    #[test]
    fn test_import_jpeg_with_exif() {
        use crate::metadata::exif_fixtures;
        use exif::Tag;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagged.jpg");
        exif_fixtures::write_jpeg(
            &path,
            &[
                exif_fixtures::ascii(Tag::DateTime, "2021:07:04 18:30:05"),
                exif_fixtures::dms(Tag::GPSLatitude, [40, 26, 46]),
                exif_fixtures::ascii(Tag::GPSLatitudeRef, "S"),
                exif_fixtures::dms(Tag::GPSLongitude, [73, 58, 48]),
                exif_fixtures::ascii(Tag::GPSLongitudeRef, "W"),
            ],
        );

        let mut entry = scanned(&path, MediaType::Image);
        let report = import_image(&mut entry, &config());

        let details = entry.image().unwrap();
        assert_eq!((details.width, details.height), (16, 12));
        assert_eq!(
            details.taken_date,
            NaiveDate::from_ymd_opt(2021, 7, 4)
                .unwrap()
                .and_hms_opt(18, 30, 5)
                .unwrap()
        );
        assert_eq!(
            details.geo,
            Some(GeoPoint {
                latitude: -40.44611,
                longitude: -73.98,
            })
        );
        assert_eq!(report.step(ImportStep::Location), Some(&StepOutcome::Done));
        assert_eq!(report.outcome(), EntryOutcome::Complete);
    }

    #[test]
    fn test_import_jpeg_with_malformed_timestamp() {
        use crate::metadata::exif_fixtures;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.jpg");
        exif_fixtures::write_jpeg(
            &path,
            &[exif_fixtures::ascii(exif::Tag::DateTime, "0000:00:00 00:00:00")],
        );

        let mut entry = scanned(&path, MediaType::Image);
        let report = import_image(&mut entry, &config());

        assert!(matches!(
            report.step(ImportStep::CaptureTime),
            Some(StepOutcome::Failed(_))
        ));
        assert_eq!(report.step(ImportStep::Location), Some(&StepOutcome::Absent));
        assert_eq!(
            entry.image().unwrap().taken_date,
            crate::models::unknown_taken_date()
        );
        assert_eq!(report.outcome(), EntryOutcome::Partial);
    }

    #[test]
    fn test_import_heic_is_partial_without_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMG_0001.heic");
        std::fs::write(&path, b"\0\0\0\x18ftypheic\0\0\0\0mif1heic").unwrap();

        assert_eq!(crate::classify::classify(&path), MediaType::Image);
        let mut entry = scanned(&path, MediaType::Image);
        let report = import_image(&mut entry, &config());

        assert_eq!(report.step(ImportStep::Hash), Some(&StepOutcome::Done));
        assert!(matches!(
            report.step(ImportStep::Dimensions),
            Some(StepOutcome::Failed(_))
        ));
        assert_eq!(report.outcome(), EntryOutcome::Partial);
    }

    #[test]
    fn test_import_undecodable_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let mut entry = scanned(&path, MediaType::Image);
        let report = import_image(&mut entry, &config());

        assert_eq!(report.step(ImportStep::Hash), Some(&StepOutcome::Done));
        assert!(matches!(
            report.step(ImportStep::Dimensions),
            Some(StepOutcome::Failed(_))
        ));
        assert!(matches!(
            report.step(ImportStep::Fingerprint),
            Some(StepOutcome::Failed(_))
        ));
        assert!(entry.image().unwrap().phash.is_empty());
        assert_eq!(report.outcome(), EntryOutcome::Partial);
    }

    #[test]
    fn test_import_missing_image_fails_every_step() {
        let mut entry = scanned(Path::new("/nonexistent/gone.jpg"), MediaType::Image);
        let report = import_image(&mut entry, &config());
        assert_eq!(report.outcome(), EntryOutcome::Failed);
    }

    #[test]
    fn test_import_rotated_video() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"mp4 bytes").unwrap();

        let prober = FixedProbe(ProbeReport {
            duration: Some(12.5),
            codec: Some("h264".into()),
            width: Some(1920),
            height: Some(1080),
            creation_time: Some("2023-06-01T10:20:30.000000Z".into()),
            rotation: Some(90),
        });

        let mut entry = scanned(&path, MediaType::Video);
        let report = import_video(&mut entry, &config(), &prober);

        let details = entry.video().unwrap();
        assert_eq!((details.width, details.height), (1080, 1920));
        assert_eq!(details.codec, "h264");
        assert_eq!(details.duration, 12.5);
        assert_eq!(
            details.taken_date,
            NaiveDate::from_ymd_opt(2023, 6, 1)
                .unwrap()
                .and_hms_opt(10, 20, 30)
                .unwrap()
        );
        assert_eq!(report.outcome(), EntryOutcome::Complete);
    }

    #[test]
    fn test_import_video_probe_failure_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        std::fs::write(&path, b"mov bytes").unwrap();

        let mut entry = scanned(&path, MediaType::Video);
        let report = import_video(&mut entry, &config(), &BrokenProbe);

        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.outcome(), EntryOutcome::Partial);
        assert_eq!(entry.video().unwrap().width, 0);
    }

    #[test]
    fn test_import_pending_advances_status() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("a.png");
        image::RgbImage::new(8, 8).save(&image_path).unwrap();
        let video_path = dir.path().join("b.mp4");
        std::fs::write(&video_path, b"mp4").unwrap();

        let db = Mutex::new(CatalogDatabase::open_memory().unwrap());
        {
            let mut db = db.lock().unwrap();
            db.insert_entry(&scanned(&image_path, MediaType::Image)).unwrap();
            db.insert_entry(&scanned(&video_path, MediaType::Video)).unwrap();
        }

        let status = StatusTracker::new();
        let prober = FixedProbe(ProbeReport::default());
        let summary = import_pending(&config(), &db, &prober, &status).unwrap();

        assert_eq!((summary.images, summary.videos), (1, 1));
        assert_eq!(summary.unsaved, 0);
        assert!(status.current().starts_with("Last import: "));
        assert!(status.current().ends_with("(2)"));

        {
            let catalog = db.lock().unwrap();
            assert!(catalog
                .entries(MediaType::Image, Some(FileStatus::Scanned))
                .unwrap()
                .is_empty());
            assert_eq!(
                catalog
                    .entries(MediaType::Video, Some(FileStatus::Imported))
                    .unwrap()
                    .len(),
                1
            );
        }

        let again = import_pending(&config(), &db, &prober, &status).unwrap();
        assert_eq!(again.processed(), 0);
        assert!(status.current().ends_with("(0)"));
    }
}
