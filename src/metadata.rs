//! Metadata extraction helpers shared by the importer
//!
//! Content hashing, the average-hash fingerprint, EXIF capture time and GPS
//! decoding, and rotation correction of video dimensions.

use chrono::{DateTime, NaiveDateTime};
use exif::{Exif, In, Tag, Value};
use image::imageops::FilterType;
use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{CatalogError, CatalogErrorKind, Result};
use crate::models::GeoPoint;

/// EXIF timestamp layout
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Timestamp tags, most preferred first
pub const TIME_TAGS: [Tag; 3] = [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized];

/// Divisors turning degrees/minutes/seconds into degrees
pub const DMS_DIVISION: [f64; 3] = [1.0, 60.0, 3600.0];

/// Decimal places kept for coordinates
pub const COORDINATE_PRECISION: i32 = 5;

/// kamadak-exif's error text for a file that is none of its known containers
const UNKNOWN_CONTAINER: &str = "Unknown image format";

/// Edge of the grid sampled by the average hash
const AHASH_SIZE: u32 = 8;

/// Streaming SHA-256 of a file's full content, lowercase hex
pub fn content_hash(path: &Path, buffer_size: usize) -> Result<String> {
    let file = File::open(path).map_err(|e| CatalogError::from(e).at(path))?;
    let mut reader = BufReader::with_capacity(buffer_size, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| CatalogError::from(e).at(path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Decode an image, detecting the format from its content
pub fn decode_image(path: &Path) -> Result<DynamicImage> {
    let reader = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| CatalogError::from(e).at(path))?;
    reader.decode().map_err(|e| CatalogError::from(e).at(path))
}

/// Average-hash fingerprint: 8×8 grayscale, one bit per pixel brighter than
/// the mean, row-major, encoded as 16 hex characters
pub fn average_hash(image: &DynamicImage) -> String {
    let small = image
        .grayscale()
        .resize_exact(AHASH_SIZE, AHASH_SIZE, FilterType::Lanczos3)
        .to_luma8();

    let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p.0[0])).collect();
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;

    let bits = pixels
        .iter()
        .fold(0u64, |acc, &value| (acc << 1) | u64::from(value > mean));
    format!("{:016x}", bits)
}

/// On-screen dimensions of a stream displayed with the given rotation
pub fn true_resolution(width: u32, height: u32, rotation: i32) -> (u32, u32) {
    if rotation % 180 == 0 {
        return (width, height);
    }

    let theta = f64::from(rotation).to_radians();
    let (w, h) = (f64::from(width), f64::from(height));
    let true_width = (w * theta.cos()).abs() + (h * theta.sin()).abs();
    let true_height = (w * theta.sin()).abs() + (h * theta.cos()).abs();
    (true_width as u32, true_height as u32)
}

/// Signed decimal degrees from a DMS triple and hemisphere reference
pub fn dms_to_decimal(dms: [f64; 3], reference: &str) -> f64 {
    let degrees: f64 = dms.iter().zip(DMS_DIVISION.iter()).map(|(v, d)| v / d).sum();
    let signed = match reference.trim() {
        "S" | "W" => -degrees,
        _ => degrees,
    };
    round_to(signed, COORDINATE_PRECISION)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` timestamp
pub fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(trimmed, EXIF_DATETIME_FORMAT).ok()
}

/// Parse an ISO-8601 container timestamp, dropping the offset
pub fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Embedded EXIF block of an image file
pub struct ExifData {
    exif: Exif,
}

impl ExifData {
    /// Read EXIF from a file; `Ok(None)` when the file carries none
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        let file = File::open(path).map_err(|e| CatalogError::from(e).at(path))?;
        let mut reader = BufReader::new(file);
        match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => Ok(Some(Self { exif })),
            // GIF, BMP and other containers that cannot carry EXIF
            Err(exif::Error::InvalidFormat(UNKNOWN_CONTAINER)) => Ok(None),
            Err(
                exif::Error::NotFound(_)
                | exif::Error::NotSupported(_)
                | exif::Error::BlankValue(_),
            ) => Ok(None),
            Err(e) => Err(CatalogError::from(e).at(path)),
        }
    }

    fn ascii(&self, tag: Tag) -> Option<String> {
        match &self.exif.get_field(tag, In::PRIMARY)?.value {
            Value::Ascii(values) => values
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    fn rationals(&self, tag: Tag) -> Option<Vec<f64>> {
        match &self.exif.get_field(tag, In::PRIMARY)?.value {
            Value::Rational(values) => Some(values.iter().map(|r| r.to_f64()).collect()),
            _ => None,
        }
    }

    /// Capture time from the first timestamp tag present
    ///
    /// `Ok(None)` when no timestamp tag exists, an error when one exists
    /// but does not match the EXIF layout.
    pub fn taken_date(&self) -> Result<Option<NaiveDateTime>> {
        let Some(raw) = TIME_TAGS.iter().find_map(|tag| self.ascii(*tag)) else {
            return Ok(None);
        };
        parse_exif_datetime(&raw).map(Some).ok_or_else(|| {
            CatalogError::new(
                CatalogErrorKind::MetadataError,
                None,
                format!("unrecognised timestamp {:?}", raw),
            )
        })
    }

    /// GPS position; `Ok(None)` when the image has no GPS tags
    pub fn location(&self) -> Result<Option<GeoPoint>> {
        let latitude = self.rationals(Tag::GPSLatitude);
        let longitude = self.rationals(Tag::GPSLongitude);
        if latitude.is_none() && longitude.is_none() {
            return Ok(None);
        }

        let coordinate = |dms: Option<Vec<f64>>, reference: Tag| -> Result<f64> {
            let dms = dms.unwrap_or_default();
            let triple: [f64; 3] = dms.as_slice().try_into().map_err(|_| {
                CatalogError::new(
                    CatalogErrorKind::MetadataError,
                    None,
                    format!("expected 3 DMS components, found {}", dms.len()),
                )
            })?;
            let reference = self.ascii(reference).unwrap_or_default();
            Ok(dms_to_decimal(triple, &reference))
        };

        Ok(Some(GeoPoint {
            latitude: coordinate(latitude, Tag::GPSLatitudeRef)?,
            longitude: coordinate(longitude, Tag::GPSLongitudeRef)?,
        }))
    }
}
