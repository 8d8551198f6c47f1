//! Catalog store backed by SQLite
//!
//! One `files` row per catalog entry plus exactly one row in the extension
//! table matching its media type, sharing the entry id.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    CatalogEntry, FileStatus, GeoPoint, ImageDetails, MediaDetails, MediaType, TextDetails,
    VideoDetails,
};

const BASE_COLUMNS: &str =
    "f.id, f.path, f.file_size, f.hash, f.status, f.created_date, f.added_date";

/// Database manager for the catalog
pub struct CatalogDatabase {
    conn: Connection,
}

impl CatalogDatabase {
    /// Open or create database
    pub fn open(path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                hash TEXT NOT NULL DEFAULT '',
                media_type TEXT NOT NULL,
                status TEXT NOT NULL,
                created_date TEXT NOT NULL,
                added_date TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);
            CREATE INDEX IF NOT EXISTS idx_files_status ON files(media_type, status);

            CREATE TABLE IF NOT EXISTS image_files (
                id TEXT PRIMARY KEY REFERENCES files(id),
                width INTEGER NOT NULL DEFAULT 0,
                height INTEGER NOT NULL DEFAULT 0,
                phash TEXT NOT NULL DEFAULT '',
                taken_date TEXT NOT NULL,
                latitude REAL,
                longitude REAL
            );

            CREATE TABLE IF NOT EXISTS video_files (
                id TEXT PRIMARY KEY REFERENCES files(id),
                duration REAL NOT NULL DEFAULT 0,
                codec TEXT NOT NULL DEFAULT '',
                width INTEGER NOT NULL DEFAULT 0,
                height INTEGER NOT NULL DEFAULT 0,
                taken_date TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS text_files (
                id TEXT PRIMARY KEY REFERENCES files(id),
                character_count INTEGER NOT NULL DEFAULT 0,
                language TEXT NOT NULL DEFAULT ''
            );
            ",
        )?;
        Ok(())
    }

    /// Whether any entry is registered for this exact path
    pub fn contains_path(&self, path: &str) -> SqliteResult<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE path = ?1)",
            [path],
            |row| row.get(0),
        )
    }

    /// Insert an entry and its extension in one transaction
    pub fn insert_entry(&mut self, entry: &CatalogEntry) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO files (id, path, file_size, hash, media_type, status, created_date, added_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id.to_string(),
                entry.path,
                entry.size as i64,
                entry.hash,
                entry.media_type().as_str(),
                entry.status.as_str(),
                entry.created_date,
                entry.added_date,
            ],
        )?;
        Self::write_details(&tx, &entry.id, &entry.details, true)?;
        tx.commit()
    }

    /// Persist an entry's mutable fields (hash, status, extension) in place
    pub fn save_entry(&mut self, entry: &CatalogEntry) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE files SET hash = ?2, status = ?3, file_size = ?4 WHERE id = ?1",
            params![
                entry.id.to_string(),
                entry.hash,
                entry.status.as_str(),
                entry.size as i64
            ],
        )?;
        if updated == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Self::write_details(&tx, &entry.id, &entry.details, false)?;
        tx.commit()
    }

    fn write_details(
        tx: &Transaction<'_>,
        id: &Uuid,
        details: &MediaDetails,
        insert: bool,
    ) -> SqliteResult<()> {
        let id = id.to_string();
        let sql = match (details, insert) {
            (MediaDetails::Image(_), true) => {
                "INSERT INTO image_files (id, width, height, phash, taken_date, latitude, longitude)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            }
            (MediaDetails::Image(_), false) => {
                "UPDATE image_files SET width = ?2, height = ?3, phash = ?4, taken_date = ?5,
                 latitude = ?6, longitude = ?7 WHERE id = ?1"
            }
            (MediaDetails::Video(_), true) => {
                "INSERT INTO video_files (id, duration, codec, width, height, taken_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            }
            (MediaDetails::Video(_), false) => {
                "UPDATE video_files SET duration = ?2, codec = ?3, width = ?4, height = ?5,
                 taken_date = ?6 WHERE id = ?1"
            }
            (MediaDetails::Text(_), true) => {
                "INSERT INTO text_files (id, character_count, language) VALUES (?1, ?2, ?3)"
            }
            (MediaDetails::Text(_), false) => {
                "UPDATE text_files SET character_count = ?2, language = ?3 WHERE id = ?1"
            }
        };

        let written = match details {
            MediaDetails::Image(image) => tx.execute(
                sql,
                params![
                    id,
                    image.width,
                    image.height,
                    image.phash,
                    image.taken_date,
                    image.geo.map(|g| g.latitude),
                    image.geo.map(|g| g.longitude),
                ],
            )?,
            MediaDetails::Video(video) => tx.execute(
                sql,
                params![
                    id,
                    video.duration,
                    video.codec,
                    video.width,
                    video.height,
                    video.taken_date,
                ],
            )?,
            MediaDetails::Text(text) => tx.execute(
                sql,
                params![id, text.character_count as i64, text.language],
            )?,
        };

        if written == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    /// Load one entry by id
    pub fn get_entry(&self, id: &Uuid) -> SqliteResult<Option<CatalogEntry>> {
        let media_type: Option<String> = self
            .conn
            .query_row(
                "SELECT media_type FROM files WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(media_type) = media_type else {
            return Ok(None);
        };
        let media_type = MediaType::from_mime_top_level(&media_type);
        Ok(self
            .query_entries(media_type, Some(("f.id", id.to_string().as_str())))?
            .into_iter()
            .next())
    }

    /// Load the entry registered for a path, if any
    pub fn find_by_path(&self, path: &str) -> SqliteResult<Option<CatalogEntry>> {
        for media_type in [MediaType::Image, MediaType::Video, MediaType::Text] {
            if let Some(entry) = self
                .query_entries(media_type, Some(("f.path", path)))?
                .into_iter()
                .next()
            {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// All entries of a type, optionally filtered by status, in insertion order
    pub fn entries(
        &self,
        media_type: MediaType,
        status: Option<FileStatus>,
    ) -> SqliteResult<Vec<CatalogEntry>> {
        self.query_entries(media_type, status.map(|s| ("f.status", s.as_str())))
    }

    fn query_entries(
        &self,
        media_type: MediaType,
        filter: Option<(&str, &str)>,
    ) -> SqliteResult<Vec<CatalogEntry>> {
        let (join, columns): (&str, &str) = match media_type {
            MediaType::Image => (
                "image_files",
                "x.width, x.height, x.phash, x.taken_date, x.latitude, x.longitude",
            ),
            MediaType::Video => (
                "video_files",
                "x.duration, x.codec, x.width, x.height, x.taken_date",
            ),
            MediaType::Text => ("text_files", "x.character_count, x.language"),
            MediaType::Audio | MediaType::Unknown => return Ok(Vec::new()),
        };

        let condition = filter
            .map(|(column, _)| format!("WHERE {column} = ?1"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {BASE_COLUMNS}, {columns} FROM files f JOIN {join} x ON x.id = f.id
             {condition} ORDER BY f.rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let args: Vec<&str> = filter.map(|(_, value)| value).into_iter().collect();
        let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
            entry_from_row(row, media_type)
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Every cataloged path, in insertion order
    pub fn all_paths(&self) -> SqliteResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM files ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    /// Get entry count
    pub fn entry_count(&self) -> SqliteResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Get status counts
    pub fn get_status_counts(&self) -> SqliteResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM files GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            counts.insert(status, count);
        }
        Ok(counts)
    }
}

/// Lock a shared catalog
///
/// A panic while holding the lock leaves no open transaction behind (it is
/// rolled back on drop), so a poisoned lock is recovered rather than
/// propagated.
pub fn lock_catalog(db: &Mutex<CatalogDatabase>) -> MutexGuard<'_, CatalogDatabase> {
    db.lock().unwrap_or_else(|poisoned| {
        log::warn!("Catalog lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Map a row of `BASE_COLUMNS` followed by the extension columns
fn entry_from_row(row: &Row<'_>, media_type: MediaType) -> SqliteResult<CatalogEntry> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?;
    let status: String = row.get(4)?;
    let status = status
        .parse::<FileStatus>()
        .map_err(|e| conversion_error(4, e))?;
    let created_date: DateTime<Utc> = row.get(5)?;
    let added_date: DateTime<Utc> = row.get(6)?;

    let details = match media_type {
        MediaType::Image => {
            let latitude: Option<f64> = row.get(11)?;
            let longitude: Option<f64> = row.get(12)?;
            MediaDetails::Image(ImageDetails {
                width: row.get(7)?,
                height: row.get(8)?,
                phash: row.get(9)?,
                taken_date: row.get::<_, NaiveDateTime>(10)?,
                geo: latitude
                    .zip(longitude)
                    .map(|(latitude, longitude)| GeoPoint {
                        latitude,
                        longitude,
                    }),
            })
        }
        MediaType::Video => MediaDetails::Video(VideoDetails {
            duration: row.get(7)?,
            codec: row.get(8)?,
            width: row.get(9)?,
            height: row.get(10)?,
            taken_date: row.get::<_, NaiveDateTime>(11)?,
        }),
        _ => MediaDetails::Text(TextDetails {
            character_count: row.get::<_, i64>(7)? as u64,
            language: row.get(8)?,
        }),
    };

    Ok(CatalogEntry {
        id,
        path: row.get(1)?,
        size: row.get::<_, i64>(2)? as u64,
        hash: row.get(3)?,
        status,
        created_date,
        added_date,
        details,
    })
}
