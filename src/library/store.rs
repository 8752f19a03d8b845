//! Library track storage.
//!
//! SQLite-backed persistence for downloaded tracks. The store is the single
//! source of truth for the library; the duplicate index is a derived view
//! over it and keys its staleness off `count()`, so that call must stay cheap.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::models::{LibraryTrackRecord, NewLibraryTrack};

/// Storage operations for library tracks.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait LibraryStore: Send + Sync {
    /// Insert a new track record, returning it with its assigned id.
    fn insert(&self, track: NewLibraryTrack) -> Result<LibraryTrackRecord>;

    /// Delete a track record by id. Returns true if a row was removed.
    fn delete(&self, id: i64) -> Result<bool>;

    /// Number of tracks in the library. Hot path of every duplicate check.
    fn count(&self) -> Result<usize>;

    /// Every track in the library, unordered.
    fn list_all(&self) -> Result<Vec<LibraryTrackRecord>>;

    /// Most recently downloaded tracks, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<LibraryTrackRecord>>;

    /// Look up a single record by id.
    fn get(&self, id: i64) -> Result<Option<LibraryTrackRecord>>;
}

const TRACKS_TABLE: &str = "library_tracks";
const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &[&str] = &[
    "CREATE TABLE library_tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        catalog_id TEXT,
        title TEXT NOT NULL,
        artist TEXT,
        filename TEXT NOT NULL,
        format TEXT NOT NULL,
        quality TEXT NOT NULL,
        duration_seconds INTEGER,
        file_size INTEGER,
        downloaded_at INTEGER NOT NULL
    );",
    "CREATE INDEX idx_library_tracks_catalog_id ON library_tracks (catalog_id);",
    "CREATE INDEX idx_library_tracks_downloaded_at ON library_tracks (downloaded_at);",
];

/// SQLite-backed library store.
pub struct SqliteLibraryStore {
    conn: Mutex<Connection>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            Self::create_schema(&conn)?;
            tracing::info!("Created new library database at {:?}", db_path.as_ref());
            conn
        };

        let version: i32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .context("Failed to read library database version")?;
        if version != SCHEMA_VERSION {
            bail!("Unknown library database version {}", version);
        }
        Self::validate_schema(&conn)?;

        Ok(SqliteLibraryStore {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(SqliteLibraryStore {
            conn: Mutex::new(conn),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        for statement in SCHEMA {
            conn.execute(statement, [])?;
        }
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        Ok(())
    }

    fn validate_schema(conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", TRACKS_TABLE))?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))?
            .collect::<Result<_, _>>()?;

        let expected = [
            "id",
            "catalog_id",
            "title",
            "artist",
            "filename",
            "format",
            "quality",
            "duration_seconds",
            "file_size",
            "downloaded_at",
        ];
        if columns != expected {
            bail!(
                "Schema validation failed for {} table, found columns {:?}",
                TRACKS_TABLE,
                columns
            );
        }
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LibraryTrackRecord> {
        Ok(LibraryTrackRecord {
            id: row.get(0)?,
            catalog_id: row.get(1)?,
            title: row.get(2)?,
            artist: row.get(3)?,
            filename: row.get(4)?,
            format: row.get(5)?,
            quality: row.get(6)?,
            duration_seconds: row.get::<_, Option<i64>>(7)?.map(|d| d.max(0) as u32),
            file_size: row.get::<_, Option<i64>>(8)?.map(|s| s.max(0) as u64),
            downloaded_at: row.get(9)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, catalog_id, title, artist, filename, format, quality, duration_seconds, file_size, downloaded_at";

impl LibraryStore for SqliteLibraryStore {
    fn insert(&self, track: NewLibraryTrack) -> Result<LibraryTrackRecord> {
        let downloaded_at = Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (catalog_id, title, artist, filename, format, quality, duration_seconds, file_size, downloaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                TRACKS_TABLE
            ),
            params![
                track.catalog_id,
                track.title,
                track.artist,
                track.filename,
                track.format,
                track.quality,
                track.duration_seconds.map(|d| d as i64),
                track.file_size.map(|s| s as i64),
                downloaded_at,
            ],
        )
        .with_context(|| format!("Failed to insert library track '{}'", track.title))?;

        let id = conn.last_insert_rowid();
        Ok(LibraryTrackRecord {
            id,
            catalog_id: track.catalog_id,
            title: track.title,
            artist: track.artist,
            filename: track.filename,
            format: track.format,
            quality: track.quality,
            duration_seconds: track.duration_seconds,
            file_size: track.file_size,
            downloaded_at,
        })
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", TRACKS_TABLE),
                params![id],
            )
            .with_context(|| format!("Failed to delete library track {}", id))?;
        Ok(affected > 0)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", TRACKS_TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_all(&self) -> Result<Vec<LibraryTrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {}",
            SELECT_COLUMNS, TRACKS_TABLE
        ))?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn recent(&self, limit: usize) -> Result<Vec<LibraryTrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY downloaded_at DESC, id DESC LIMIT ?1",
            SELECT_COLUMNS, TRACKS_TABLE
        ))?;
        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn get(&self, id: i64) -> Result<Option<LibraryTrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE id = ?1", SELECT_COLUMNS, TRACKS_TABLE),
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}
