//! Persistence for import jobs and their tracks.
//!
//! Jobs and per-track progress are persisted so a process restart mid-import
//! loses nothing: the orchestrator re-reads the rows and continues from the
//! first non-terminal track.

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::models::{
    ImportJob, ImportJobStatus, ImportTrack, ImportTrackStatus, NewImportTrack,
};

/// Storage operations for import jobs and tracks.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait ImportStore: Send + Sync {
    fn create_job(&self, job: &ImportJob) -> Result<()>;

    fn get_job(&self, id: &str) -> Result<Option<ImportJob>>;

    /// Update every mutable field of the job row.
    fn update_job(&self, job: &ImportJob) -> Result<()>;

    /// Most recent jobs, newest first.
    fn list_recent_jobs(&self, limit: usize) -> Result<Vec<ImportJob>>;

    /// A non-terminal job already importing this exact playlist URL, if any.
    fn find_active_by_url(&self, playlist_url: &str) -> Result<Option<ImportJob>>;

    /// All jobs in the given status.
    fn jobs_with_status(&self, status: ImportJobStatus) -> Result<Vec<ImportJob>>;

    /// Bulk-create the job's tracks, in playlist order.
    fn insert_tracks(&self, job_id: &str, tracks: &[NewImportTrack]) -> Result<()>;

    /// The job's tracks in playlist order.
    fn tracks_for_job(&self, job_id: &str) -> Result<Vec<ImportTrack>>;

    fn update_track(&self, track: &ImportTrack) -> Result<()>;
}

const JOBS_TABLE: &str = "import_jobs";
const TRACKS_TABLE: &str = "import_tracks";
const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &[&str] = &[
    "CREATE TABLE import_jobs (
        id TEXT PRIMARY KEY,
        playlist_url TEXT NOT NULL,
        label TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        total_tracks INTEGER NOT NULL DEFAULT 0,
        downloaded_count INTEGER NOT NULL DEFAULT 0,
        skipped_count INTEGER NOT NULL DEFAULT 0,
        failed_count INTEGER NOT NULL DEFAULT 0,
        current_track_label TEXT NOT NULL DEFAULT '',
        error_message TEXT,
        created_at INTEGER NOT NULL,
        completed_at INTEGER
    );",
    "CREATE TABLE import_tracks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL REFERENCES import_jobs (id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        artist TEXT NOT NULL DEFAULT '',
        album TEXT NOT NULL DEFAULT '',
        external_id TEXT,
        duration_ms INTEGER,
        status TEXT NOT NULL,
        matched_catalog_id TEXT,
        score REAL,
        reason TEXT
    );",
    "CREATE INDEX idx_import_tracks_job ON import_tracks (job_id);",
    "CREATE INDEX idx_import_jobs_status ON import_jobs (status);",
    "CREATE INDEX idx_import_jobs_created ON import_jobs (created_at);",
];

/// SQLite-backed import store.
pub struct SqliteImportStore {
    conn: Mutex<Connection>,
}

impl SqliteImportStore {
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
            tracing::info!("Created new import database at {:?}", db_path.as_ref());
            conn
        };

        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let version: i32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .context("Failed to read import database version")?;
        if version != SCHEMA_VERSION {
            bail!("Unknown import database version {}", version);
        }

        Ok(SqliteImportStore {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        Self::create_schema(&conn)?;
        Ok(SqliteImportStore {
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

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ImportJob> {
        let status: String = row.get(3)?;
        Ok(ImportJob {
            id: row.get(0)?,
            playlist_url: row.get(1)?,
            label: row.get(2)?,
            status: ImportJobStatus::from_str(&status).unwrap_or(ImportJobStatus::Failed),
            total_tracks: row.get::<_, i64>(4)?.max(0) as u32,
            downloaded_count: row.get::<_, i64>(5)?.max(0) as u32,
            skipped_count: row.get::<_, i64>(6)?.max(0) as u32,
            failed_count: row.get::<_, i64>(7)?.max(0) as u32,
            current_track_label: row.get(8)?,
            error_message: row.get(9)?,
            created_at: row.get(10)?,
            completed_at: row.get(11)?,
        })
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<ImportTrack> {
        let status: String = row.get(7)?;
        Ok(ImportTrack {
            id: row.get(0)?,
            job_id: row.get(1)?,
            title: row.get(2)?,
            artist: row.get(3)?,
            album: row.get(4)?,
            external_id: row.get(5)?,
            duration_ms: row.get::<_, Option<i64>>(6)?.map(|d| d.max(0) as u64),
            status: ImportTrackStatus::from_str(&status).unwrap_or(ImportTrackStatus::Failed),
            matched_catalog_id: row.get(8)?,
            score: row.get(9)?,
            reason: row.get(10)?,
        })
    }
}

const JOB_COLUMNS: &str = "id, playlist_url, label, status, total_tracks, downloaded_count, skipped_count, failed_count, current_track_label, error_message, created_at, completed_at";
const TRACK_COLUMNS: &str = "id, job_id, title, artist, album, external_id, duration_ms, status, matched_catalog_id, score, reason";

impl ImportStore for SqliteImportStore {
    fn create_job(&self, job: &ImportJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                JOBS_TABLE, JOB_COLUMNS
            ),
            params![
                job.id,
                job.playlist_url,
                job.label,
                job.status.as_str(),
                job.total_tracks as i64,
                job.downloaded_count as i64,
                job.skipped_count as i64,
                job.failed_count as i64,
                job.current_track_label,
                job.error_message,
                job.created_at,
                job.completed_at,
            ],
        )
        .with_context(|| format!("Failed to create import job {}", job.id))?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<ImportJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE id = ?1", JOB_COLUMNS, JOBS_TABLE),
                params![id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn update_job(&self, job: &ImportJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            &format!(
                "UPDATE {} SET label = ?2, status = ?3, total_tracks = ?4,
                 downloaded_count = ?5, skipped_count = ?6, failed_count = ?7,
                 current_track_label = ?8, error_message = ?9, completed_at = ?10
                 WHERE id = ?1",
                JOBS_TABLE
            ),
            params![
                job.id,
                job.label,
                job.status.as_str(),
                job.total_tracks as i64,
                job.downloaded_count as i64,
                job.skipped_count as i64,
                job.failed_count as i64,
                job.current_track_label,
                job.error_message,
                job.completed_at,
            ],
        )?;
        if affected == 0 {
            return Err(anyhow!("Import job {} not found", job.id));
        }
        Ok(())
    }

    fn list_recent_jobs(&self, limit: usize) -> Result<Vec<ImportJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY created_at DESC, id DESC LIMIT ?1",
            JOB_COLUMNS, JOBS_TABLE
        ))?;
        let jobs = stmt
            .query_map(params![limit as i64], Self::row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn find_active_by_url(&self, playlist_url: &str) -> Result<Option<ImportJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE playlist_url = ?1 AND status IN ('pending', 'processing') LIMIT 1",
                    JOB_COLUMNS, JOBS_TABLE
                ),
                params![playlist_url],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn jobs_with_status(&self, status: ImportJobStatus) -> Result<Vec<ImportJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE status = ?1 ORDER BY created_at",
            JOB_COLUMNS, JOBS_TABLE
        ))?;
        let jobs = stmt
            .query_map(params![status.as_str()], Self::row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn insert_tracks(&self, job_id: &str, tracks: &[NewImportTrack]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (job_id, title, artist, album, external_id, duration_ms, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                TRACKS_TABLE
            ))?;
            for track in tracks {
                stmt.execute(params![
                    job_id,
                    track.title,
                    track.artist,
                    track.album,
                    track.external_id,
                    track.duration_ms.map(|d| d as i64),
                    ImportTrackStatus::Pending.as_str(),
                ])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to insert tracks for import job {}", job_id))?;
        Ok(())
    }

    fn tracks_for_job(&self, job_id: &str) -> Result<Vec<ImportTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE job_id = ?1 ORDER BY id",
            TRACK_COLUMNS, TRACKS_TABLE
        ))?;
        let tracks = stmt
            .query_map(params![job_id], Self::row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn update_track(&self, track: &ImportTrack) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            &format!(
                "UPDATE {} SET status = ?2, matched_catalog_id = ?3, score = ?4, reason = ?5
                 WHERE id = ?1",
                TRACKS_TABLE
            ),
            params![
                track.id,
                track.status.as_str(),
                track.matched_catalog_id,
                track.score,
                track.reason,
            ],
        )?;
        if affected == 0 {
            return Err(anyhow!("Import track {} not found", track.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tracks() -> Vec<NewImportTrack> {
        vec![
            NewImportTrack {
                title: "One".to_string(),
                artist: "Artist A".to_string(),
                album: String::new(),
                external_id: Some("sp1".to_string()),
                duration_ms: Some(200_000),
            },
            NewImportTrack {
                title: "Two".to_string(),
                artist: "Artist B".to_string(),
                album: String::new(),
                external_id: None,
                duration_ms: None,
            },
        ]
    }

    #[test]
    fn test_job_roundtrip() {
        let store = SqliteImportStore::in_memory().unwrap();
        let mut job = ImportJob::new("https://open.spotify.com/playlist/abc".to_string());
        store.create_job(&job).unwrap();

        let fetched = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(fetched.status, ImportJobStatus::Pending);
        assert_eq!(fetched.playlist_url, job.playlist_url);

        job.status = ImportJobStatus::Processing;
        job.label = "My Playlist".to_string();
        job.total_tracks = 2;
        store.update_job(&job).unwrap();

        let fetched = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(fetched.status, ImportJobStatus::Processing);
        assert_eq!(fetched.label, "My Playlist");
        assert_eq!(fetched.total_tracks, 2);
    }

    #[test]
    fn test_tracks_roundtrip_in_playlist_order() {
        let store = SqliteImportStore::in_memory().unwrap();
        let job = ImportJob::new("https://open.spotify.com/playlist/abc".to_string());
        store.create_job(&job).unwrap();
        store.insert_tracks(&job.id, &sample_tracks()).unwrap();

        let tracks = store.tracks_for_job(&job.id).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "One");
        assert_eq!(tracks[1].title, "Two");
        assert_eq!(tracks[0].status, ImportTrackStatus::Pending);
        assert_eq!(tracks[0].external_id.as_deref(), Some("sp1"));
        assert_eq!(tracks[0].duration_ms, Some(200_000));
        assert_eq!(tracks[1].duration_ms, None);
    }

    #[test]
    fn test_update_track() {
        let store = SqliteImportStore::in_memory().unwrap();
        let job = ImportJob::new("https://open.spotify.com/playlist/abc".to_string());
        store.create_job(&job).unwrap();
        store.insert_tracks(&job.id, &sample_tracks()).unwrap();

        let mut track = store.tracks_for_job(&job.id).unwrap().remove(0);
        track.status = ImportTrackStatus::Downloaded;
        track.matched_catalog_id = Some("vid123".to_string());
        track.score = Some(92.5);
        track.reason = None;
        store.update_track(&track).unwrap();

        let reloaded = store.tracks_for_job(&job.id).unwrap().remove(0);
        assert_eq!(reloaded.status, ImportTrackStatus::Downloaded);
        assert_eq!(reloaded.matched_catalog_id.as_deref(), Some("vid123"));
        assert_eq!(reloaded.score, Some(92.5));
    }

    #[test]
    fn test_find_active_by_url() {
        let store = SqliteImportStore::in_memory().unwrap();
        let url = "https://open.spotify.com/playlist/abc".to_string();

        let mut job = ImportJob::new(url.clone());
        store.create_job(&job).unwrap();
        assert!(store.find_active_by_url(&url).unwrap().is_some());

        job.status = ImportJobStatus::Completed;
        store.update_job(&job).unwrap();
        assert!(store.find_active_by_url(&url).unwrap().is_none());
    }

    #[test]
    fn test_jobs_with_status_and_recent() {
        let store = SqliteImportStore::in_memory().unwrap();
        let mut first = ImportJob::new("https://open.spotify.com/playlist/one".to_string());
        first.created_at -= 10;
        store.create_job(&first).unwrap();

        let mut second = ImportJob::new("https://open.spotify.com/playlist/two".to_string());
        second.status = ImportJobStatus::Processing;
        store.create_job(&second).unwrap();

        let processing = store
            .jobs_with_status(ImportJobStatus::Processing)
            .unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, second.id);

        let recent = store.list_recent_jobs(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second.id);
    }
}
