//! Data models for the local track library.

use serde::Serialize;

/// Prefix of catalog ids synthesized for files discovered locally, which were
/// never matched to an external catalog entry. These ids must not short-circuit
/// duplicate detection the way real external ids do.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// A track persisted in the library, backed by an audio file on disk.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryTrackRecord {
    /// Row id in the backing store.
    pub id: i64,
    /// External catalog id the audio came from, if known.
    pub catalog_id: Option<String>,
    pub title: String,
    pub artist: Option<String>,
    /// File name relative to the media directory.
    pub filename: String,
    /// Audio container/codec label (e.g. "M4A").
    pub format: String,
    /// Quality label (e.g. "320kbps").
    pub quality: String,
    /// Duration in seconds; `None` or zero means unknown.
    pub duration_seconds: Option<u32>,
    pub file_size: Option<u64>,
    /// Unix timestamp of when the track entered the library.
    pub downloaded_at: i64,
}

impl LibraryTrackRecord {
    /// Whether `catalog_id` is a real external id rather than a locally
    /// synthesized placeholder.
    pub fn has_external_catalog_id(&self) -> bool {
        match &self.catalog_id {
            Some(id) => !id.is_empty() && !id.starts_with(LOCAL_ID_PREFIX),
            None => false,
        }
    }
}

/// Fields for inserting a new library track.
#[derive(Debug, Clone, Default)]
pub struct NewLibraryTrack {
    pub catalog_id: Option<String>,
    pub title: String,
    pub artist: Option<String>,
    pub filename: String,
    pub format: String,
    pub quality: String,
    pub duration_seconds: Option<u32>,
    pub file_size: Option<u64>,
}
