//! Duplicate detection over the persisted library.
//!
//! Answers "is this track already in the library?" from a derived, rebuildable
//! cache — never authoritative, always reconstructible from the backing store.
//! Staleness is detected by comparing the cached row count against the store's
//! current count, which bounds rebuilds to one per net change instead of one
//! per lookup.
//!
//! Lookups double as lazy garbage collection: a record whose backing file has
//! vanished is deleted instead of being reported as a duplicate.

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::matching::{artist_compare_key, dedup_title_key};

use super::models::LOCAL_ID_PREFIX;
use super::store::LibraryStore;

/// Tolerance, in seconds, when comparing durations of a title+artist match.
pub const DURATION_TOLERANCE_SECS: u32 = 3;

/// A duplicate-check query. Only `title` is required.
#[derive(Debug, Clone, Default)]
pub struct DuplicateQuery<'a> {
    pub title: &'a str,
    pub catalog_id: Option<&'a str>,
    pub artist: Option<&'a str>,
    /// Duration in seconds; `None` or zero means unknown.
    pub duration_seconds: Option<u32>,
}

/// A confirmed duplicate: the library row and its still-existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateHit {
    pub track_id: i64,
    pub filename: String,
}

#[derive(Debug, Clone)]
struct CachedTrack {
    id: i64,
    filename: String,
    duration_seconds: Option<u32>,
    has_artist: bool,
}

struct IndexCache {
    row_count: usize,
    by_catalog_id: HashMap<String, CachedTrack>,
    by_title: HashMap<String, CachedTrack>,
    by_title_artist: HashMap<(String, String), CachedTrack>,
}

/// Queryable, normalized view over the persisted library.
pub struct DuplicateIndex {
    store: Arc<dyn LibraryStore>,
    media_dir: PathBuf,
    cache: Mutex<Option<Arc<IndexCache>>>,
}

impl DuplicateIndex {
    pub fn new(store: Arc<dyn LibraryStore>, media_dir: PathBuf) -> Self {
        Self {
            store,
            media_dir,
            cache: Mutex::new(None),
        }
    }

    /// Drop the cache. Called by any mutation of the backing store; the next
    /// lookup rebuilds from a fresh snapshot.
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap() = None;
    }

    /// Check whether a track matching the query already exists in the library
    /// with its file still on disk.
    ///
    /// Match priority: exact external catalog id, then normalized title +
    /// artist with duration tolerance, then normalized title alone when artist
    /// data is missing, gated by duration equality. Stale records whose file
    /// is gone are deleted and the search continues.
    pub fn lookup(&self, query: &DuplicateQuery) -> Result<Option<DuplicateHit>> {
        loop {
            let cache = self.fresh_cache()?;

            let candidate = match self.find_candidate(&cache, query) {
                Some(c) => c,
                None => return Ok(None),
            };

            if self.media_dir.join(&candidate.filename).exists() {
                return Ok(Some(DuplicateHit {
                    track_id: candidate.id,
                    filename: candidate.filename,
                }));
            }

            // Backing file vanished: prune the orphaned record and retry.
            info!(
                "Pruning library track {} ('{}'): file no longer exists",
                candidate.id, candidate.filename
            );
            let deleted = self.store.delete(candidate.id)?;
            self.invalidate();
            if !deleted {
                // Someone else already removed it; the rebuilt cache on the
                // next call will no longer contain it.
                return Ok(None);
            }
        }
    }

    fn fresh_cache(&self) -> Result<Arc<IndexCache>> {
        let current_count = self.store.count()?;

        {
            let guard = self.cache.lock().unwrap();
            if let Some(cache) = guard.as_ref() {
                if cache.row_count == current_count {
                    return Ok(cache.clone());
                }
            }
        }

        // Snapshot read outside the lock, then an atomic swap.
        let rebuilt = Arc::new(self.build_cache()?);
        debug!("Rebuilt duplicate index over {} tracks", rebuilt.row_count);
        *self.cache.lock().unwrap() = Some(rebuilt.clone());
        Ok(rebuilt)
    }

    fn build_cache(&self) -> Result<IndexCache> {
        let records = self.store.list_all()?;
        let row_count = records.len();

        let mut by_catalog_id = HashMap::new();
        let mut by_title = HashMap::new();
        let mut by_title_artist = HashMap::new();

        for record in records {
            let artist_key = record
                .artist
                .as_deref()
                .map(artist_compare_key)
                .filter(|k| !k.is_empty());
            let cached = CachedTrack {
                id: record.id,
                filename: record.filename.clone(),
                duration_seconds: record.duration_seconds.filter(|d| *d > 0),
                has_artist: artist_key.is_some(),
            };

            if record.has_external_catalog_id() {
                if let Some(catalog_id) = &record.catalog_id {
                    by_catalog_id.insert(catalog_id.clone(), cached.clone());
                }
            }

            let title_key = dedup_title_key(&record.title);
            if title_key.is_empty() {
                continue;
            }
            if let Some(artist_key) = artist_key {
                by_title_artist.insert((title_key.clone(), artist_key), cached.clone());
            }
            by_title.insert(title_key, cached);
        }

        Ok(IndexCache {
            row_count,
            by_catalog_id,
            by_title,
            by_title_artist,
        })
    }

    fn find_candidate(&self, cache: &IndexCache, query: &DuplicateQuery) -> Option<CachedTrack> {
        // 1. Exact external catalog id, strongest signal.
        if let Some(catalog_id) = query.catalog_id {
            if !catalog_id.is_empty() && !catalog_id.starts_with(LOCAL_ID_PREFIX) {
                if let Some(hit) = cache.by_catalog_id.get(catalog_id) {
                    return Some(hit.clone());
                }
            }
        }

        let title_key = dedup_title_key(query.title);
        if title_key.is_empty() {
            return None;
        }
        let query_duration = query.duration_seconds.filter(|d| *d > 0);

        // 2. Title + artist, duration within tolerance.
        let artist_key = query
            .artist
            .map(artist_compare_key)
            .filter(|k| !k.is_empty());
        if let Some(artist_key) = &artist_key {
            if let Some(hit) = cache
                .by_title_artist
                .get(&(title_key.clone(), artist_key.clone()))
            {
                if durations_within_tolerance(query_duration, hit.duration_seconds) {
                    return Some(hit.clone());
                }
            }
        }

        // 3. Title alone, only when artist data is missing on either side.
        if let Some(hit) = cache.by_title.get(&title_key) {
            let artist_missing = artist_key.is_none() || !hit.has_artist;
            if artist_missing && durations_equal(query_duration, hit.duration_seconds) {
                return Some(hit.clone());
            }
        }

        None
    }
}

/// Within ±[`DURATION_TOLERANCE_SECS`]; an unknown duration on either side passes.
fn durations_within_tolerance(a: Option<u32>, b: Option<u32>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.abs_diff(b) <= DURATION_TOLERANCE_SECS,
        _ => true,
    }
}

/// Exact equality; an unknown duration on either side passes.
fn durations_equal(a: Option<u32>, b: Option<u32>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::models::NewLibraryTrack;
    use crate::library::store::SqliteLibraryStore;
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<SqliteLibraryStore>,
        index: DuplicateIndex,
        media_dir: TempDir,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteLibraryStore::in_memory().unwrap());
        let media_dir = TempDir::new().unwrap();
        let index = DuplicateIndex::new(store.clone(), media_dir.path().to_path_buf());
        Fixture {
            store,
            index,
            media_dir,
        }
    }

    fn add_track(
        fx: &Fixture,
        title: &str,
        artist: Option<&str>,
        catalog_id: Option<&str>,
        duration: Option<u32>,
        with_file: bool,
    ) -> i64 {
        let filename = format!("{}.m4a", title);
        if with_file {
            std::fs::write(fx.media_dir.path().join(&filename), b"audio").unwrap();
        }
        let record = fx
            .store
            .insert(NewLibraryTrack {
                catalog_id: catalog_id.map(String::from),
                title: title.to_string(),
                artist: artist.map(String::from),
                filename,
                format: "M4A".to_string(),
                quality: "320kbps".to_string(),
                duration_seconds: duration,
                file_size: None,
            })
            .unwrap();
        record.id
    }

    #[test]
    fn test_catalog_id_roundtrip() {
        let fx = fixture();
        let id = add_track(&fx, "Song", Some("Artist"), Some("vid123"), Some(200), true);

        let hit = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Totally Different Title",
                catalog_id: Some("vid123"),
                ..Default::default()
            })
            .unwrap()
            .expect("exact catalog id should match");
        assert_eq!(hit.track_id, id);
        assert_eq!(hit.filename, "Song.m4a");

        fx.store.delete(id).unwrap();
        fx.index.invalidate();

        let miss = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song",
                catalog_id: Some("vid123"),
                ..Default::default()
            })
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_local_placeholder_id_never_matches_by_id() {
        let fx = fixture();
        add_track(
            &fx,
            "Orphan File",
            Some("Artist"),
            Some("local_12345"),
            Some(200),
            true,
        );

        let miss = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Something Else",
                catalog_id: Some("local_12345"),
                ..Default::default()
            })
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_noisy_title_and_artist_with_duration_tolerance() {
        let fx = fixture();
        add_track(&fx, "Song", Some("Artist"), None, Some(200), true);

        // ≤3s off: match despite noisy annotations on both title and artist
        let hit = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song (Official Video)",
                artist: Some("Artist ft. Someone"),
                duration_seconds: Some(202),
                ..Default::default()
            })
            .unwrap();
        assert!(hit.is_some());

        // >3s off with both durations known: no match
        let miss = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song (Official Video)",
                artist: Some("Artist ft. Someone"),
                duration_seconds: Some(205),
                ..Default::default()
            })
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_unknown_duration_passes_tolerance() {
        let fx = fixture();
        add_track(&fx, "Song", Some("Artist"), None, Some(200), true);

        let hit = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song",
                artist: Some("Artist"),
                duration_seconds: None,
                ..Default::default()
            })
            .unwrap();
        assert!(hit.is_some());
    }

    #[test]
    fn test_title_only_match_requires_missing_artist() {
        let fx = fixture();
        add_track(&fx, "Song", None, None, Some(200), true);

        // Stored record has no artist: title-only match applies
        let hit = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song",
                artist: Some("Artist"),
                duration_seconds: Some(200),
                ..Default::default()
            })
            .unwrap();
        assert!(hit.is_some());

        // Title-only is gated by exact duration when both are known
        let miss = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song",
                artist: Some("Artist"),
                duration_seconds: Some(202),
                ..Default::default()
            })
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_different_artists_do_not_match() {
        let fx = fixture();
        add_track(&fx, "Song", Some("Artist"), None, Some(200), true);

        let miss = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song",
                artist: Some("Other Artist"),
                duration_seconds: Some(200),
                ..Default::default()
            })
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_orphaned_record_is_pruned_during_lookup() {
        let fx = fixture();
        let id = add_track(&fx, "Song", Some("Artist"), Some("vid123"), Some(200), false);

        let miss = fx
            .index
            .lookup(&DuplicateQuery {
                title: "Song",
                catalog_id: Some("vid123"),
                artist: Some("Artist"),
                duration_seconds: Some(200),
                ..Default::default()
            })
            .unwrap();
        assert!(miss.is_none());
        // The stale record was garbage-collected
        assert!(fx.store.get(id).unwrap().is_none());
        assert_eq!(fx.store.count().unwrap(), 0);
    }

    #[test]
    fn test_cache_rebuilds_on_count_change_without_invalidate() {
        let fx = fixture();
        add_track(&fx, "First", Some("Artist"), None, Some(100), true);

        // Prime the cache
        assert!(fx
            .index
            .lookup(&DuplicateQuery {
                title: "First",
                artist: Some("Artist"),
                duration_seconds: Some(100),
                ..Default::default()
            })
            .unwrap()
            .is_some());

        // Insert behind the index's back; the count mismatch forces a rebuild
        add_track(&fx, "Second", Some("Artist"), None, Some(100), true);
        assert!(fx
            .index
            .lookup(&DuplicateQuery {
                title: "Second",
                artist: Some("Artist"),
                duration_seconds: Some(100),
                ..Default::default()
            })
            .unwrap()
            .is_some());
    }
}
