//! Playlist import orchestration.
//!
//! Drives an end-to-end import: fetch the playlist from its source catalog,
//! persist per-track state, match each track against the target catalog,
//! consult the duplicate index, enqueue confirmed matches for download, and
//! wait for each download before moving on. Tracks are processed strictly
//! one at a time — the scheduler serializes downloads anyway, and the
//! external catalogs expect a polite request rate.

use anyhow::{bail, Context, Result};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::catalog::{is_playlist_source_url, PlaylistSource, SearchKind, SearchProvider};
use crate::library::{DuplicateIndex, DuplicateQuery};
use crate::matching::{pick_best, ScoredMatch, SourceTrack};
use crate::scheduler::{DownloadRequest, DownloadScheduler, DownloadWaitOutcome};

use super::models::{
    ImportJob, ImportJobStatus, ImportTrack, ImportTrackStatus, NewImportTrack,
};
use super::store::ImportStore;

/// Tuning knobs for the orchestrator. The score bars are the acceptance
/// policy layered on top of the scorer's internal thresholds.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Pause between tracks, a courtesy to the external catalogs.
    pub inter_track_delay: Duration,
    /// How long to wait for one enqueued download before failing the track.
    pub download_timeout: Duration,
    /// Minimum score to accept a match.
    pub accept_score: f64,
    /// Minimum score to accept a catalog-verified match.
    pub accept_score_verified: f64,
    /// Candidates requested per search pass.
    pub search_limit: usize,
    /// Cap on per-track failure reasons.
    pub reason_max_len: usize,
    /// Cap on job-level error messages.
    pub error_max_len: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            inter_track_delay: Duration::from_secs(1),
            download_timeout: Duration::from_secs(120),
            accept_score: 80.0,
            accept_score_verified: 75.0,
            search_limit: 20,
            reason_max_len: 200,
            error_max_len: 500,
        }
    }
}

/// Orchestrates playlist imports. One spawned task per job; any number of
/// jobs may run concurrently, all serializing through the one scheduler.
pub struct ImportOrchestrator {
    store: Arc<dyn ImportStore>,
    playlist_source: Arc<dyn PlaylistSource>,
    search: Arc<dyn SearchProvider>,
    duplicate_index: Arc<DuplicateIndex>,
    scheduler: Arc<DownloadScheduler>,
    settings: ImportSettings,
    self_ref: Weak<ImportOrchestrator>,
}

impl ImportOrchestrator {
    pub fn new(
        store: Arc<dyn ImportStore>,
        playlist_source: Arc<dyn PlaylistSource>,
        search: Arc<dyn SearchProvider>,
        duplicate_index: Arc<DuplicateIndex>,
        scheduler: Arc<DownloadScheduler>,
        settings: ImportSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            store,
            playlist_source,
            search,
            duplicate_index,
            scheduler,
            settings,
            self_ref: weak.clone(),
        })
    }

    /// Create an import job and start processing it in the background.
    ///
    /// Validation failures (bad URL, playlist already importing) return an
    /// error without creating any job row. The returned job is `pending`;
    /// callers poll for progress.
    pub fn submit(&self, playlist_url: &str) -> Result<ImportJob> {
        let playlist_url = playlist_url.trim();
        if !is_playlist_source_url(playlist_url) {
            bail!("Invalid playlist URL");
        }
        if self.store.find_active_by_url(playlist_url)?.is_some() {
            bail!("This playlist is already being imported");
        }

        let job = ImportJob::new(playlist_url.to_string());
        self.store.create_job(&job)?;

        info!("Created import job {} for {}", job.id, playlist_url);
        self.spawn_job(job.id.clone());

        Ok(job)
    }

    /// Re-run a job, processing only its non-terminal tracks.
    pub fn resume(&self, job_id: &str) -> Result<ImportJob> {
        let job = self
            .store
            .get_job(job_id)?
            .with_context(|| format!("Import job {} not found", job_id))?;
        if job.status == ImportJobStatus::Completed {
            bail!("Import job {} already completed", job_id);
        }

        info!("Resuming import job {}", job_id);
        self.spawn_job(job.id.clone());
        Ok(job)
    }

    /// Resume jobs a previous process left mid-flight. Returns how many were
    /// picked up.
    pub fn resume_interrupted(&self) -> Result<usize> {
        let mut resumed = 0;
        for status in [ImportJobStatus::Processing, ImportJobStatus::Pending] {
            for job in self.store.jobs_with_status(status)? {
                info!(
                    "Resuming interrupted import job {} ({})",
                    job.id, job.playlist_url
                );
                self.spawn_job(job.id);
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<(ImportJob, Vec<ImportTrack>)>> {
        match self.store.get_job(job_id)? {
            Some(job) => {
                let tracks = self.store.tracks_for_job(job_id)?;
                Ok(Some((job, tracks)))
            }
            None => Ok(None),
        }
    }

    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<ImportJob>> {
        self.store.list_recent_jobs(limit)
    }

    fn spawn_job(&self, job_id: String) {
        if let Some(orchestrator) = self.self_ref.upgrade() {
            tokio::spawn(async move { orchestrator.process_job(job_id).await });
        }
    }

    /// Background worker for one job.
    async fn process_job(self: Arc<Self>, job_id: String) {
        let mut job = match self.store.get_job(&job_id) {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to load import job {}: {:#}", job_id, e);
                return;
            }
        };

        if let Err(e) = self.run_job(&mut job).await {
            error!("Import job {} failed: {:#}", job.id, e);
            job.status = ImportJobStatus::Failed;
            job.error_message = Some(truncate(&format!("{:#}", e), self.settings.error_max_len));
            job.completed_at = Some(chrono::Utc::now().timestamp());
            job.current_track_label.clear();
            if let Err(e) = self.store.update_job(&job) {
                error!("Failed to persist failure of import job {}: {:#}", job.id, e);
            }
        }
    }

    async fn run_job(&self, job: &mut ImportJob) -> Result<()> {
        job.status = ImportJobStatus::Processing;
        job.current_track_label = "Fetching playlist...".to_string();
        self.store.update_job(job)?;

        // On a fresh job, fetch the playlist and create the track rows. A
        // resumed job keeps its rows; only the label is refreshed.
        let mut tracks = self.store.tracks_for_job(&job.id)?;
        if tracks.is_empty() {
            let playlist = self
                .playlist_source
                .fetch_playlist_tracks(&job.playlist_url)
                .await
                .context("Failed to fetch playlist")?;

            let new_tracks: Vec<NewImportTrack> = playlist
                .tracks
                .iter()
                .map(|t| NewImportTrack {
                    title: t.title.clone(),
                    artist: t.artists.join(", "),
                    album: t.album.clone().unwrap_or_default(),
                    external_id: t.external_id.clone(),
                    duration_ms: t.duration_ms,
                })
                .collect();

            self.store.insert_tracks(&job.id, &new_tracks)?;
            job.label = playlist.label;
            job.total_tracks = new_tracks.len() as u32;
            self.store.update_job(job)?;

            tracks = self.store.tracks_for_job(&job.id)?;
        }

        for index in 0..tracks.len() {
            // Resume support: terminal tracks are never touched again.
            if tracks[index].status.is_terminal() {
                continue;
            }

            if let Err(e) = self.process_single_track(job, &mut tracks[index]).await {
                warn!(
                    "Import job {}: track '{}' failed: {:#}",
                    job.id, tracks[index].title, e
                );
                tracks[index].status = ImportTrackStatus::Failed;
                tracks[index].reason = Some(truncate(
                    &format!("Error: {:#}", e),
                    self.settings.reason_max_len,
                ));
                job.failed_count += 1;
                self.store.update_track(&tracks[index])?;
            }

            // Point observers at the upcoming track, or clear when done.
            job.current_track_label = match tracks.get(index + 1) {
                Some(next) if job.processed_count() < job.total_tracks => next.display_label(),
                _ => String::new(),
            };
            self.store.update_job(job)?;

            tokio::time::sleep(self.settings.inter_track_delay).await;
        }

        job.status = ImportJobStatus::Completed;
        job.completed_at = Some(chrono::Utc::now().timestamp());
        job.current_track_label.clear();
        self.store.update_job(job)?;

        info!(
            "Import job {} completed: {} downloaded, {} skipped, {} failed",
            job.id, job.downloaded_count, job.skipped_count, job.failed_count
        );
        Ok(())
    }

    async fn process_single_track(&self, job: &mut ImportJob, track: &mut ImportTrack) -> Result<()> {
        track.status = ImportTrackStatus::Matching;
        job.current_track_label = track.display_label();
        self.store.update_track(track)?;
        self.store.update_job(job)?;

        let source = SourceTrack {
            title: track.title.clone(),
            artists: track.artist_list(),
            duration_seconds: track.duration_seconds(),
            album: Some(track.album.clone()).filter(|a| !a.is_empty()),
        };

        let best = self.find_best_match(&source).await;

        let accepted = match best {
            Some(m) if self.is_accepted(&m) => m,
            _ => {
                track.status = ImportTrackStatus::Skipped;
                track.reason = Some("No confident match found".to_string());
                job.skipped_count += 1;
                self.store.update_track(track)?;
                return Ok(());
            }
        };

        track.matched_catalog_id = Some(accepted.candidate.catalog_id.clone());
        track.score = Some((accepted.score * 10.0).round() / 10.0);

        let duplicate = self.duplicate_index.lookup(&DuplicateQuery {
            title: &accepted.candidate.title,
            catalog_id: Some(&accepted.candidate.catalog_id),
            artist: accepted
                .candidate
                .primary_artist()
                .or(Some(track.artist.as_str()))
                .filter(|a| !a.is_empty()),
            duration_seconds: accepted.candidate.duration_seconds,
        })?;
        if duplicate.is_some() {
            track.status = ImportTrackStatus::Downloaded;
            track.reason = Some("Already in library".to_string());
            job.downloaded_count += 1;
            self.store.update_track(track)?;
            return Ok(());
        }

        track.status = ImportTrackStatus::Downloading;
        self.store.update_track(track)?;

        let receipt = self.scheduler.enqueue(DownloadRequest {
            url: accepted.candidate.url.clone(),
            title: accepted.candidate.title.clone(),
            thumbnail: Some(format!(
                "https://i.ytimg.com/vi/{}/mqdefault.jpg",
                accepted.candidate.catalog_id
            )),
            catalog_id: Some(accepted.candidate.catalog_id.clone()),
            artist: Some(accepted.candidate.joined_artists()).filter(|a| !a.is_empty()),
            duration_seconds: accepted.candidate.duration_seconds,
            audio_format: None,
            quality: None,
        });

        match self
            .scheduler
            .wait_for_terminal(&receipt.job_id, self.settings.download_timeout)
            .await
        {
            DownloadWaitOutcome::Succeeded {
                already_present, ..
            } => {
                track.status = ImportTrackStatus::Downloaded;
                if already_present {
                    track.reason = Some("Already in library".to_string());
                }
                job.downloaded_count += 1;
            }
            DownloadWaitOutcome::Failed { reason } => {
                track.status = ImportTrackStatus::Failed;
                track.reason = Some(truncate(
                    &format!("Download error: {}", reason),
                    self.settings.reason_max_len,
                ));
                job.failed_count += 1;
            }
            DownloadWaitOutcome::TimedOut => {
                track.status = ImportTrackStatus::Failed;
                track.reason = Some("Download timed out".to_string());
                job.failed_count += 1;
            }
        }
        self.store.update_track(track)?;
        Ok(())
    }

    /// Song-kind search first; fall back to the noisier video kind only when
    /// the song pass produced nothing acceptable.
    async fn find_best_match(&self, source: &SourceTrack) -> Option<ScoredMatch> {
        let query = match source.primary_artist() {
            Some(artist) => format!("{} {}", source.title, artist),
            None => source.title.clone(),
        };

        let mut candidates = match self
            .search
            .search(&query, SearchKind::Songs, self.settings.search_limit)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Song search failed for '{}': {:#}", query, e);
                Vec::new()
            }
        };

        let best = pick_best(source, &candidates);
        if let Some(m) = &best {
            if self.is_accepted(m) {
                return best;
            }
        }

        match self
            .search
            .search(&query, SearchKind::Videos, self.settings.search_limit)
            .await
        {
            Ok(results) => candidates.extend(results),
            Err(e) => warn!("Video search failed for '{}': {:#}", query, e),
        }

        pick_best(source, &candidates)
    }

    fn is_accepted(&self, m: &ScoredMatch) -> bool {
        m.score >= self.settings.accept_score
            || (m.candidate.verified && m.score >= self.settings.accept_score_verified)
    }
}

/// Truncate on a character boundary, appending nothing.
fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
