//! Sequential download job scheduler.
//!
//! A single-worker FIFO queue in front of the external downloader. The worker
//! is a lazily spawned tokio task: it processes the queue one item at a time,
//! self-terminates when the queue drains, and is restarted by the next
//! enqueue — no idle polling. At most one downloader call is in flight
//! process-wide, because the external tool and local disk I/O are the shared
//! bottleneck.
//!
//! The scheduler is an explicitly constructed instance injected where needed;
//! its queue and active-job map are owned fields, not process globals.

mod models;

pub use models::{
    ActiveJobRecord, DownloadRequest, DownloadWaitOutcome, EnqueueReceipt, JobStage, QueueItem,
    QueueItemStatus, QueueSnapshot,
};

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::catalog::extract_video_id;
use crate::downloader::{DownloadSpec, Downloader, ProgressCallback};
use crate::library::{DuplicateIndex, DuplicateQuery, LibraryStore, NewLibraryTrack};

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// How long terminal job records stay visible before the sweep drops them.
    pub retention_secs: i64,
    /// Audio format used when a request does not specify one.
    pub default_audio_format: String,
    /// Quality (kbps) used when a request does not specify one.
    pub default_quality: String,
    /// Directory downloads are written to.
    pub media_dir: std::path::PathBuf,
}

impl SchedulerSettings {
    pub fn new(media_dir: std::path::PathBuf) -> Self {
        Self {
            retention_secs: 120,
            default_audio_format: "m4a".to_string(),
            default_quality: "320".to_string(),
            media_dir,
        }
    }
}

struct QueueState {
    items: VecDeque<QueueItem>,
    worker_running: bool,
}

/// Single-worker FIFO download scheduler.
pub struct DownloadScheduler {
    downloader: Arc<dyn Downloader>,
    library: Arc<dyn LibraryStore>,
    duplicate_index: Arc<DuplicateIndex>,
    settings: SchedulerSettings,
    state: Mutex<QueueState>,
    active: Mutex<HashMap<String, ActiveJobRecord>>,
    /// Signaled on every terminal job transition; drives bounded waits.
    change: Notify,
    /// Back-reference handed to the spawned worker task and progress callbacks.
    self_ref: Weak<DownloadScheduler>,
}

impl DownloadScheduler {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        library: Arc<dyn LibraryStore>,
        duplicate_index: Arc<DuplicateIndex>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            downloader,
            library,
            duplicate_index,
            settings,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                worker_running: false,
            }),
            active: Mutex::new(HashMap::new()),
            change: Notify::new(),
            self_ref: weak.clone(),
        })
    }

    /// Add a request to the queue and make sure the worker is running.
    pub fn enqueue(&self, request: DownloadRequest) -> EnqueueReceipt {
        let audio_format = request
            .audio_format
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| self.settings.default_audio_format.clone());
        let quality = request
            .quality
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| self.settings.default_quality.clone());

        let item = QueueItem {
            id: short_job_id(),
            source_url: request.url,
            title: request.title,
            thumbnail: request.thumbnail,
            catalog_id: request.catalog_id.filter(|c| !c.is_empty()),
            artist: request.artist.filter(|a| !a.is_empty()),
            duration_seconds: request.duration_seconds.filter(|d| *d > 0),
            format: audio_format.to_uppercase(),
            quality_label: format!("{}kbps", quality),
            status: QueueItemStatus::Queued,
            added_at: Utc::now().timestamp(),
        };

        let receipt;
        let start_worker;
        {
            let mut state = self.state.lock().unwrap();
            state.items.push_back(item.clone());
            receipt = EnqueueReceipt {
                job_id: item.id.clone(),
                position: state.items.len(),
            };
            start_worker = !state.worker_running;
            if start_worker {
                state.worker_running = true;
            }
        }

        info!(
            "Enqueued download '{}' as job {} (position {})",
            item.title, receipt.job_id, receipt.position
        );

        if start_worker {
            if let Some(scheduler) = self.self_ref.upgrade() {
                tokio::spawn(async move { scheduler.run_worker().await });
            }
        }

        receipt
    }

    /// Status of one job, if its record is still retained.
    pub fn status(&self, job_id: &str) -> Option<ActiveJobRecord> {
        self.sweep_finished();
        self.active.lock().unwrap().get(job_id).cloned()
    }

    /// All retained active/recent job records.
    pub fn list_active(&self) -> Vec<ActiveJobRecord> {
        self.sweep_finished();
        self.active.lock().unwrap().values().cloned().collect()
    }

    /// Queue contents plus active records, for the HTTP layer.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.sweep_finished();
        let queue: Vec<QueueItem> = self.state.lock().unwrap().items.iter().cloned().collect();
        let active = self.active.lock().unwrap().values().cloned().collect();
        QueueSnapshot {
            total: queue.len(),
            queue,
            active,
        }
    }

    /// Remove a queued-but-unstarted item. An in-flight item cannot be
    /// preempted; it runs to completion or failure.
    pub fn cancel_pending(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let position = state
            .items
            .iter()
            .position(|item| item.id == job_id && item.status == QueueItemStatus::Queued);
        match position {
            Some(index) => {
                state.items.remove(index);
                info!("Removed queued download job {}", job_id);
                true
            }
            None => false,
        }
    }

    fn is_queued(&self, job_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .any(|item| item.id == job_id)
    }

    /// Wait until the job reaches a terminal stage, bounded by `timeout`.
    ///
    /// A job found in neither the queue nor the active map is treated as
    /// completed: it finished and the retention sweep already dropped it.
    pub async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> DownloadWaitOutcome {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register for wakeups before inspecting state, so a transition
            // landing in between is not missed.
            let notified = self.change.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.status(job_id) {
                Some(record) => match record.stage {
                    JobStage::Completed { filename } => {
                        return DownloadWaitOutcome::Succeeded {
                            filename: Some(filename),
                            already_present: false,
                        }
                    }
                    JobStage::Skipped { existing_file } => {
                        return DownloadWaitOutcome::Succeeded {
                            filename: Some(existing_file),
                            already_present: true,
                        }
                    }
                    JobStage::Error { reason } => {
                        return DownloadWaitOutcome::Failed { reason }
                    }
                    _ => {}
                },
                None => {
                    if !self.is_queued(job_id) {
                        return DownloadWaitOutcome::Succeeded {
                            filename: None,
                            already_present: false,
                        };
                    }
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("Wait for download job {} timed out", job_id);
                    return DownloadWaitOutcome::TimedOut;
                }
            }
        }
    }

    /// Worker loop: one item at a time until the queue drains.
    async fn run_worker(self: Arc<Self>) {
        loop {
            let item = {
                let mut state = self.state.lock().unwrap();
                match state.items.front_mut() {
                    None => {
                        state.worker_running = false;
                        return;
                    }
                    Some(front) => {
                        front.status = QueueItemStatus::Downloading;
                        front.clone()
                    }
                }
            };

            self.process_item(&item).await;

            let mut state = self.state.lock().unwrap();
            if state.items.front().map(|f| f.id == item.id).unwrap_or(false) {
                state.items.pop_front();
            }
        }
    }

    async fn process_item(&self, item: &QueueItem) {
        self.active
            .lock()
            .unwrap()
            .insert(item.id.clone(), ActiveJobRecord::for_item(item));

        // Metadata may have changed since enqueue; re-check before spending a
        // downloader call.
        match self.duplicate_index.lookup(&DuplicateQuery {
            title: &item.title,
            catalog_id: item.catalog_id.as_deref(),
            artist: item.artist.as_deref(),
            duration_seconds: item.duration_seconds,
        }) {
            Ok(Some(hit)) => {
                info!(
                    "Skipping download job {}: '{}' already in library as '{}'",
                    item.id, item.title, hit.filename
                );
                self.finish_job(
                    &item.id,
                    JobStage::Skipped {
                        existing_file: hit.filename,
                    },
                );
                return;
            }
            Ok(None) => {}
            Err(e) => {
                // A broken duplicate check must not block downloads.
                warn!("Duplicate check failed for job {}: {:#}", item.id, e);
            }
        }

        self.patch_job(
            &item.id,
            JobStage::Downloading {
                progress_percent: 0.0,
                speed: None,
                eta_seconds: None,
            },
        );

        let spec = DownloadSpec {
            url: item.source_url.clone(),
            audio_format: item.format.to_lowercase(),
            quality: item.quality_label.replace("kbps", ""),
            output_dir: self.settings.media_dir.clone(),
        };

        let on_progress = self.progress_callback(item.id.clone());
        match self.downloader.download(&spec, on_progress).await {
            Ok(track) => {
                self.patch_job(&item.id, JobStage::Processing);
                match self.record_downloaded_track(item, &track) {
                    Ok(()) => {
                        info!("Download job {} completed: '{}'", item.id, track.filename);
                        self.finish_job(
                            &item.id,
                            JobStage::Completed {
                                filename: track.filename.clone(),
                            },
                        );
                    }
                    Err(e) => {
                        warn!("Failed to record job {} in library: {:#}", item.id, e);
                        self.finish_job(
                            &item.id,
                            JobStage::Error {
                                reason: format!("{:#}", e),
                            },
                        );
                    }
                }
            }
            Err(e) => {
                // One failing item never blocks the queue.
                warn!("Download job {} failed: {}", item.id, e);
                self.finish_job(
                    &item.id,
                    JobStage::Error {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    fn progress_callback(&self, job_id: String) -> ProgressCallback {
        let scheduler = self.self_ref.clone();
        Arc::new(move |update| {
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.patch_job(
                    &job_id,
                    JobStage::Downloading {
                        progress_percent: update.percent,
                        speed: update.speed,
                        eta_seconds: update.eta_seconds,
                    },
                );
            }
        })
    }

    /// Persist a finished download, unless a concurrent import already did.
    fn record_downloaded_track(
        &self,
        item: &QueueItem,
        track: &crate::downloader::DownloadedTrack,
    ) -> anyhow::Result<()> {
        let catalog_id = item
            .catalog_id
            .clone()
            .or_else(|| extract_video_id(&item.source_url));
        let title = if track.title.is_empty() {
            item.title.clone()
        } else {
            track.title.clone()
        };
        let artist = track.artist.clone().or_else(|| item.artist.clone());
        let duration = track.duration_seconds.or(item.duration_seconds);

        let already_there = self
            .duplicate_index
            .lookup(&DuplicateQuery {
                title: &title,
                catalog_id: catalog_id.as_deref(),
                artist: artist.as_deref(),
                duration_seconds: duration,
            })?
            .is_some();
        if already_there {
            return Ok(());
        }

        self.library.insert(NewLibraryTrack {
            catalog_id,
            title,
            artist,
            filename: track.filename.clone(),
            format: item.format.clone(),
            quality: item.quality_label.clone(),
            duration_seconds: duration,
            file_size: track.file_size,
        })?;
        self.duplicate_index.invalidate();
        Ok(())
    }

    /// Non-terminal stage update (progress and similar); no wakeup.
    fn patch_job(&self, job_id: &str, stage: JobStage) {
        if let Some(record) = self.active.lock().unwrap().get_mut(job_id) {
            record.transition(stage);
        }
    }

    /// Terminal stage update; wakes every waiter.
    fn finish_job(&self, job_id: &str, stage: JobStage) {
        if let Some(record) = self.active.lock().unwrap().get_mut(job_id) {
            record.transition(stage);
        }
        self.change.notify_waiters();
    }

    /// Drop terminal records past the retention window. Invoked
    /// opportunistically on every read so memory stays bounded without a
    /// dedicated timer.
    fn sweep_finished(&self) {
        let cutoff = Utc::now().timestamp() - self.settings.retention_secs;
        self.active
            .lock()
            .unwrap()
            .retain(|_, record| !(record.stage.is_terminal() && record.updated_at <= cutoff));
    }

    /// Test hook: age a job record so the retention sweep can see it as old.
    #[cfg(test)]
    fn backdate_job(&self, job_id: &str, secs: i64) {
        if let Some(record) = self.active.lock().unwrap().get_mut(job_id) {
            record.updated_at -= secs;
        }
    }
}

fn short_job_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}
