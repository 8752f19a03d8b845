//! Data models for the download scheduler.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A request to download one track.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// External catalog id of the source, when known.
    #[serde(default)]
    pub catalog_id: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    /// Duration in seconds; `None` or zero means unknown.
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// Audio format (e.g. "m4a"). Defaults applied by the scheduler config.
    #[serde(default)]
    pub audio_format: Option<String>,
    /// Bitrate in kbps (e.g. "320").
    #[serde(default)]
    pub quality: Option<String>,
}

/// Status of an item sitting in the FIFO queue.
///
/// Transitions only move forward: `Queued → Downloading → {Completed, Error,
/// Skipped}`. An item never returns to `Queued` once the worker has taken it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    Downloading,
    Completed,
    Error,
    Skipped,
}

/// One pending request, owned exclusively by the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    /// Short job id, also the key of the matching active record.
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub catalog_id: Option<String>,
    pub artist: Option<String>,
    pub duration_seconds: Option<u32>,
    /// Display form of the audio format (e.g. "M4A").
    pub format: String,
    /// Display form of the quality (e.g. "320kbps").
    pub quality_label: String,
    pub status: QueueItemStatus,
    /// Unix timestamp of when the item was enqueued.
    pub added_at: i64,
}

/// Stage of an active (or recently finished) download job.
///
/// A tagged union instead of a bag of optional fields: consumers
/// pattern-match exhaustively, and each stage carries exactly the data that
/// exists at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStage {
    /// Taken off the queue, not yet handed to the downloader.
    Pending,
    /// The downloader is transferring; fields mirror its latest callback.
    Downloading {
        progress_percent: f64,
        speed: Option<String>,
        eta_seconds: Option<u64>,
    },
    /// Transfer finished, post-processing (transcode/tagging) running.
    Processing,
    /// Done; the file is in the library.
    Completed { filename: String },
    /// Skipped without downloading: the library already had it.
    Skipped { existing_file: String },
    /// The downloader reported an error; the raw message is attached.
    Error { reason: String },
}

impl JobStage {
    /// True for stages with no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStage::Completed { .. } | JobStage::Skipped { .. } | JobStage::Error { .. }
        )
    }
}

/// Live status snapshot of one download job, keyed by job id.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJobRecord {
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub artist: Option<String>,
    pub format: String,
    pub quality_label: String,
    #[serde(flatten)]
    pub stage: JobStage,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Refreshed on every mutation; drives the retention sweep.
    pub updated_at: i64,
}

impl ActiveJobRecord {
    /// Fresh record for an item the worker just picked up.
    pub fn for_item(item: &QueueItem) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: item.id.clone(),
            source_url: item.source_url.clone(),
            title: item.title.clone(),
            artist: item.artist.clone(),
            format: item.format.clone(),
            quality_label: item.quality_label.clone(),
            stage: JobStage::Pending,
            started_at: Some(now),
            completed_at: None,
            updated_at: now,
        }
    }

    /// Move to a new stage, stamping `updated_at` (and `completed_at` on a
    /// terminal transition).
    pub fn transition(&mut self, stage: JobStage) {
        let now = Utc::now().timestamp();
        if stage.is_terminal() {
            self.completed_at = Some(now);
        }
        self.stage = stage;
        self.updated_at = now;
    }
}

/// Receipt returned by `enqueue`.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueReceipt {
    pub job_id: String,
    /// 1-based position in the queue at enqueue time.
    pub position: usize,
}

/// Snapshot of the whole scheduler for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue: Vec<QueueItem>,
    pub active: Vec<ActiveJobRecord>,
    pub total: usize,
}

/// Outcome of waiting for a job to reach a terminal stage.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadWaitOutcome {
    /// The job completed; `already_present` when it was a duplicate skip.
    Succeeded {
        filename: Option<String>,
        already_present: bool,
    },
    Failed {
        reason: String,
    },
    TimedOut,
}
