//! Data models for playlist import jobs.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Status of a whole import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportJobStatus {
    Pending,
    Processing,
    Completed, // terminal
    Failed,    // terminal
}

impl ImportJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportJobStatus::Completed | ImportJobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportJobStatus::Pending => "pending",
            ImportJobStatus::Processing => "processing",
            ImportJobStatus::Completed => "completed",
            ImportJobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImportJobStatus::Pending),
            "processing" => Some(ImportJobStatus::Processing),
            "completed" => Some(ImportJobStatus::Completed),
            "failed" => Some(ImportJobStatus::Failed),
            _ => None,
        }
    }
}

/// Status of one track within an import job.
///
/// Moves forward only: `pending → matching → downloading → {downloaded,
/// skipped, failed}`. A track found in a terminal status on resume is never
/// touched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportTrackStatus {
    Pending,
    Matching,
    Downloading,
    Downloaded, // terminal
    Skipped,    // terminal
    Failed,     // terminal
}

impl ImportTrackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportTrackStatus::Downloaded | ImportTrackStatus::Skipped | ImportTrackStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportTrackStatus::Pending => "pending",
            ImportTrackStatus::Matching => "matching",
            ImportTrackStatus::Downloading => "downloading",
            ImportTrackStatus::Downloaded => "downloaded",
            ImportTrackStatus::Skipped => "skipped",
            ImportTrackStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImportTrackStatus::Pending),
            "matching" => Some(ImportTrackStatus::Matching),
            "downloading" => Some(ImportTrackStatus::Downloading),
            "downloaded" => Some(ImportTrackStatus::Downloaded),
            "skipped" => Some(ImportTrackStatus::Skipped),
            "failed" => Some(ImportTrackStatus::Failed),
            _ => None,
        }
    }
}

/// One playlist import job. Never deleted automatically; jobs are history.
#[derive(Debug, Clone)]
pub struct ImportJob {
    /// Full UUID.
    pub id: String,
    pub playlist_url: String,
    /// Playlist display name, filled in once the source has been fetched.
    pub label: String,
    pub status: ImportJobStatus,
    pub total_tracks: u32,
    pub downloaded_count: u32,
    pub skipped_count: u32,
    pub failed_count: u32,
    /// "Artist - Title" of the track currently being processed.
    pub current_track_label: String,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl ImportJob {
    pub fn new(playlist_url: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            playlist_url,
            label: String::new(),
            status: ImportJobStatus::Pending,
            total_tracks: 0,
            downloaded_count: 0,
            skipped_count: 0,
            failed_count: 0,
            current_track_label: String::new(),
            error_message: None,
            created_at: Utc::now().timestamp(),
            completed_at: None,
        }
    }

    pub fn processed_count(&self) -> u32 {
        self.downloaded_count + self.skipped_count + self.failed_count
    }

    /// Share of tracks in a terminal status, 0-100 with one decimal.
    pub fn progress_percent(&self) -> f64 {
        if self.total_tracks == 0 {
            return 0.0;
        }
        round1(self.processed_count() as f64 / self.total_tracks as f64 * 100.0)
    }

    /// Share of processed tracks that ended up downloaded.
    pub fn match_rate(&self) -> f64 {
        let processed = self.processed_count();
        if processed == 0 {
            return 0.0;
        }
        round1(self.downloaded_count as f64 / processed as f64 * 100.0)
    }

    pub fn view(&self) -> ImportJobView {
        ImportJobView {
            id: self.id.clone(),
            playlist_url: self.playlist_url.clone(),
            label: self.label.clone(),
            status: self.status,
            total_tracks: self.total_tracks,
            downloaded: self.downloaded_count,
            skipped: self.skipped_count,
            failed: self.failed_count,
            current_track: self.current_track_label.clone(),
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            progress_percent: self.progress_percent(),
            match_rate: self.match_rate(),
        }
    }
}

/// JSON view of a job, with derived progress fields.
#[derive(Debug, Clone, Serialize)]
pub struct ImportJobView {
    pub id: String,
    pub playlist_url: String,
    pub label: String,
    pub status: ImportJobStatus,
    pub total_tracks: u32,
    pub downloaded: u32,
    pub skipped: u32,
    pub failed: u32,
    pub current_track: String,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub progress_percent: f64,
    pub match_rate: f64,
}

/// One track within an import job.
#[derive(Debug, Clone, Serialize)]
pub struct ImportTrack {
    pub id: i64,
    pub job_id: String,
    pub title: String,
    /// Artists as a joined display string ("A, B").
    pub artist: String,
    pub album: String,
    /// Source catalog's track id, when known.
    pub external_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub status: ImportTrackStatus,
    /// Target catalog id of the accepted match.
    pub matched_catalog_id: Option<String>,
    pub score: Option<f64>,
    /// Why the track ended in its terminal status.
    pub reason: Option<String>,
}

impl ImportTrack {
    pub fn display_label(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.artist, self.title)
        }
    }

    /// Individual artists out of the joined display string.
    pub fn artist_list(&self) -> Vec<String> {
        self.artist
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect()
    }

    /// Duration in whole seconds, when known and positive.
    pub fn duration_seconds(&self) -> Option<u32> {
        self.duration_ms
            .map(|ms| (ms as f64 / 1000.0).round() as u32)
            .filter(|s| *s > 0)
    }
}

/// Fields for bulk-creating the tracks of a freshly fetched playlist.
#[derive(Debug, Clone)]
pub struct NewImportTrack {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub external_id: Option<String>,
    pub duration_ms: Option<u64>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
