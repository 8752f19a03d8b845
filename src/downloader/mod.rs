//! External audio downloader collaborator.
//!
//! The scheduler drives a single [`Downloader`] instance; the contract is one
//! call at a time, ordered progress callbacks, and a typed result. The shipped
//! implementation wraps the `yt-dlp` tool.

mod ytdlp;

pub use ytdlp::YtDlpDownloader;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// What to download and how to encode it.
#[derive(Debug, Clone)]
pub struct DownloadSpec {
    pub url: String,
    /// Audio container/codec (e.g. "m4a", "mp3").
    pub audio_format: String,
    /// Bitrate in kbps (e.g. "320").
    pub quality: String,
    /// Directory the finished file must land in.
    pub output_dir: PathBuf,
}

/// A progress report from an in-flight download. Advisory: later updates
/// overwrite earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    /// Human-readable transfer rate as reported by the tool (e.g. "1.21MiB/s").
    pub speed: Option<String>,
    pub eta_seconds: Option<u64>,
}

/// Ordered progress sink handed to the downloader for one call.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// A successfully downloaded and transcoded track.
#[derive(Debug, Clone)]
pub struct DownloadedTrack {
    /// File name relative to the requested output directory.
    pub filename: String,
    pub title: String,
    pub artist: Option<String>,
    pub duration_seconds: Option<u32>,
    pub file_size: Option<u64>,
}

/// Errors from the download collaborator.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("yt-dlp executable not found in PATH")]
    ToolNotFound,
    #[error("invalid or unsupported source url: {0}")]
    InvalidUrl(String),
    #[error("download failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Downloads one track at a time. Implementations must not be called
/// concurrently; the scheduler's single worker guarantees this.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        spec: &DownloadSpec,
        on_progress: ProgressCallback,
    ) -> Result<DownloadedTrack, DownloadError>;
}
