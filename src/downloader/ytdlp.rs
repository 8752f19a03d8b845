//! `yt-dlp` backed downloader.
//!
//! Two-phase: a metadata probe (`--dump-json --no-download`) resolves title,
//! artist, and duration up front and determines the output filename; the
//! actual extraction then runs with `--newline` progress reporting, which this
//! wrapper parses into ordered [`ProgressUpdate`] callbacks.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{DownloadError, DownloadSpec, DownloadedTrack, Downloader, ProgressCallback, ProgressUpdate};

lazy_static! {
    /// yt-dlp progress lines, e.g.
    /// `[download]  42.7% of 3.52MiB at 1.21MiB/s ETA 00:12`
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*\S+)?(?:\s+at\s+(\S+))?(?:\s+ETA\s+(\S+))?",
    )
    .unwrap();
}

/// Metadata subset of yt-dlp's `--dump-json` output.
#[derive(Debug, Deserialize)]
struct ProbeMetadata {
    title: String,
    artist: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
}

pub struct YtDlpDownloader;

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self
    }

    async fn probe(&self, url: &str) -> Result<ProbeMetadata, DownloadError> {
        let output = Command::new("yt-dlp")
            .arg("--dump-json")
            .arg("--no-download")
            .arg("--no-playlist")
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(DownloadError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| DownloadError::Failed(format!("unparseable metadata: {}", e)))
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(
        &self,
        spec: &DownloadSpec,
        on_progress: ProgressCallback,
    ) -> Result<DownloadedTrack, DownloadError> {
        which::which("yt-dlp").map_err(|_| DownloadError::ToolNotFound)?;

        let metadata = self.probe(&spec.url).await?;
        let artist = metadata.artist.clone().or_else(|| metadata.uploader.clone());

        let filename = format!(
            "{}.{}",
            sanitize_filename::sanitize(&metadata.title),
            spec.audio_format.to_lowercase()
        );
        let output_path = spec.output_dir.join(&filename);

        let mut child = Command::new("yt-dlp")
            .arg("-x")
            .arg("--audio-format")
            .arg(spec.audio_format.to_lowercase())
            .arg("--audio-quality")
            .arg(&spec.quality)
            .arg("--format")
            .arg("bestaudio/best")
            .arg("--no-playlist")
            .arg("--newline")
            .arg("-o")
            .arg(&output_path)
            .arg(&spec.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(update) = parse_progress_line(&line) {
                    on_progress(update);
                } else {
                    debug!("yt-dlp: {}", line);
                }
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(DownloadError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let file_size = match tokio::fs::metadata(&output_path).await {
            Ok(meta) => Some(meta.len()),
            Err(e) => {
                warn!(
                    "Downloaded '{}' but could not stat {:?}: {}",
                    metadata.title, output_path, e
                );
                None
            }
        };

        Ok(DownloadedTrack {
            filename,
            title: metadata.title,
            artist,
            duration_seconds: metadata.duration.map(|d| d.round().max(0.0) as u32),
            file_size,
        })
    }
}

/// Parse one yt-dlp `--newline` progress line, if it is one.
fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let captures = PROGRESS_RE.captures(line)?;

    let percent: f64 = captures.get(1)?.as_str().parse().ok()?;
    let speed = captures
        .get(2)
        .map(|m| m.as_str().to_string())
        .filter(|s| s != "Unknown");
    let eta_seconds = captures
        .get(3)
        .and_then(|m| parse_clock_duration(m.as_str()));

    Some(ProgressUpdate {
        percent,
        speed,
        eta_seconds,
    })
}

/// Parse "SS", "MM:SS" or "HH:MM:SS" into seconds.
fn parse_clock_duration(value: &str) -> Option<u64> {
    let mut total = 0u64;
    for part in value.split(':') {
        total = total * 60 + part.parse::<u64>().ok()?;
    }
    Some(total)
}
