//! Optional TOML configuration file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level TOML config. Every field is optional; present values override
/// the matching CLI arguments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub media_dir: Option<String>,
    pub port: Option<u16>,
    /// Base URL of the companion search service.
    pub search_url: Option<String>,
    pub search_timeout_sec: Option<u64>,
    pub playlist_timeout_sec: Option<u64>,
    pub audio_format: Option<String>,
    pub quality: Option<String>,
    pub scheduler: Option<SchedulerFileConfig>,
    pub import: Option<ImportFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerFileConfig {
    /// Seconds terminal job records stay visible before the sweep drops them.
    pub retention_secs: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportFileConfig {
    pub inter_track_delay_ms: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub accept_score: Option<f64>,
    pub accept_score_verified: Option<f64>,
    pub search_limit: Option<usize>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path.as_ref()))
    }
}
