//! Configuration resolution.
//!
//! CLI arguments merged with an optional TOML file; TOML values override CLI
//! values where present. The resolved [`AppConfig`] carries the typed
//! settings structs the components are constructed with.

mod file_config;

pub use file_config::{FileConfig, ImportFileConfig, SchedulerFileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::import::ImportSettings;
use crate::scheduler::SchedulerSettings;

/// CLI arguments that participate in config resolution.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: PathBuf,
    pub media_dir: Option<PathBuf>,
    pub port: u16,
    pub search_url: String,
    pub search_timeout_sec: u64,
    pub playlist_timeout_sec: u64,
    pub audio_format: String,
    pub quality: String,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub media_dir: PathBuf,
    pub port: u16,
    pub search_url: String,
    pub search_timeout_sec: u64,
    pub playlist_timeout_sec: u64,
    pub scheduler: SchedulerSettings,
    pub import: ImportSettings,
}

impl AppConfig {
    pub fn resolve(cli: &CliConfig, file: Option<FileConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.db_dir.clone());
        if !db_dir.is_dir() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }

        let media_dir = file
            .media_dir
            .map(PathBuf::from)
            .or_else(|| cli.media_dir.clone())
            .unwrap_or_else(|| db_dir.clone());
        if !media_dir.is_dir() {
            bail!("Media directory does not exist: {:?}", media_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let search_url = file.search_url.unwrap_or_else(|| cli.search_url.clone());
        let search_timeout_sec = file.search_timeout_sec.unwrap_or(cli.search_timeout_sec);
        let playlist_timeout_sec = file
            .playlist_timeout_sec
            .unwrap_or(cli.playlist_timeout_sec);

        let mut scheduler = SchedulerSettings::new(media_dir.clone());
        scheduler.default_audio_format = file
            .audio_format
            .unwrap_or_else(|| cli.audio_format.clone())
            .to_lowercase();
        scheduler.default_quality = file.quality.unwrap_or_else(|| cli.quality.clone());
        if let Some(s) = &file.scheduler {
            if let Some(retention) = s.retention_secs {
                scheduler.retention_secs = retention;
            }
        }

        let mut import = ImportSettings::default();
        if let Some(i) = &file.import {
            if let Some(delay) = i.inter_track_delay_ms {
                import.inter_track_delay = Duration::from_millis(delay);
            }
            if let Some(timeout) = i.download_timeout_secs {
                import.download_timeout = Duration::from_secs(timeout);
            }
            if let Some(score) = i.accept_score {
                import.accept_score = score;
            }
            if let Some(score) = i.accept_score_verified {
                import.accept_score_verified = score;
            }
            if let Some(limit) = i.search_limit {
                import.search_limit = limit;
            }
        }

        Ok(AppConfig {
            db_dir,
            media_dir,
            port,
            search_url,
            search_timeout_sec,
            playlist_timeout_sec,
            scheduler,
            import,
        })
    }
}
