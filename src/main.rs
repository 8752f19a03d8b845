use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunevault_server::catalog::{HttpSearchClient, SpotifyEmbedClient};
use tunevault_server::config::{AppConfig, CliConfig, FileConfig};
use tunevault_server::downloader::YtDlpDownloader;
use tunevault_server::import::{ImportOrchestrator, SqliteImportStore};
use tunevault_server::library::{DuplicateIndex, SqliteLibraryStore};
use tunevault_server::scheduler::DownloadScheduler;
use tunevault_server::server::{run_server, ServerState};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite database files.
    #[clap(value_parser = parse_path)]
    pub db_dir: PathBuf,

    /// Directory downloaded audio files are written to. Defaults to db_dir.
    #[clap(long, value_parser = parse_path)]
    pub media_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3300)]
    pub port: u16,

    /// Base URL of the companion search service.
    #[clap(long, default_value = "http://localhost:8090")]
    pub search_url: String,

    /// Timeout in seconds for search requests.
    #[clap(long, default_value_t = 20)]
    pub search_timeout_sec: u64,

    /// Timeout in seconds for playlist source requests.
    #[clap(long, default_value_t = 20)]
    pub playlist_timeout_sec: u64,

    /// Default audio format for downloads.
    #[clap(long, default_value = "m4a")]
    pub audio_format: String,

    /// Default audio quality in kbps.
    #[clap(long, default_value = "320")]
    pub quality: String,

    /// Optional TOML config file; its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(
        &CliConfig {
            db_dir: cli_args.db_dir,
            media_dir: cli_args.media_dir,
            port: cli_args.port,
            search_url: cli_args.search_url,
            search_timeout_sec: cli_args.search_timeout_sec,
            playlist_timeout_sec: cli_args.playlist_timeout_sec,
            audio_format: cli_args.audio_format,
            quality: cli_args.quality,
        },
        file_config,
    )?;

    info!("Opening library database in {:?}...", config.db_dir);
    let library = Arc::new(SqliteLibraryStore::new(config.db_dir.join("library.db"))?);
    let import_store = Arc::new(SqliteImportStore::new(config.db_dir.join("imports.db"))?);

    let duplicate_index = Arc::new(DuplicateIndex::new(
        library.clone(),
        config.media_dir.clone(),
    ));

    let scheduler = DownloadScheduler::new(
        Arc::new(YtDlpDownloader::new()),
        library.clone(),
        duplicate_index.clone(),
        config.scheduler.clone(),
    );

    info!("Search service configured at {}", config.search_url);
    let search = Arc::new(HttpSearchClient::new(
        config.search_url.clone(),
        config.search_timeout_sec,
    ));
    let playlist_source = Arc::new(SpotifyEmbedClient::new(config.playlist_timeout_sec));

    let orchestrator = ImportOrchestrator::new(
        import_store,
        playlist_source,
        search,
        duplicate_index,
        scheduler.clone(),
        config.import.clone(),
    );

    // Pick up imports a previous process left mid-flight
    match orchestrator.resume_interrupted() {
        Ok(0) => {}
        Ok(count) => info!("Resumed {} interrupted import job(s)", count),
        Err(e) => warn!("Failed to resume interrupted imports: {:#}", e),
    }

    info!("Ready to serve at port {}!", config.port);
    run_server(
        ServerState {
            scheduler,
            orchestrator,
            library,
        },
        config.port,
    )
    .await
}
