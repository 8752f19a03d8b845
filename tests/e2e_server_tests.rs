//! End-to-end tests: real axum server over real SQLite stores, with fake
//! external collaborators (downloader, search, playlist source).

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use tunevault_server::catalog::{
    FetchedPlaylist, PlaylistSource, PlaylistTrack, SearchKind, SearchProvider,
};
use tunevault_server::downloader::{
    DownloadError, DownloadSpec, DownloadedTrack, Downloader, ProgressCallback,
};
use tunevault_server::import::{ImportOrchestrator, ImportSettings, SqliteImportStore};
use tunevault_server::library::{DuplicateIndex, SqliteLibraryStore};
use tunevault_server::matching::MatchCandidate;
use tunevault_server::scheduler::{DownloadScheduler, SchedulerSettings};
use tunevault_server::server::{make_router, ServerState};

struct FakeDownloader;

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        spec: &DownloadSpec,
        _on_progress: ProgressCallback,
    ) -> Result<DownloadedTrack, DownloadError> {
        let title = spec.url.rsplit('=').next().unwrap_or("track").to_string();
        let filename = format!("{}.m4a", title);
        std::fs::write(spec.output_dir.join(&filename), b"audio").unwrap();
        Ok(DownloadedTrack {
            filename,
            title,
            artist: Some("E2E Artist".to_string()),
            duration_seconds: Some(180),
            file_size: Some(5),
        })
    }
}

struct FakePlaylistSource;

#[async_trait]
impl PlaylistSource for FakePlaylistSource {
    async fn fetch_playlist_tracks(&self, _url: &str) -> anyhow::Result<FetchedPlaylist> {
        Ok(FetchedPlaylist {
            label: "E2E Playlist".to_string(),
            tracks: vec![
                PlaylistTrack {
                    title: "Known Song".to_string(),
                    artists: vec!["Known Artist".to_string()],
                    album: None,
                    duration_ms: Some(180_000),
                    external_id: Some("sp1".to_string()),
                },
                PlaylistTrack {
                    title: "Unknown Song".to_string(),
                    artists: vec!["Nobody".to_string()],
                    album: None,
                    duration_ms: Some(200_000),
                    external_id: None,
                },
            ],
        })
    }
}

struct FakeSearchProvider;

#[async_trait]
impl SearchProvider for FakeSearchProvider {
    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        _limit: usize,
    ) -> anyhow::Result<Vec<MatchCandidate>> {
        if kind == SearchKind::Songs && query.starts_with("Known Song") {
            return Ok(vec![MatchCandidate {
                catalog_id: "knownvid123".to_string(),
                url: "https://music.youtube.com/watch?v=knownvid123".to_string(),
                title: "Known Song".to_string(),
                artists: vec!["Known Artist".to_string()],
                duration_seconds: Some(180),
                album: None,
                verified: true,
            }]);
        }
        Ok(Vec::new())
    }
}

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    _db_dir: TempDir,
    _media_dir: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn start_server() -> TestServer {
    let db_dir = TempDir::new().unwrap();
    let media_dir = TempDir::new().unwrap();

    let library = Arc::new(SqliteLibraryStore::new(db_dir.path().join("library.db")).unwrap());
    let import_store =
        Arc::new(SqliteImportStore::new(db_dir.path().join("imports.db")).unwrap());
    let duplicate_index = Arc::new(DuplicateIndex::new(
        library.clone(),
        media_dir.path().to_path_buf(),
    ));

    let scheduler = DownloadScheduler::new(
        Arc::new(FakeDownloader),
        library.clone(),
        duplicate_index.clone(),
        SchedulerSettings::new(media_dir.path().to_path_buf()),
    );

    let orchestrator = ImportOrchestrator::new(
        import_store,
        Arc::new(FakePlaylistSource),
        Arc::new(FakeSearchProvider),
        duplicate_index,
        scheduler.clone(),
        ImportSettings {
            inter_track_delay: Duration::from_millis(1),
            download_timeout: Duration::from_secs(5),
            ..ImportSettings::default()
        },
    );

    let app = make_router(ServerState {
        scheduler,
        orchestrator,
        library,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        client: reqwest::Client::new(),
        _db_dir: db_dir,
        _media_dir: media_dir,
    }
}

async fn get_json(server: &TestServer, path: &str) -> serde_json::Value {
    server
        .client
        .get(server.url(path))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let server = start_server().await;
    let body = get_json(&server, "/health").await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_enqueue_download_validation() {
    let server = start_server().await;

    let response = server
        .client
        .post(server.url("/api/queue"))
        .json(&serde_json::json!({
            "url": "https://example.com/not-a-catalog-url",
            "title": "Nope"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .client
        .post(server.url("/api/queue"))
        .json(&serde_json::json!({
            "url": "https://www.youtube.com/playlist?list=PL123456",
            "title": "A playlist"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_enqueue_download_and_observe_completion() {
    let server = start_server().await;

    let response = server
        .client
        .post(server.url("/api/queue"))
        .json(&serde_json::json!({
            "url": "https://www.youtube.com/watch?v=directvid00",
            "title": "Direct Download",
            "artist": "Someone"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let receipt: serde_json::Value = response.json().await.unwrap();
    let job_id = receipt["job_id"].as_str().unwrap().to_string();
    assert_eq!(receipt["position"], 1);

    // Poll the job record until it goes terminal
    let mut completed = false;
    for _ in 0..200 {
        let response = server
            .client
            .get(server.url(&format!("/api/queue/{}", job_id)))
            .send()
            .await
            .unwrap();
        if response.status() == 200 {
            let record: serde_json::Value = response.json().await.unwrap();
            if record["status"] == "completed" {
                assert_eq!(record["filename"], "directvid00.m4a");
                completed = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(completed, "download job never completed");

    let library = get_json(&server, "/api/library").await;
    let tracks = library["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0]["filename"], "directvid00.m4a");
    assert_eq!(tracks[0]["catalog_id"], "directvid00");

    // Nothing queued anymore, so cancel misses
    let response = server
        .client
        .delete(server.url(&format!("/api/queue/{}", job_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_import_flow_over_http() {
    let server = start_server().await;

    // Bad URL rejected synchronously, no job created
    let response = server
        .client
        .post(server.url("/api/imports"))
        .json(&serde_json::json!({ "playlist_url": "https://example.com/x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .client
        .post(server.url("/api/imports"))
        .json(&serde_json::json!({
            "playlist_url": "https://open.spotify.com/playlist/e2eplaylist1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    let job_id = body["job"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["job"]["status"], "pending");

    // Poll until the job completes
    let mut finished = serde_json::Value::Null;
    for _ in 0..500 {
        let body = get_json(&server, &format!("/api/imports/{}", job_id)).await;
        if body["job"]["status"] == "completed" || body["job"]["status"] == "failed" {
            finished = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(finished["job"]["status"], "completed");
    assert_eq!(finished["job"]["label"], "E2E Playlist");
    assert_eq!(finished["job"]["total_tracks"], 2);
    assert_eq!(finished["job"]["downloaded"], 1);
    assert_eq!(finished["job"]["skipped"], 1);
    assert_eq!(finished["job"]["failed"], 0);
    assert_eq!(finished["job"]["progress_percent"], 100.0);

    let tracks = finished["tracks"].as_array().unwrap();
    assert_eq!(tracks[0]["status"], "downloaded");
    assert_eq!(tracks[0]["matched_catalog_id"], "knownvid123");
    assert_eq!(tracks[1]["status"], "skipped");
    assert_eq!(tracks[1]["reason"], "No confident match found");

    // Job list shows it
    let listing = get_json(&server, "/api/imports").await;
    assert_eq!(listing["jobs"].as_array().unwrap().len(), 1);

    // A completed job cannot be resumed
    let response = server
        .client
        .post(server.url(&format!("/api/imports/{}/resume", job_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Unknown job id is a 404
    let response = server
        .client
        .get(server.url("/api/imports/no-such-job"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
