//! Playlist source catalog: Spotify public embed scraping.
//!
//! The embed endpoint serves server-rendered HTML containing a
//! `__NEXT_DATA__` JSON blob with the full track list (title, artists,
//! duration, URI) — no API key or authentication involved. Album data is not
//! present in the embed payload.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;

lazy_static! {
    static ref PLAYLIST_URL_RE: Regex =
        Regex::new(r"https?://open\.spotify\.com/playlist/([a-zA-Z0-9]+)").unwrap();
    static ref NEXT_DATA_RE: Regex =
        Regex::new(r#"(?s)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).unwrap();
}

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One track as described by the playlist source.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    /// Source catalog's track id, when the payload exposes one.
    pub external_id: Option<String>,
}

/// A fetched playlist: its display label and tracks in playlist order.
#[derive(Debug, Clone)]
pub struct FetchedPlaylist {
    pub label: String,
    pub tracks: Vec<PlaylistTrack>,
}

/// Access to the playlist source catalog.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch_playlist_tracks(&self, playlist_url: &str) -> Result<FetchedPlaylist>;
}

/// Whether the URL looks like a playlist this source can fetch.
pub fn is_playlist_source_url(url: &str) -> bool {
    PLAYLIST_URL_RE.is_match(url)
}

/// Client for the playlist source's public embed pages.
pub struct SpotifyEmbedClient {
    client: reqwest::Client,
}

impl SpotifyEmbedClient {
    pub fn new(timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    fn embed_url(playlist_url: &str) -> Result<String> {
        let playlist_id = PLAYLIST_URL_RE
            .captures(playlist_url)
            .map(|c| c[1].to_string())
            .ok_or_else(|| anyhow!("Invalid playlist URL: {}", playlist_url))?;
        Ok(format!(
            "https://open.spotify.com/embed/playlist/{}",
            playlist_id
        ))
    }
}

#[async_trait]
impl PlaylistSource for SpotifyEmbedClient {
    async fn fetch_playlist_tracks(&self, playlist_url: &str) -> Result<FetchedPlaylist> {
        let embed_url = Self::embed_url(playlist_url)?;

        let html = self
            .client
            .get(&embed_url)
            .send()
            .await
            .context("Failed to fetch playlist embed page")?
            .error_for_status()
            .context("Playlist embed page returned an error status")?
            .text()
            .await
            .context("Failed to read playlist embed page")?;

        parse_embed_page(&html)
    }
}

/// Extract label and tracks from the embed page HTML.
fn parse_embed_page(html: &str) -> Result<FetchedPlaylist> {
    let raw_json = NEXT_DATA_RE
        .captures(html)
        .map(|c| c[1].to_string())
        .ok_or_else(|| {
            anyhow!(
                "Could not parse playlist data. \
                 The playlist may be private or the page format has changed."
            )
        })?;

    let next_data: serde_json::Value =
        serde_json::from_str(&raw_json).context("Failed to parse playlist data blob")?;

    let entity = &next_data["props"]["pageProps"]["state"]["data"]["entity"];
    if entity.is_null() {
        bail!("Playlist data not found in source response");
    }

    let label = entity["name"]
        .as_str()
        .or_else(|| entity["title"].as_str())
        .unwrap_or("Unknown Playlist")
        .to_string();

    let track_list = entity["trackList"]
        .as_array()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("No tracks found in this playlist. It may be empty or private."))?;

    let tracks: Vec<PlaylistTrack> = track_list
        .iter()
        .filter_map(parse_track_entry)
        .collect();

    if tracks.is_empty() {
        bail!("Playlist contains no playable tracks");
    }

    Ok(FetchedPlaylist { label, tracks })
}

fn parse_track_entry(item: &serde_json::Value) -> Option<PlaylistTrack> {
    let title = item["title"].as_str()?.trim().to_string();
    if title.is_empty() {
        return None;
    }

    // The subtitle joins artists with comma + non-breaking space.
    let subtitle = item["subtitle"].as_str().unwrap_or("").replace('\u{00a0}', " ");
    let artists: Vec<String> = subtitle
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect();

    let external_id = item["uri"]
        .as_str()
        .and_then(|uri| uri.strip_prefix("spotify:track:"))
        .map(String::from);

    Some(PlaylistTrack {
        title,
        artists,
        album: None, // not present in embed payloads
        duration_ms: item["duration"].as_u64(),
        external_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embed_html(entity_json: &str) -> String {
        format!(
            r#"<html><body><script id="__NEXT_DATA__" type="application/json">{{"props":{{"pageProps":{{"state":{{"data":{{"entity":{}}}}}}}}}}}</script></body></html>"#,
            entity_json
        )
    }

    #[test]
    fn test_is_playlist_source_url() {
        assert!(is_playlist_source_url(
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"
        ));
        assert!(is_playlist_source_url(
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc"
        ));
        assert!(!is_playlist_source_url(
            "https://open.spotify.com/album/1234567890"
        ));
        assert!(!is_playlist_source_url("https://example.com/playlist/x"));
    }

    #[test]
    fn test_embed_url() {
        let url = SpotifyEmbedClient::embed_url(
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=xyz",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://open.spotify.com/embed/playlist/37i9dQZF1DXcBWIGoYBM5M"
        );

        assert!(SpotifyEmbedClient::embed_url("https://example.com/nope").is_err());
    }

    #[test]
    fn test_parse_embed_page() {
        let html = embed_html(
            r#"{
                "name": "Road Trip",
                "trackList": [
                    {
                        "title": "Tera Ban Jaunga",
                        "subtitle": "Akhil Sachdeva, Tulsi Kumar",
                        "uri": "spotify:track:abc123",
                        "duration": 221000
                    },
                    {
                        "title": "  ",
                        "subtitle": "Nobody",
                        "uri": "spotify:track:skipme"
                    }
                ]
            }"#,
        );

        let playlist = parse_embed_page(&html).unwrap();
        assert_eq!(playlist.label, "Road Trip");
        assert_eq!(playlist.tracks.len(), 1);

        let track = &playlist.tracks[0];
        assert_eq!(track.title, "Tera Ban Jaunga");
        assert_eq!(track.artists, vec!["Akhil Sachdeva", "Tulsi Kumar"]);
        assert_eq!(track.duration_ms, Some(221_000));
        assert_eq!(track.external_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_parse_embed_page_without_data_blob() {
        let err = parse_embed_page("<html><body>nothing here</body></html>").unwrap_err();
        assert!(err.to_string().contains("Could not parse playlist data"));
    }

    #[test]
    fn test_parse_embed_page_empty_track_list() {
        let html = embed_html(r#"{"name": "Empty", "trackList": []}"#);
        assert!(parse_embed_page(&html).is_err());
    }
}
