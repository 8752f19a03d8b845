//! Search client for the match-target catalog.
//!
//! Talks to a companion search service over HTTP; the service fronts the
//! actual music-video catalog and returns candidate lists in a stable JSON
//! shape. Song-kind results are flagged as verified, video-kind results are
//! not — the scorer's acceptance policy treats them differently.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::matching::MatchCandidate;

/// Which slice of the catalog to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// Canonical song entries, curated by the catalog.
    Songs,
    /// Plain video uploads; noisier titles, useful as a fallback.
    Videos,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Songs => "songs",
            SearchKind::Videos => "videos",
        }
    }
}

/// Search access to the target catalog.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: usize,
    ) -> Result<Vec<MatchCandidate>>;
}

/// One result row from the search service.
#[derive(Debug, Deserialize)]
struct SearchResultRow {
    id: String,
    title: String,
    #[serde(default)]
    artists: Vec<String>,
    duration_seconds: Option<u32>,
    album: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResultRow>,
}

/// HTTP client for the companion search service.
pub struct HttpSearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchClient {
    /// # Arguments
    /// * `base_url` - Base URL of the search service (e.g. "http://localhost:8090")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url.trim_end_matches('/').to_string();

        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn watch_url(kind: SearchKind, id: &str) -> String {
        match kind {
            SearchKind::Songs => format!("https://music.youtube.com/watch?v={}", id),
            SearchKind::Videos => format!("https://www.youtube.com/watch?v={}", id),
        }
    }
}

#[async_trait]
impl SearchProvider for HttpSearchClient {
    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: usize,
    ) -> Result<Vec<MatchCandidate>> {
        let url = format!(
            "{}/search?q={}&kind={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            kind.as_str(),
            limit
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach search service")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Search for '{}' failed with status {}",
                query,
                response.status()
            );
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        let candidates = body
            .results
            .into_iter()
            .filter(|row| !row.id.is_empty())
            .map(|row| MatchCandidate {
                url: Self::watch_url(kind, &row.id),
                catalog_id: row.id,
                title: row.title,
                artists: row.artists,
                duration_seconds: row.duration_seconds,
                album: row.album,
                verified: kind == SearchKind::Songs,
            })
            .collect();

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_removal() {
        let client = HttpSearchClient::new("http://localhost:8090/".to_string(), 20);
        assert_eq!(client.base_url(), "http://localhost:8090");
    }

    #[test]
    fn test_watch_url_per_kind() {
        assert_eq!(
            HttpSearchClient::watch_url(SearchKind::Songs, "abc"),
            "https://music.youtube.com/watch?v=abc"
        );
        assert_eq!(
            HttpSearchClient::watch_url(SearchKind::Videos, "abc"),
            "https://www.youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{
            "results": [
                {
                    "id": "vid1",
                    "title": "Tera Ban Jaunga (Lyrics)",
                    "artists": ["Akhil Sachdeva", "Tulsi Kumar"],
                    "duration_seconds": 221,
                    "album": "Kabir Singh"
                },
                {"id": "", "title": "dropped", "artists": []}
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].id, "vid1");
        assert_eq!(parsed.results[0].artists.len(), 2);
        assert_eq!(parsed.results[0].duration_seconds, Some(221));
    }
}
