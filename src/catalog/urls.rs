//! URL validation for the video catalog.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WATCH_URL_RES: Vec<Regex> = vec![
        Regex::new(r"^https?://(www\.)?youtube\.com/watch\?v=[\w-]+").unwrap(),
        Regex::new(r"^https?://(www\.)?youtube\.com/playlist\?list=[\w-]+").unwrap(),
        Regex::new(r"^https?://youtu\.be/[\w-]+").unwrap(),
        Regex::new(r"^https?://music\.youtube\.com/watch\?v=[\w-]+").unwrap(),
        Regex::new(r"^https?://music\.youtube\.com/playlist\?list=[\w-]+").unwrap(),
    ];
    static ref PLAYLIST_RE: Regex = Regex::new(r"[?&]list=[\w-]+").unwrap();
    static ref VIDEO_ID_RES: Vec<Regex> = vec![
        Regex::new(r"(?:v=|/)([a-zA-Z0-9_-]{11})(?:[&?]|$)").unwrap(),
        Regex::new(r"youtu\.be/([a-zA-Z0-9_-]{11})").unwrap(),
    ];
}

/// Whether the URL points at the supported video catalog.
pub fn is_supported_url(url: &str) -> bool {
    let url = url.trim();
    WATCH_URL_RES.iter().any(|re| re.is_match(url))
}

/// Whether the URL refers to a playlist rather than a single item.
pub fn is_playlist_url(url: &str) -> bool {
    PLAYLIST_RE.is_match(url.trim())
}

/// Extract the 11-character video id from a watch URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RES
        .iter()
        .find_map(|re| re.captures(url))
        .map(|c| c[1].to_string())
}
