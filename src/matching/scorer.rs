//! Candidate scoring for cross-catalog track matching.
//!
//! Given a source track (title, artists, duration) and search candidates from
//! another catalog, produces a 0-100 confidence score per candidate or rejects
//! it outright. The thresholds are empirically tuned; treat them as behavior,
//! not as knobs to improve.

use serde::{Deserialize, Serialize};

use super::fuzzy::similarity_ratio;
use super::normalize::{artist_compare_key, slugify, title_compare_key};

/// Candidate titles scoring below this (after penalties) are rejected.
pub const TITLE_SCORE_FLOOR: f64 = 60.0;
/// Candidates with a known artist score below this are rejected.
pub const ARTIST_SCORE_FLOOR: f64 = 70.0;
/// Candidates with a known duration score below this are rejected.
pub const DURATION_SCORE_FLOOR: f64 = 25.0;
/// A duration score below this marks the duration as "weak".
pub const WEAK_DURATION_SCORE: f64 = 50.0;
/// A weak duration combined with an average below this rejects the candidate.
pub const WEAK_COMBINED_FLOOR: f64 = 75.0;
/// Title/artist averages above this skip the duration blend entirely.
pub const DURATION_BLEND_CEILING: f64 = 85.0;
/// Penalty per denylisted word present only in the candidate title.
pub const DENYLIST_PENALTY: f64 = 15.0;
/// Decay rate of the duration score per second of difference.
pub const DURATION_DECAY: f64 = 0.1;
/// Artist score floor granted when a source artist appears verbatim inside
/// the candidate's joined artist string.
pub const ARTIST_SUBSTRING_FLOOR: f64 = 80.0;
/// Fuzzy ratio at which a secondary source artist counts as covered.
pub const ARTIST_COVERAGE_RATIO: f64 = 70.0;

/// Sentinel for "no artist data on one side, do not penalize".
const UNKNOWN: f64 = -1.0;

/// Words that change what a recording is. A candidate title carrying one of
/// these when the source title does not is penalized per occurrence.
pub const TITLE_DENYLIST: &[&str] = &[
    "bassboosted",
    "remix",
    "remastered",
    "remaster",
    "reverb",
    "bassboost",
    "live",
    "acoustic",
    "8daudio",
    "concert",
    "acapella",
    "slowed",
    "instrumental",
    "cover",
    "karaoke",
    "nightcore",
    "spedup",
];

/// A track as described by the source catalog (the one being imported from).
#[derive(Debug, Clone, Default)]
pub struct SourceTrack {
    pub title: String,
    pub artists: Vec<String>,
    /// Duration in seconds; `None` or zero means unknown.
    pub duration_seconds: Option<u32>,
    pub album: Option<String>,
}

impl SourceTrack {
    /// Primary artist, if any. Used to build search queries.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }
}

/// A search result from the target catalog, as fed to the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// External catalog id of the candidate (e.g. a video id).
    pub catalog_id: String,
    /// Watch/download URL for the candidate.
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    /// Duration in seconds; `None` or zero means unknown.
    pub duration_seconds: Option<u32>,
    pub album: Option<String>,
    /// Whether the catalog itself flags this as a canonical song entry.
    #[serde(default)]
    pub verified: bool,
}

impl MatchCandidate {
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    pub fn joined_artists(&self) -> String {
        self.artists.join(", ")
    }
}

/// A candidate that survived scoring, with its confidence attached.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub candidate: MatchCandidate,
    pub score: f64,
}

fn known_duration(duration: Option<u32>) -> Option<f64> {
    duration.filter(|d| *d > 0).map(f64::from)
}

/// Fuzzy title similarity after normalization, before penalties.
pub fn title_score(source_title: &str, candidate_title: &str) -> f64 {
    let source_key = title_compare_key(source_title);
    let candidate_key = title_compare_key(candidate_title);
    if source_key.is_empty() || candidate_key.is_empty() {
        return 0.0;
    }
    similarity_ratio(&source_key, &candidate_key)
}

/// Denylisted words present in the candidate title but absent from the source.
pub fn denylisted_words(source_title: &str, candidate_title: &str) -> Vec<&'static str> {
    let source_slug = slugify(source_title);
    let candidate_slug = slugify(candidate_title);
    TITLE_DENYLIST
        .iter()
        .filter(|w| candidate_slug.contains(*w) && !source_slug.contains(*w))
        .copied()
        .collect()
}

/// Artist similarity between the two catalogs, or the unknown sentinel when
/// either side has no artist data.
///
/// Catalogs disagree on ordering: one may list the composer first while the
/// other leads with the performer. The score therefore takes the best of
/// several views: any source artist vs the candidate's primary, a substring
/// floor over the joined candidate artists, and the best cross pair; with
/// several source artists the result is blended with how many of them appear
/// in the candidate at all.
pub fn artist_score(source_artists: &[String], candidate_artists: &[String]) -> f64 {
    let source_keys: Vec<String> = source_artists
        .iter()
        .map(|a| artist_compare_key(a))
        .filter(|k| !k.is_empty())
        .collect();
    let candidate_keys: Vec<String> = candidate_artists
        .iter()
        .map(|a| artist_compare_key(a))
        .filter(|k| !k.is_empty())
        .collect();

    if source_keys.is_empty() || candidate_keys.is_empty() {
        return UNKNOWN;
    }

    let candidate_primary = &candidate_keys[0];
    let mut best = source_keys
        .iter()
        .map(|s| similarity_ratio(s, candidate_primary))
        .fold(0.0, f64::max);

    let joined = candidate_keys.join(" ");
    if best < ARTIST_SUBSTRING_FLOOR && source_keys.iter().any(|s| joined.contains(s.as_str())) {
        best = ARTIST_SUBSTRING_FLOOR;
    }

    let cross_best = source_keys
        .iter()
        .flat_map(|s| candidate_keys.iter().map(move |c| similarity_ratio(s, c)))
        .fold(0.0, f64::max);
    best = best.max(cross_best);

    if source_keys.len() <= 1 {
        return best;
    }

    let covered = source_keys
        .iter()
        .filter(|s| {
            joined.contains(s.as_str())
                || candidate_keys
                    .iter()
                    .any(|c| similarity_ratio(s, c) >= ARTIST_COVERAGE_RATIO)
        })
        .count();
    let coverage = covered as f64 / source_keys.len() as f64 * 100.0;

    best.max((best + coverage) / 2.0)
}

/// Exponential-decay duration score: `exp(-0.1 * |diff|) * 100`.
pub fn duration_score(source_seconds: f64, candidate_seconds: f64) -> f64 {
    (-DURATION_DECAY * (source_seconds - candidate_seconds).abs()).exp() * 100.0
}

/// Score one candidate against the source track.
///
/// Returns `None` when the candidate is hard-rejected, otherwise a score in
/// `[0, 100]`. Missing artist or duration data on either side drops that
/// signal from the blend instead of penalizing it.
pub fn score_candidate(source: &SourceTrack, candidate: &MatchCandidate) -> Option<f64> {
    let mut title = title_score(&source.title, &candidate.title);

    let denylisted = denylisted_words(&source.title, &candidate.title);
    title -= DENYLIST_PENALTY * denylisted.len() as f64;

    if title < TITLE_SCORE_FLOOR {
        return None;
    }

    let artist = artist_score(&source.artists, &candidate.artists);
    let has_artist = artist >= 0.0;
    if has_artist && artist < ARTIST_SCORE_FLOOR {
        return None;
    }

    let duration = match (
        known_duration(source.duration_seconds),
        known_duration(candidate.duration_seconds),
    ) {
        (Some(s), Some(c)) => Some(duration_score(s, c)),
        _ => None,
    };
    if let Some(d) = duration {
        if d < DURATION_SCORE_FLOOR {
            return None;
        }
    }

    let combined = match (has_artist, duration) {
        (true, Some(d)) => {
            let average = (title + artist) / 2.0;
            if average <= DURATION_BLEND_CEILING {
                (average + d) / 2.0
            } else {
                average
            }
        }
        (true, None) => (title + artist) / 2.0,
        (false, Some(d)) => (title + d) / 2.0,
        (false, None) => title,
    };

    if let Some(d) = duration {
        if d < WEAK_DURATION_SCORE && combined < WEAK_COMBINED_FLOOR {
            return None;
        }
    }

    Some(combined.min(100.0))
}

/// Score every candidate and return the best survivor, if any.
///
/// Candidates sharing a catalog id are evaluated once; the first occurrence
/// wins (earlier search passes are more trusted).
pub fn pick_best(source: &SourceTrack, candidates: &[MatchCandidate]) -> Option<ScoredMatch> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut best: Option<ScoredMatch> = None;

    for candidate in candidates {
        if !seen_ids.insert(candidate.catalog_id.clone()) {
            continue;
        }

        if let Some(score) = score_candidate(source, candidate) {
            let better = best.as_ref().map_or(true, |b| score > b.score);
            if better {
                best = Some(ScoredMatch {
                    candidate: candidate.clone(),
                    score,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, artists: &[&str], duration: Option<u32>) -> SourceTrack {
        SourceTrack {
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            duration_seconds: duration,
            album: None,
        }
    }

    fn candidate(title: &str, artists: &[&str], duration: Option<u32>) -> MatchCandidate {
        MatchCandidate {
            catalog_id: format!("id-{}", title.len()),
            url: "https://example.com/watch".to_string(),
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            duration_seconds: duration,
            album: None,
            verified: false,
        }
    }

    #[test]
    fn test_exact_match_scores_full() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let cand = candidate("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let score = score_candidate(&src, &cand).unwrap();
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_lyrics_annotation_is_noise() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let cand = candidate("Tera Ban Jaunga (Lyrics)", &["Akhil Sachdeva"], Some(220));
        let score = score_candidate(&src, &cand).unwrap();
        assert!(score >= 80.0, "lyrics candidate scored {}", score);
    }

    #[test]
    fn test_live_variant_is_rejected() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let lyrics = candidate("Tera Ban Jaunga (Lyrics)", &["Akhil Sachdeva"], Some(220));
        let live = candidate("Tera Ban Jaunga (Live)", &["Akhil Sachdeva"], Some(220));

        let lyrics_score = score_candidate(&src, &lyrics).unwrap();
        match score_candidate(&src, &live) {
            None => {}
            Some(live_score) => {
                assert!(
                    lyrics_score - live_score >= DENYLIST_PENALTY,
                    "live {} vs lyrics {}",
                    live_score,
                    lyrics_score
                );
            }
        }
    }

    #[test]
    fn test_wrong_artist_is_rejected() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let cand = candidate("Tera Ban Jaunga", &["Somebody Else Entirely"], Some(220));
        assert!(score_candidate(&src, &cand).is_none());
    }

    #[test]
    fn test_unknown_artist_is_not_penalized() {
        let src = source("Tera Ban Jaunga", &[], Some(220));
        let cand = candidate("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let score = score_candidate(&src, &cand).unwrap();
        assert!(score >= 80.0);
    }

    #[test]
    fn test_unknown_duration_is_not_penalized() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], None);
        let cand = candidate("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let score = score_candidate(&src, &cand).unwrap();
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_way_off_duration_is_rejected() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        // 15s off -> duration score exp(-1.5)*100 = 22.3 < 25
        let cand = candidate("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(235));
        assert!(score_candidate(&src, &cand).is_none());
    }

    #[test]
    fn test_duration_score_decay() {
        assert!((duration_score(200.0, 200.0) - 100.0).abs() < 1e-9);
        assert!((duration_score(200.0, 203.0) - 74.08).abs() < 0.01);
        assert!(duration_score(200.0, 214.0) < 25.0);
    }

    #[test]
    fn test_composer_first_ordering() {
        // Source lists composer first, candidate leads with the performer.
        let score = artist_score(
            &["Pritam".to_string(), "Arijit Singh".to_string()],
            &["Arijit Singh".to_string()],
        );
        assert!(score >= ARTIST_SCORE_FLOOR, "artist score {}", score);
    }

    #[test]
    fn test_artist_unknown_sentinel() {
        assert_eq!(artist_score(&[], &["Someone".to_string()]), -1.0);
        assert_eq!(artist_score(&["Someone".to_string()], &[]), -1.0);
    }

    #[test]
    fn test_pick_best_empty_candidates() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        assert!(pick_best(&src, &[]).is_none());
    }

    #[test]
    fn test_pick_best_all_below_title_floor() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let candidates = vec![
            candidate("Completely Different Song", &["Akhil Sachdeva"], Some(220)),
            candidate("Another Unrelated Thing", &["Akhil Sachdeva"], Some(220)),
        ];
        assert!(pick_best(&src, &candidates).is_none());
    }

    #[test]
    fn test_pick_best_dedups_by_id() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let mut first = candidate("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        first.catalog_id = "same".to_string();
        let mut second = candidate("Tera Ban Jaunga (Lyrics)", &["Akhil Sachdeva"], Some(220));
        second.catalog_id = "same".to_string();

        let best = pick_best(&src, &[first, second]).unwrap();
        assert_eq!(best.candidate.title, "Tera Ban Jaunga");
    }

    #[test]
    fn test_pick_best_prefers_higher_score() {
        let src = source("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let close = candidate("Tera Ban Jaungaa", &["Akhil Sachdeva"], Some(220));
        let exact = candidate("Tera Ban Jaunga", &["Akhil Sachdeva"], Some(220));
        let best = pick_best(&src, &[close, exact]).unwrap();
        assert_eq!(best.candidate.title, "Tera Ban Jaunga");
        assert!((best.score - 100.0).abs() < 1e-9);
    }
}
