//! Cross-catalog track matching.
//!
//! Pure scoring logic: text normalization, fuzzy similarity, and the
//! candidate scorer that ranks search results from one catalog against a
//! track described by another. No I/O happens here; acceptance policy
//! (which scores are good enough to act on) belongs to the caller.

mod fuzzy;
mod normalize;
mod scorer;

pub use fuzzy::{levenshtein_distance, similarity_ratio};
pub use normalize::{
    artist_compare_key, dedup_title_key, slugify, strip_bracketed, strip_feat, strip_noise,
    title_compare_key,
};
pub use scorer::{
    artist_score, denylisted_words, duration_score, pick_best, score_candidate, title_score,
    MatchCandidate, ScoredMatch, SourceTrack, ARTIST_SCORE_FLOOR, DENYLIST_PENALTY,
    DURATION_SCORE_FLOOR, TITLE_DENYLIST, TITLE_SCORE_FLOOR,
};
