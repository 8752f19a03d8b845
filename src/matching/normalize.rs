//! Text normalization for cross-catalog track comparison.
//!
//! Catalog titles are noisy: "(Official Video)" suffixes, "feat." clauses,
//! accents, punctuation. Everything that compares titles or artists first
//! runs them through these helpers so that the comparison sees only the
//! meaningful part.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Decorations commonly appended by video catalogs, e.g. "(Official Video)",
    /// "[Lyrics]", "(HD)". Only known-noise annotations; "(Live)" etc. are kept
    /// because they change what the recording *is*.
    static ref NOISE_RE: Regex = Regex::new(
        r"(?i)\s*[(\[{](?:official\s*(?:music\s*)?(?:video|audio|lyrics?|visuali[sz]er)|lyrics?|audio|video|hd|hq|4k|remastered\s*\d*|official\s*(?:hd\s*)?video)[)\]}]\s*",
    )
    .unwrap();

    /// "feat." / "ft." / "featuring" clause, optionally opening a bracket.
    static ref FEAT_RE: Regex =
        Regex::new(r"(?i)\s*[(\[]?\s*(?:feat\.?|ft\.?|featuring)\s+").unwrap();

    /// Any bracketed or parenthesized segment, regardless of content.
    static ref BRACKETED_RE: Regex = Regex::new(r"\s*[(\[{][^)\]}]*[)\]}]\s*").unwrap();
}

/// Remove known noise annotations ("(Official Video)", "[Audio]", ...) from a title.
pub fn strip_noise(title: &str) -> String {
    NOISE_RE.replace_all(title, " ").trim().to_string()
}

/// Remove every bracketed segment from a title, whatever it contains.
pub fn strip_bracketed(title: &str) -> String {
    BRACKETED_RE.replace_all(title, " ").trim().to_string()
}

/// Split at the first "feat." / "ft." clause and return the base part.
pub fn strip_feat(text: &str) -> String {
    match FEAT_RE.find(text) {
        Some(m) => text[..m.start()].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Normalize text for fuzzy comparison: lowercase, fold common accents,
/// drop punctuation, collapse whitespace runs into single hyphens.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars() {
        for folded in fold_char(c) {
            if folded.is_ascii_alphanumeric() {
                if pending_separator && !out.is_empty() {
                    out.push('-');
                }
                pending_separator = false;
                out.push(folded.to_ascii_lowercase());
            } else if folded.is_whitespace() || folded == '-' || folded == '_' {
                pending_separator = true;
            }
            // Remaining punctuation is dropped without acting as a separator.
        }
    }

    out
}

/// Fold a character to its unaccented ASCII base form(s). Covers the Latin-1
/// range plus a few common extras; anything else passes through unchanged.
fn fold_char(c: char) -> impl Iterator<Item = char> {
    let folded: &[char] = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => &['a'],
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => &['e'],
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => &['i'],
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => &['o'],
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => &['u'],
        'ý' | 'ÿ' | 'Ý' => &['y'],
        'ñ' | 'Ñ' => &['n'],
        'ç' | 'Ç' => &['c'],
        'ß' => &['s', 's'],
        'æ' | 'Æ' => &['a', 'e'],
        'œ' | 'Œ' => &['o', 'e'],
        '\u{00a0}' => &[' '],
        _ => return FoldIter::Single(Some(c)),
    };
    FoldIter::Slice(folded.iter())
}

enum FoldIter<'a> {
    Single(Option<char>),
    Slice(std::slice::Iter<'a, char>),
}

impl Iterator for FoldIter<'_> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        match self {
            FoldIter::Single(c) => c.take(),
            FoldIter::Slice(iter) => iter.next().copied(),
        }
    }
}

/// Full comparison key for a title: feat clause off, noise off, slugified.
pub fn title_compare_key(title: &str) -> String {
    slugify(&strip_noise(&strip_feat(title)))
}

/// Comparison key used by the duplicate index: every bracketed segment is
/// stripped, not just known noise, since library filenames rarely keep them.
pub fn dedup_title_key(title: &str) -> String {
    slugify(&strip_bracketed(&strip_feat(title)))
}

/// Comparison key for an artist name.
pub fn artist_compare_key(artist: &str) -> String {
    slugify(&strip_feat(artist))
}
