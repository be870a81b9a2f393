//! Soundtrack album matching
//!
//! Album candidates found by searching the movie's name are filtered and
//! scored against the movie:
//!
//! 1. **Artist:** with a known composer, some album artist must be a fuzzy
//!    match (ratio above 85) or exactly "Various Artists"
//! 2. **Year:** with a known year, the release date must mention the year or
//!    one of its neighbours
//! 3. **Title:** keywords absent from the movie name are stripped from the
//!    album title; the cleaned title must contain the movie's longest word.
//!    Score is `1.1^positive * 0.9^negative * ratio(movie, cleaned title)`.
//!
//! The highest score wins; the first candidate wins a tie.

use super::spotify::SpotifyApi;
use super::by_slot;
use crate::error::EnrichResult;
use crate::mapper::AlbumCandidate;
use crate::model::{AlbumMatch, Enrichment, InputRecord};
use crate::runner::StageResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const POSITIVE_KEYWORDS: [&str; 13] = [
    "original", "motion", "picture", "soundtrack", "music", "band", "score", "theme", "ost", "ost.",
    "album", "composed", "conducted",
];

pub const NEGATIVE_KEYWORDS: [&str; 13] = [
    "game", "video", "television", "series", "show", "episode", "season", "episode", "seasons",
    "remastered", "remaster", "live", "bonus",
];

pub const NEUTRAL_KEYWORDS: [&str; 24] = [
    "the", "of", "from", "in", "on", "at", "for", "a", "an", "and", "or", "with", "by", "to",
    "version", "vol", "vol.", "pt", "pt.", "part", "part.", "ver", "ver.", "&",
];

pub const POSITIVE_INFLUENCE: f64 = 1.1;
pub const NEGATIVE_INFLUENCE: f64 = 0.9;

/// Fuzzy ratio a composer/album artist pair must exceed
pub const ARTIST_MATCH_THRESHOLD: f64 = 85.0;

pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// Passthrough column holding the movie's composer name
pub const DEFAULT_COMPOSER_COLUMN: &str = "composer_name";

/// Indel similarity on a 0-100 scale: `200 * LCS / (len(a) + len(b))`,
/// counted in chars. Two empty strings are identical.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Length of the longest common subsequence, one DP row at a time
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diagonal + 1 } else { above.max(row[j]) };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Count keywords found among the album words, and list the keywords that
/// may be stripped (those not part of the movie name)
fn keyword_hits(movie_words: &[&str], album_words: &[&str], keywords: &[&'static str]) -> (i32, Vec<&'static str>) {
    let removable: Vec<&'static str> = keywords
        .iter()
        .copied()
        .filter(|k| !movie_words.iter().any(|w| w == k))
        .collect();
    let count = removable
        .iter()
        .filter(|k| album_words.iter().any(|w| *w == **k))
        .count() as i32;
    (count, removable)
}

/// First of the longest words
fn longest_word<'w>(words: &[&'w str]) -> Option<&'w str> {
    words
        .iter()
        .copied()
        .reduce(|best, w| if w.chars().count() > best.chars().count() { w } else { best })
}

/// Score one candidate; `None` when a filter rejects it
pub fn score_album(
    candidate: &AlbumCandidate,
    movie_name: &str,
    year: Option<i32>,
    composer: Option<&str>,
) -> Option<f64> {
    if let Some(composer) = composer {
        let artist_ok = candidate
            .artists
            .iter()
            .any(|a| a.name == VARIOUS_ARTISTS || fuzzy_ratio(composer, &a.name) > ARTIST_MATCH_THRESHOLD);
        if !artist_ok {
            return None;
        }
    }

    if let Some(year) = year {
        let released = candidate.release_date.as_deref().unwrap_or_default();
        if ![year, year - 1, year + 1]
            .iter()
            .any(|y| released.contains(&y.to_string()))
        {
            return None;
        }
    }

    let movie = movie_name.to_lowercase();
    let mut title = candidate.name.to_lowercase();
    if !movie.contains(&['(', ')'][..]) {
        title = title.replace(&['(', ')'][..], "");
    }

    let movie_words: Vec<&str> = movie.split_whitespace().collect();
    let album_words: Vec<&str> = title.split_whitespace().collect();

    let (positive, mut removable) = keyword_hits(&movie_words, &album_words, &POSITIVE_KEYWORDS);
    let (negative, negative_removable) = keyword_hits(&movie_words, &album_words, &NEGATIVE_KEYWORDS);
    let (_, neutral_removable) = keyword_hits(&movie_words, &album_words, &NEUTRAL_KEYWORDS);
    removable.extend(negative_removable);
    removable.extend(neutral_removable);

    let cleaned = album_words
        .iter()
        .filter(|w| !removable.iter().any(|r| r == *w))
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    if !cleaned.contains(longest_word(&movie_words)?) {
        return None;
    }

    let modifier = POSITIVE_INFLUENCE.powi(positive) * NEGATIVE_INFLUENCE.powi(negative);
    Some(modifier * fuzzy_ratio(&movie, &cleaned))
}

/// Best scoring candidate, first on ties
pub fn best_album(
    candidates: Vec<AlbumCandidate>,
    movie_name: &str,
    year: Option<i32>,
    composer: Option<&str>,
) -> Option<AlbumMatch> {
    let mut best: Option<(f64, AlbumCandidate)> = None;

    for candidate in candidates {
        let Some(score) = score_album(&candidate, movie_name, year, composer) else {
            continue;
        };
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, candidate));
        }
    }

    best.map(|(score, album)| AlbumMatch {
        album_id: album.id,
        name: album.name,
        release_date: album.release_date,
        score,
    })
}

/// `movie → album search → best scored album`
pub struct AlbumMatchPipeline {
    spotify: Arc<SpotifyApi>,
    composer_column: String,
}

impl AlbumMatchPipeline {
    pub fn new(spotify: Arc<SpotifyApi>) -> Self {
        Self {
            spotify,
            composer_column: DEFAULT_COMPOSER_COLUMN.to_string(),
        }
    }

    pub fn with_composer_column(mut self, column: impl Into<String>) -> Self {
        self.composer_column = column.into();
        self
    }

    pub fn spotify(&self) -> &Arc<SpotifyApi> {
        &self.spotify
    }

    /// Best album per row, in row order
    pub async fn match_albums(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Option<AlbumMatch>>> {
        let queries = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.name.trim().is_empty())
            .map(|(slot, row)| (slot, row.name.clone()))
            .collect();

        let searched = self.spotify.search_albums(queries).await?;
        let candidates = by_slot(rows, searched);

        let matches: Vec<Option<AlbumMatch>> = rows
            .iter()
            .zip(candidates)
            .map(|(row, albums)| {
                let composer = row.column_str(&self.composer_column);
                best_album(albums.unwrap_or_default(), &row.name, row.year, composer)
            })
            .collect();

        debug!(
            rows = rows.len(),
            matched = matches.iter().filter(|m| m.is_some()).count(),
            "Albums matched"
        );
        Ok(matches)
    }
}

#[async_trait]
impl StageResolver for AlbumMatchPipeline {
    type Output = AlbumMatch;

    fn name(&self) -> &'static str {
        "albums"
    }

    async fn resolve(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<AlbumMatch>>> {
        Ok(self
            .match_albums(rows)
            .await?
            .into_iter()
            .map(Enrichment::from_option)
            .collect())
    }
}
