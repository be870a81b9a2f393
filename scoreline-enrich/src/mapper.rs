//! Provider response shapes and their conversion into domain records
//!
//! Every response is decoded into an explicit struct before any field is
//! read. A body that does not fit its shape is a `MalformedLeaf` error for
//! the stage that requested it.

use crate::error::{EnrichError, EnrichResult};
use crate::model::{ArtistProfile, Composer, Enrichment, ExternalId, Music, Revenue};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Track title fragments that mark live, remastered or bonus versions.
/// Matching is case-sensitive.
pub const TRACK_BLOCKLIST: [&str; 6] = ["Remastered", "Remaster", "remaster", "live", "Live", "Bonus"];

/// Decode a raw JSON body into a typed response
pub fn decode<T: DeserializeOwned>(entity: &'static str, value: Value) -> EnrichResult<T> {
    serde_json::from_value(value).map_err(|e| EnrichError::MalformedLeaf {
        entity,
        reason: e.to_string(),
    })
}

// ============================================================================
// Movie provider (TMDB)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MovieSearchResponse {
    #[serde(default)]
    pub results: Vec<MovieSearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieSearchResult {
    pub id: i64,
}

impl MovieSearchResponse {
    /// First result's id, or the sentinel when the search came back empty
    pub fn first_id(&self) -> ExternalId<i64> {
        self.results
            .first()
            .map_or(ExternalId::NoMatch, |r| ExternalId::Matched(r.id))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreditsResponse {
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewMember {
    pub id: i64,
    #[serde(default)]
    pub job: String,
}

impl CreditsResponse {
    /// Person ids of crew members credited as composer, in provider order
    pub fn composer_ids(&self) -> Vec<i64> {
        self.crew
            .iter()
            .filter(|member| is_composer_job(&member.job))
            .map(|member| member.id)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonDetail {
    pub id: i64,
    pub name: String,
    pub birthday: Option<String>,
    pub gender: Option<i64>,
    pub homepage: Option<String>,
    pub place_of_birth: Option<String>,
    #[serde(default)]
    pub movie_credits: PersonMovieCredits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonMovieCredits {
    #[serde(default)]
    pub crew: Vec<PersonCrewCredit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonCrewCredit {
    #[serde(default)]
    pub job: String,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieDetail {
    pub id: i64,
    pub revenue: Option<i64>,
}

/// Case-insensitive "composer" substring match on a crew job title
pub fn is_composer_job(job: &str) -> bool {
    job.to_lowercase().contains("composer")
}

/// Earliest parseable release date among the person's composer credits.
///
/// `None` when no composer credit carries a `YYYY-MM-DD` date.
pub fn first_appearance(credits: &PersonMovieCredits) -> Option<NaiveDate> {
    credits
        .crew
        .iter()
        .filter(|credit| is_composer_job(&credit.job))
        .filter_map(|credit| credit.release_date.as_deref())
        .filter_map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .min()
}

pub fn to_composer(person: PersonDetail, movie_id: i64) -> Composer {
    let first_appearance_in_movie = first_appearance(&person.movie_credits);
    if first_appearance_in_movie.is_none() {
        debug!(
            person_id = person.id,
            name = %person.name,
            "No dated composer credit, first appearance left empty"
        );
    }

    Composer {
        id: person.id,
        name: person.name,
        birthday: person.birthday.filter(|s| !s.is_empty()),
        gender: person.gender,
        homepage: person.homepage.filter(|s| !s.is_empty()),
        place_of_birth: person.place_of_birth.filter(|s| !s.is_empty()),
        first_appearance_in_movie,
        movie_id,
    }
}

/// Revenue of exactly 0 is how the provider says "unknown"
pub fn to_revenue(detail: &MovieDetail) -> Enrichment<Revenue> {
    match detail.revenue {
        None | Some(0) => Enrichment::Missing,
        Some(amount) => Enrichment::Found(Revenue {
            movie_id: detail.id,
            amount,
        }),
    }
}

// ============================================================================
// Music provider (Spotify)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistSearchResponse {
    pub artists: Paging<ArtistSummary>,
}

impl ArtistSearchResponse {
    pub fn first_id(&self) -> ExternalId<String> {
        self.artists
            .items
            .first()
            .map_or(ExternalId::NoMatch, |a| ExternalId::Matched(a.id.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumSearchResponse {
    pub albums: Paging<AlbumCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumCandidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackDetail {
    pub id: String,
    pub name: String,
    pub popularity: Option<u32>,
    #[serde(default)]
    pub artists: Vec<ArtistSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistDetail {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub followers: Option<Followers>,
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Followers {
    pub total: Option<u64>,
}

/// `GET /artists?ids=` body; unknown ids come back as `null`
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistsResponse {
    #[serde(default)]
    pub artists: Vec<Option<ArtistDetail>>,
}

pub fn is_blocklisted(title: &str) -> bool {
    TRACK_BLOCKLIST.iter().any(|word| title.contains(word))
}

/// Playable track ids of an album listing, blocklisted titles removed
pub fn kept_track_ids(tracks: &Paging<TrackRef>) -> Vec<String> {
    tracks
        .items
        .iter()
        .filter(|track| !is_blocklisted(&track.name))
        .filter_map(|track| track.id.clone())
        .collect()
}

/// Id of the artist a track's genres are looked up from
pub fn primary_artist_id(track: &TrackDetail) -> EnrichResult<&str> {
    track
        .artists
        .first()
        .map(|a| a.id.as_str())
        .ok_or_else(|| EnrichError::MalformedLeaf {
            entity: "track",
            reason: format!("track {} lists no artists", track.id),
        })
}

pub fn to_music(track: TrackDetail, genres: Vec<String>, album_id: String) -> EnrichResult<Music> {
    let composer_id = primary_artist_id(&track)?.to_string();
    Ok(Music {
        id: track.id,
        name: track.name,
        genres,
        composer_id,
        popularity: track.popularity,
        album_id,
    })
}

pub fn to_artist_profile(artist: ArtistDetail) -> ArtistProfile {
    ArtistProfile {
        id: artist.id,
        name: artist.name,
        genres: artist.genres,
        followers: artist.followers.and_then(|f| f.total),
        popularity: artist.popularity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_id_or_sentinel() {
        let hit: MovieSearchResponse = decode("search", json!({"results": [{"id": 5}, {"id": 9}]})).unwrap();
        assert_eq!(hit.first_id(), ExternalId::Matched(5));

        let miss: MovieSearchResponse = decode("search", json!({"results": []})).unwrap();
        assert_eq!(miss.first_id(), ExternalId::NoMatch);
    }

    #[test]
    fn test_composer_job_filter_is_case_insensitive() {
        let credits: CreditsResponse = decode(
            "credits",
            json!({"crew": [
                {"id": 1, "job": "Original Music Composer"},
                {"id": 2, "job": "Director"},
                {"id": 3, "job": "COMPOSER"},
                {"id": 4}
            ]}),
        )
        .unwrap();
        assert_eq!(credits.composer_ids(), vec![1, 3]);
    }

    #[test]
    fn test_first_appearance_uses_min_parseable_composer_date() {
        let credits: PersonMovieCredits = decode(
            "credits",
            json!({"crew": [
                {"job": "Composer", "release_date": "1999-05-01"},
                {"job": "Composer", "release_date": ""},
                {"job": "Director", "release_date": "1980-01-01"},
                {"job": "Original Music Composer", "release_date": "1991-11-20"},
                {"job": "Composer", "release_date": null}
            ]}),
        )
        .unwrap();
        assert_eq!(
            first_appearance(&credits),
            NaiveDate::from_ymd_opt(1991, 11, 20)
        );
    }

    #[test]
    fn test_first_appearance_without_dates_is_none() {
        let credits: PersonMovieCredits =
            decode("credits", json!({"crew": [{"job": "Composer", "release_date": ""}]})).unwrap();
        assert_eq!(first_appearance(&credits), None);
    }

    #[test]
    fn test_revenue_zero_is_missing() {
        let zero = MovieDetail { id: 1, revenue: Some(0) };
        let one = MovieDetail { id: 1, revenue: Some(1) };
        let null = MovieDetail { id: 1, revenue: None };

        assert!(to_revenue(&zero).is_missing());
        assert_eq!(
            to_revenue(&one),
            Enrichment::Found(Revenue { movie_id: 1, amount: 1 })
        );
        assert!(to_revenue(&null).is_missing());
    }

    #[test]
    fn test_blocklist_tokens() {
        assert!(is_blocklisted("Song (Live)"));
        assert!(is_blocklisted("Song (Remastered 2009)"));
        assert!(is_blocklisted("Song - remaster"));
        assert!(is_blocklisted("Bonus Track"));
        assert!(!is_blocklisted("Song"));
        // Case-sensitive: "LIVE" is not in the list
        assert!(!is_blocklisted("LIVE AT LAST"));
    }

    #[test]
    fn test_malformed_person_is_malformed_leaf() {
        let result: EnrichResult<PersonDetail> = decode("person", json!({"id": "not-a-number"}));
        assert!(matches!(
            result,
            Err(EnrichError::MalformedLeaf { entity: "person", .. })
        ));
    }

    #[test]
    fn test_track_without_artist_is_malformed() {
        let track = TrackDetail {
            id: "t1".to_string(),
            name: "Theme".to_string(),
            popularity: Some(40),
            artists: vec![],
        };
        assert!(to_music(track, vec![], "a1".to_string()).is_err());
    }
}
