//! Movie metadata provider (TMDB) endpoints and the shared movie-id stage

use crate::batch::BatchRequester;
use crate::error::EnrichResult;
use crate::mapper::MovieSearchResponse;
use crate::model::{ExternalId, InputRecord, ResolvedId};
use crate::transport::endpoint;
use reqwest::Url;
use tracing::debug;

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// TMDB tolerates smaller bursts than the music provider
pub const TMDB_BATCH_SIZE: usize = 50;

/// Query parameters sent with every TMDB request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmdbOptions {
    pub language: String,
    pub include_adult: bool,
}

impl Default for TmdbOptions {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            include_adult: true,
        }
    }
}

pub struct TmdbApi {
    requester: BatchRequester,
    options: TmdbOptions,
}

impl TmdbApi {
    pub fn new(requester: BatchRequester, options: TmdbOptions) -> Self {
        Self { requester, options }
    }

    pub fn requester(&self) -> &BatchRequester {
        &self.requester
    }

    fn base(&self) -> &Url {
        self.requester.transport().base_url()
    }

    pub fn search_movie_url(&self, name: &str, year: Option<i32>) -> EnrichResult<Url> {
        let mut params = vec![
            ("query", name.to_string()),
            ("include_adult", self.options.include_adult.to_string()),
            ("language", self.options.language.clone()),
            ("page", "1".to_string()),
        ];
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }
        endpoint(self.base(), "search/movie", &params)
    }

    pub fn credits_url(&self, movie_id: i64) -> EnrichResult<Url> {
        endpoint(
            self.base(),
            &format!("movie/{}/credits", movie_id),
            &[("language", self.options.language.clone())],
        )
    }

    pub fn movie_url(&self, movie_id: i64) -> EnrichResult<Url> {
        endpoint(
            self.base(),
            &format!("movie/{}", movie_id),
            &[("language", self.options.language.clone())],
        )
    }

    pub fn person_url(&self, person_id: i64) -> EnrichResult<Url> {
        endpoint(
            self.base(),
            &format!("person/{}", person_id),
            &[
                ("append_to_response", "movie_credits".to_string()),
                ("language", self.options.language.clone()),
            ],
        )
    }

    /// Stage 1 of every movie pipeline: `name + year → movie id`
    ///
    /// One entry per row, in row order. An empty search result is `NoMatch`.
    pub async fn resolve_movie_ids(&self, rows: &[InputRecord]) -> EnrichResult<Vec<ResolvedId<i64>>> {
        let requests = rows
            .iter()
            .enumerate()
            .map(|(slot, row)| Ok((slot, self.search_movie_url(&row.name, row.year)?)))
            .collect::<EnrichResult<Vec<_>>>()?;

        let found: Vec<(usize, MovieSearchResponse)> =
            self.requester.fetch_typed(requests, "movie search").await?;

        let resolved: Vec<ResolvedId<i64>> = found
            .into_iter()
            .map(|(slot, response)| ResolvedId {
                slot,
                id: response.first_id(),
            })
            .collect();

        debug!(
            rows = rows.len(),
            no_match = resolved.iter().filter(|r| r.id.is_no_match()).count(),
            "Movie ids resolved"
        );

        Ok(resolved)
    }
}

/// Matched ids keyed by chunk slot; `NoMatch` rows are dropped here so no
/// dependent request is ever built for them
pub fn matched_movie_ids(ids: &[ResolvedId<i64>]) -> Vec<(usize, i64)> {
    ids.iter()
        .filter_map(|r| match r.id {
            ExternalId::Matched(id) => Some((r.slot, id)),
            ExternalId::NoMatch => None,
        })
        .collect()
}
