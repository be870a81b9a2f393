//! `movie → detail → revenue` pipeline

use super::by_slot;
use super::tmdb::{matched_movie_ids, TmdbApi};
use crate::error::EnrichResult;
use crate::mapper::{self, MovieDetail};
use crate::model::{Enrichment, InputRecord, Revenue};
use crate::runner::StageResolver;
use async_trait::async_trait;
use std::sync::Arc;

pub struct RevenuePipeline {
    tmdb: Arc<TmdbApi>,
}

impl RevenuePipeline {
    pub fn new(tmdb: Arc<TmdbApi>) -> Self {
        Self { tmdb }
    }
}

#[async_trait]
impl StageResolver for RevenuePipeline {
    type Output = Revenue;

    fn name(&self) -> &'static str {
        "revenue"
    }

    async fn resolve(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<Revenue>>> {
        let ids = self.tmdb.resolve_movie_ids(rows).await?;

        let requests = matched_movie_ids(&ids)
            .into_iter()
            .map(|(slot, movie_id)| Ok((slot, self.tmdb.movie_url(movie_id)?)))
            .collect::<EnrichResult<Vec<_>>>()?;

        let details: Vec<(usize, MovieDetail)> =
            self.tmdb.requester().fetch_typed(requests, "movie").await?;

        let revenue = details
            .iter()
            .map(|(slot, detail)| (*slot, mapper::to_revenue(detail)));

        // Rows without a detail were NoMatch at stage 1
        Ok(by_slot(rows, revenue)
            .into_iter()
            .map(|placed| placed.unwrap_or(Enrichment::Missing))
            .collect())
    }
}
