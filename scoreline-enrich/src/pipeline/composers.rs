//! `movie → credits → composer` pipeline

use super::regroup;
use super::tmdb::{matched_movie_ids, TmdbApi};
use crate::error::EnrichResult;
use crate::mapper::{self, CreditsResponse, PersonDetail};
use crate::model::{Composer, Enrichment, InputRecord, RelatedEntityRef};
use crate::runner::StageResolver;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub struct ComposerPipeline {
    tmdb: Arc<TmdbApi>,
}

impl ComposerPipeline {
    pub fn new(tmdb: Arc<TmdbApi>) -> Self {
        Self { tmdb }
    }

    /// `movie id → crew → composer person ids`
    async fn composer_refs(&self, movies: Vec<(usize, i64)>) -> EnrichResult<Vec<RelatedEntityRef<i64, i64>>> {
        let requests = movies
            .into_iter()
            .map(|(slot, movie_id)| Ok(((slot, movie_id), self.tmdb.credits_url(movie_id)?)))
            .collect::<EnrichResult<Vec<_>>>()?;

        let credits: Vec<((usize, i64), CreditsResponse)> =
            self.tmdb.requester().fetch_typed(requests, "credits").await?;

        Ok(credits
            .into_iter()
            .flat_map(|((slot, movie_id), credits)| {
                credits
                    .composer_ids()
                    .into_iter()
                    .map(move |person_id| RelatedEntityRef {
                        slot,
                        parent: movie_id,
                        child: person_id,
                    })
            })
            .collect())
    }

    /// `person id → person detail`, each distinct person fetched once
    async fn people(&self, refs: &[RelatedEntityRef<i64, i64>]) -> EnrichResult<HashMap<i64, PersonDetail>> {
        let mut seen = HashSet::new();
        let requests = refs
            .iter()
            .map(|r| r.child)
            .filter(|id| seen.insert(*id))
            .map(|id| Ok((id, self.tmdb.person_url(id)?)))
            .collect::<EnrichResult<Vec<_>>>()?;

        Ok(self
            .tmdb
            .requester()
            .fetch_typed(requests, "person")
            .await?
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl StageResolver for ComposerPipeline {
    type Output = Vec<Composer>;

    fn name(&self) -> &'static str {
        "composers"
    }

    async fn resolve(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<Vec<Composer>>>> {
        let ids = self.tmdb.resolve_movie_ids(rows).await?;
        let refs = self.composer_refs(matched_movie_ids(&ids)).await?;
        let people = self.people(&refs).await?;

        debug!(
            rows = rows.len(),
            composers = refs.len(),
            people = people.len(),
            "Composer credits resolved"
        );

        let composers = refs.into_iter().filter_map(|r| {
            people
                .get(&r.child)
                .cloned()
                .map(|person| (r.slot, mapper::to_composer(person, r.parent)))
        });

        Ok(regroup(rows, composers)
            .into_iter()
            .map(Enrichment::from_list)
            .collect())
    }
}
