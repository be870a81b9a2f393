//! `composer name → artist id → artist profile`
//!
//! Profiles are fetched through the multi-id endpoint, up to 50 artists per
//! request, and mapped back to rows by id.

use super::by_slot;
use super::spotify::SpotifyApi;
use crate::error::EnrichResult;
use crate::mapper;
use crate::model::{ArtistProfile, Enrichment, ExternalId, InputRecord};
use crate::runner::StageResolver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ArtistProfilePipeline {
    spotify: Arc<SpotifyApi>,
}

impl ArtistProfilePipeline {
    pub fn new(spotify: Arc<SpotifyApi>) -> Self {
        Self { spotify }
    }
}

#[async_trait]
impl StageResolver for ArtistProfilePipeline {
    type Output = ArtistProfile;

    fn name(&self) -> &'static str {
        "artists"
    }

    async fn resolve(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<ArtistProfile>>> {
        let ids = self
            .spotify
            .resolve_artist_ids(rows, |row| Some(row.name.trim()).filter(|n| !n.is_empty()))
            .await?;

        let wanted: Vec<String> = ids.iter().filter_map(|r| r.id.matched().cloned()).collect();
        let profiles: HashMap<String, ArtistProfile> = self
            .spotify
            .artists_by_ids(wanted)
            .await?
            .into_iter()
            .map(|artist| (artist.id.clone(), mapper::to_artist_profile(artist)))
            .collect();

        let resolved = ids.into_iter().map(|r| (r.slot, r.id));
        Ok(by_slot(rows, resolved)
            .into_iter()
            .map(|placed| match placed {
                Some(ExternalId::Matched(id)) => Enrichment::from_option(profiles.get(&id).cloned()),
                Some(ExternalId::NoMatch) | None => Enrichment::Missing,
            })
            .collect())
    }
}
