//! `composer name → artist → albums → tracks → track detail → genres`
//!
//! Each input row carries a composer name in `name`.

use super::regroup;
use super::spotify::SpotifyApi;
use crate::error::EnrichResult;
use crate::model::{Enrichment, InputRecord, Music};
use crate::runner::StageResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct MusicPipeline {
    spotify: Arc<SpotifyApi>,
}

impl MusicPipeline {
    pub fn new(spotify: Arc<SpotifyApi>) -> Self {
        Self { spotify }
    }
}

#[async_trait]
impl StageResolver for MusicPipeline {
    type Output = Vec<Music>;

    fn name(&self) -> &'static str {
        "music"
    }

    async fn resolve(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<Vec<Music>>>> {
        let artists = self
            .spotify
            .resolve_artist_ids(rows, |row| Some(row.name.trim()).filter(|n| !n.is_empty()))
            .await?;
        let albums = self.spotify.album_refs(&artists).await?;
        let tracks = self.spotify.track_refs(&albums).await?;

        debug!(
            rows = rows.len(),
            albums = albums.len(),
            tracks = tracks.len(),
            "Composer catalog listed"
        );

        let music = self.spotify.music_for_tracks(tracks).await?;

        Ok(regroup(rows, music)
            .into_iter()
            .map(Enrichment::from_list)
            .collect())
    }
}
