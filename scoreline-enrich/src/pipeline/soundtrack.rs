//! `movie → best album → tracks → track detail → genres`

use super::album_match::AlbumMatchPipeline;
use super::regroup;
use crate::error::EnrichResult;
use crate::model::{Enrichment, InputRecord, Music, RelatedEntityRef};
use crate::runner::StageResolver;
use async_trait::async_trait;

pub struct SoundtrackPipeline {
    albums: AlbumMatchPipeline,
}

impl SoundtrackPipeline {
    pub fn new(albums: AlbumMatchPipeline) -> Self {
        Self { albums }
    }
}

#[async_trait]
impl StageResolver for SoundtrackPipeline {
    type Output = Vec<Music>;

    fn name(&self) -> &'static str {
        "soundtrack"
    }

    async fn resolve(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<Vec<Music>>>> {
        let matches = self.albums.match_albums(rows).await?;

        let album_refs: Vec<RelatedEntityRef<usize, String>> = matches
            .into_iter()
            .enumerate()
            .filter_map(|(slot, album)| {
                album.map(|album| RelatedEntityRef {
                    slot,
                    parent: slot,
                    child: album.album_id,
                })
            })
            .collect();

        let spotify = self.albums.spotify();
        let tracks = spotify.track_refs(&album_refs).await?;
        let music = spotify.music_for_tracks(tracks).await?;

        Ok(regroup(rows, music)
            .into_iter()
            .map(Enrichment::from_list)
            .collect())
    }
}
