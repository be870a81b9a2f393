//! Concrete stage pipelines
//!
//! Every pipeline is a [`StageResolver`](crate::runner::StageResolver): a
//! fixed sequence of dependent lookups where each stage is one batched
//! request round. Intermediate values carry the owning row's chunk slot and
//! are regrouped onto the rows before a chunk's results are returned.

pub mod album_match;
pub mod artists;
pub mod composers;
pub mod music;
pub mod revenue;
pub mod soundtrack;
pub mod spotify;
pub mod tmdb;

pub use album_match::AlbumMatchPipeline;
pub use artists::ArtistProfilePipeline;
pub use composers::ComposerPipeline;
pub use music::MusicPipeline;
pub use revenue::RevenuePipeline;
pub use soundtrack::SoundtrackPipeline;
pub use spotify::SpotifyApi;
pub use tmdb::{TmdbApi, TmdbOptions};

use crate::model::InputRecord;

/// Collect slot-tagged items into one list per row, in row order
pub(crate) fn regroup<T>(rows: &[InputRecord], items: impl IntoIterator<Item = (usize, T)>) -> Vec<Vec<T>> {
    let mut grouped: Vec<Vec<T>> = rows.iter().map(|_| Vec::new()).collect();
    for (slot, item) in items {
        if let Some(group) = grouped.get_mut(slot) {
            group.push(item);
        }
    }
    grouped
}

/// Place at most one slot-tagged item per row, in row order
pub(crate) fn by_slot<T>(rows: &[InputRecord], items: impl IntoIterator<Item = (usize, T)>) -> Vec<Option<T>> {
    let mut placed: Vec<Option<T>> = rows.iter().map(|_| None).collect();
    for (slot, item) in items {
        if let Some(place) = placed.get_mut(slot) {
            *place = Some(item);
        }
    }
    placed
}
