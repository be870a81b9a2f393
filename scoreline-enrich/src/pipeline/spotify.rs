//! Music catalog provider (Spotify) endpoints and the track stages shared by
//! the music and soundtrack pipelines

use crate::batch::BatchRequester;
use crate::error::EnrichResult;
use crate::mapper::{
    self, AlbumCandidate, AlbumRef, AlbumSearchResponse, ArtistDetail, ArtistSearchResponse,
    ArtistsResponse, Paging, TrackDetail, TrackRef,
};
use crate::model::{ExternalId, InputRecord, Music, RelatedEntityRef, ResolvedId};
use crate::transport::endpoint;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const SPOTIFY_BASE_URL: &str = "https://api.spotify.com/v1";

/// Upper bound on ids per `GET /artists?ids=`
pub const ARTIST_IDS_PER_REQUEST: usize = 50;

/// Candidates requested per album search
pub const ALBUM_SEARCH_LIMIT: u32 = 50;

/// Searchable catalog object types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Artist,
    Album,
}

impl SearchKind {
    fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Artist => "artist",
            SearchKind::Album => "album",
        }
    }
}

pub struct SpotifyApi {
    requester: BatchRequester,
}

impl SpotifyApi {
    pub fn new(requester: BatchRequester) -> Self {
        Self { requester }
    }

    pub fn requester(&self) -> &BatchRequester {
        &self.requester
    }

    fn base(&self) -> &Url {
        self.requester.transport().base_url()
    }

    pub fn search_url(&self, query: &str, kind: SearchKind, limit: u32) -> EnrichResult<Url> {
        endpoint(
            self.base(),
            "search",
            &[
                ("q", query.to_string()),
                ("type", kind.as_str().to_string()),
                ("limit", limit.to_string()),
            ],
        )
    }

    pub fn artist_albums_url(&self, artist_id: &str) -> EnrichResult<Url> {
        endpoint(self.base(), &format!("artists/{}/albums", artist_id), &[])
    }

    pub fn album_tracks_url(&self, album_id: &str) -> EnrichResult<Url> {
        endpoint(self.base(), &format!("albums/{}/tracks", album_id), &[])
    }

    pub fn track_url(&self, track_id: &str) -> EnrichResult<Url> {
        endpoint(self.base(), &format!("tracks/{}", track_id), &[])
    }

    pub fn artist_url(&self, artist_id: &str) -> EnrichResult<Url> {
        endpoint(self.base(), &format!("artists/{}", artist_id), &[])
    }

    pub fn artists_url(&self, artist_ids: &[String]) -> EnrichResult<Url> {
        endpoint(self.base(), "artists", &[("ids", artist_ids.join(","))])
    }

    /// `name → artist id` for every row; rows without a name are `NoMatch`
    /// without a request
    pub async fn resolve_artist_ids<'a, F>(
        &self,
        rows: &'a [InputRecord],
        name_of: F,
    ) -> EnrichResult<Vec<ResolvedId<String>>>
    where
        F: Fn(&'a InputRecord) -> Option<&'a str>,
    {
        let mut requests = Vec::new();
        let mut unnamed = Vec::new();
        for (slot, row) in rows.iter().enumerate() {
            match name_of(row) {
                Some(name) => requests.push((slot, self.search_url(name, SearchKind::Artist, 1)?)),
                None => unnamed.push(slot),
            }
        }

        let found: Vec<(usize, ArtistSearchResponse)> =
            self.requester.fetch_typed(requests, "artist search").await?;

        let mut resolved: Vec<ResolvedId<String>> = found
            .into_iter()
            .map(|(slot, response)| ResolvedId {
                slot,
                id: response.first_id(),
            })
            .chain(unnamed.into_iter().map(|slot| ResolvedId {
                slot,
                id: ExternalId::NoMatch,
            }))
            .collect();
        resolved.sort_by_key(|r| r.slot);

        Ok(resolved)
    }

    /// Album candidates for a search query per row
    pub async fn search_albums(&self, queries: Vec<(usize, String)>) -> EnrichResult<Vec<(usize, Vec<AlbumCandidate>)>> {
        let requests = queries
            .iter()
            .map(|(slot, query)| Ok((*slot, self.search_url(query, SearchKind::Album, ALBUM_SEARCH_LIMIT)?)))
            .collect::<EnrichResult<Vec<_>>>()?;

        let found: Vec<(usize, AlbumSearchResponse)> =
            self.requester.fetch_typed(requests, "album search").await?;

        Ok(found
            .into_iter()
            .map(|(slot, response)| (slot, response.albums.items))
            .collect())
    }

    /// `artist id → album ids`, flattened; `NoMatch` artists issue nothing
    pub async fn album_refs(
        &self,
        artists: &[ResolvedId<String>],
    ) -> EnrichResult<Vec<RelatedEntityRef<String, String>>> {
        let requests = artists
            .iter()
            .filter_map(|r| r.id.matched().map(|id| (r.slot, id.clone())))
            .map(|(slot, id)| {
                let url = self.artist_albums_url(&id)?;
                Ok(((slot, id), url))
            })
            .collect::<EnrichResult<Vec<_>>>()?;

        let found: Vec<((usize, String), Paging<AlbumRef>)> =
            self.requester.fetch_typed(requests, "artist albums").await?;

        Ok(found
            .into_iter()
            .flat_map(|((slot, artist_id), albums)| {
                albums.items.into_iter().map(move |album| RelatedEntityRef {
                    slot,
                    parent: artist_id.clone(),
                    child: album.id,
                })
            })
            .collect())
    }

    /// `album id → track ids`, flattened, blocklisted titles dropped
    pub async fn track_refs<P>(
        &self,
        albums: &[RelatedEntityRef<P, String>],
    ) -> EnrichResult<Vec<RelatedEntityRef<String, String>>> {
        let requests = albums
            .iter()
            .map(|r| {
                let url = self.album_tracks_url(&r.child)?;
                Ok(((r.slot, r.child.clone()), url))
            })
            .collect::<EnrichResult<Vec<_>>>()?;

        let found: Vec<((usize, String), Paging<TrackRef>)> =
            self.requester.fetch_typed(requests, "album tracks").await?;

        let mut dropped = 0usize;
        let refs: Vec<RelatedEntityRef<String, String>> = found
            .into_iter()
            .flat_map(|((slot, album_id), tracks)| {
                let kept = mapper::kept_track_ids(&tracks);
                dropped += tracks.items.len() - kept.len();
                kept.into_iter()
                    .map(|track_id| RelatedEntityRef {
                        slot,
                        parent: album_id.clone(),
                        child: track_id,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        debug!(kept = refs.len(), dropped, "Album tracks listed");
        Ok(refs)
    }

    /// Leaf stages: `track id → track detail`, then the first artist's genres.
    ///
    /// Each distinct track and each distinct artist is fetched once.
    pub async fn music_for_tracks(
        &self,
        tracks: Vec<RelatedEntityRef<String, String>>,
    ) -> EnrichResult<Vec<(usize, Music)>> {
        let track_ids = distinct(tracks.iter().map(|r| r.child.as_str()));
        let requests = track_ids
            .into_iter()
            .map(|id| Ok((id.clone(), self.track_url(&id)?)))
            .collect::<EnrichResult<Vec<_>>>()?;
        let details: HashMap<String, TrackDetail> = self
            .requester
            .fetch_typed(requests, "track")
            .await?
            .into_iter()
            .collect();

        let artist_ids = distinct(
            details
                .values()
                .map(mapper::primary_artist_id)
                .collect::<EnrichResult<Vec<_>>>()?,
        );
        let requests = artist_ids
            .into_iter()
            .map(|id| Ok((id.clone(), self.artist_url(&id)?)))
            .collect::<EnrichResult<Vec<_>>>()?;
        let genres: HashMap<String, Vec<String>> = self
            .requester
            .fetch_typed::<_, ArtistDetail>(requests, "artist")
            .await?
            .into_iter()
            .map(|(id, artist)| (id, artist.genres))
            .collect();

        tracks
            .into_iter()
            .filter_map(|r| details.get(&r.child).map(|detail| (r, detail.clone())))
            .map(|(r, detail)| {
                let artist = mapper::primary_artist_id(&detail)?;
                let track_genres = genres.get(artist).cloned().unwrap_or_default();
                Ok((r.slot, mapper::to_music(detail, track_genres, r.parent)?))
            })
            .collect()
    }

    /// `GET /artists?ids=` in groups of at most [`ARTIST_IDS_PER_REQUEST`]
    pub async fn artists_by_ids(&self, artist_ids: Vec<String>) -> EnrichResult<Vec<ArtistDetail>> {
        let requests = distinct(artist_ids.iter().map(String::as_str))
            .chunks(ARTIST_IDS_PER_REQUEST)
            .enumerate()
            .map(|(group, ids)| Ok((group, self.artists_url(ids)?)))
            .collect::<EnrichResult<Vec<_>>>()?;

        let found: Vec<(usize, ArtistsResponse)> =
            self.requester.fetch_typed(requests, "artists").await?;

        Ok(found
            .into_iter()
            .flat_map(|(_, response)| response.artists.into_iter().flatten())
            .collect())
    }
}

/// Unique values in first-seen order
fn distinct<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
