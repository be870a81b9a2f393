//! Test Helper Utilities
//!
//! Shared utilities for testing scoreline-enrich pipelines without a network

#![allow(dead_code)]

pub mod stub_transport;

pub use stub_transport::{CallRecord, StubTransport};

use scoreline_enrich::pipeline::{SpotifyApi, TmdbApi, TmdbOptions};
use scoreline_enrich::{BatchRequester, InputRecord};
use std::sync::Arc;
use std::time::Duration;

pub const TMDB_BASE: &str = "http://tmdb.test/3";
pub const SPOTIFY_BASE: &str = "http://spotify.test/v1";

/// Cooldown short enough to keep rate-limit tests fast
pub const TEST_COOLDOWN: Duration = Duration::from_millis(5);

pub fn tmdb_stub() -> Arc<StubTransport> {
    Arc::new(StubTransport::new(TMDB_BASE))
}

pub fn spotify_stub() -> Arc<StubTransport> {
    Arc::new(StubTransport::new(SPOTIFY_BASE))
}

pub fn tmdb_api(stub: &Arc<StubTransport>, batch_size: usize) -> Arc<TmdbApi> {
    Arc::new(TmdbApi::new(
        BatchRequester::new(stub.clone(), batch_size, TEST_COOLDOWN),
        TmdbOptions::default(),
    ))
}

pub fn spotify_api(stub: &Arc<StubTransport>, batch_size: usize) -> Arc<SpotifyApi> {
    Arc::new(SpotifyApi::new(BatchRequester::new(
        stub.clone(),
        batch_size,
        TEST_COOLDOWN,
    )))
}

/// Rows numbered 0.. from `(name, year)` pairs
pub fn rows(entries: &[(&str, Option<i32>)]) -> Vec<InputRecord> {
    entries
        .iter()
        .enumerate()
        .map(|(position, (name, year))| InputRecord::new(position, *name, *year))
        .collect()
}
