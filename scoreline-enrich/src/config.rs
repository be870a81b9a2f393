//! Configuration for scoreline-enrich
//!
//! Read from `scoreline.toml`:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [tmdb]
//! bearer_token = "..."
//! batch_size = 50
//! language = "en-US"
//!
//! [spotify]
//! bearer_token = "..."
//! cooldown_secs = 30
//!
//! [runner]
//! chunk_size = 15000
//! max_chunk_attempts = 5
//! ```
//!
//! Every key is optional. Bearer tokens resolve with CLI → ENV → TOML
//! priority.

use crate::batch::{BatchRequester, DEFAULT_BATCH_SIZE, DEFAULT_COOLDOWN};
use crate::error::EnrichResult;
use crate::pipeline::spotify::SPOTIFY_BASE_URL;
use crate::pipeline::tmdb::{TMDB_BASE_URL, TMDB_BATCH_SIZE};
use crate::pipeline::{SpotifyApi, TmdbApi, TmdbOptions};
use crate::runner::{ChunkRetryPolicy, ChunkedJobRunner, DEFAULT_CHUNK_SIZE};
use crate::transport::{HttpTransport, Transport, TransportConfig, DEFAULT_MAX_CONNECTIONS_PER_HOST};
use scoreline_common::config::{load_toml_config, resolve_config_path, resolve_secret, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const TMDB_TOKEN_ENV: &str = "SCORELINE_TMDB_TOKEN";
pub const SPOTIFY_TOKEN_ENV: &str = "SCORELINE_SPOTIFY_TOKEN";

/// Top-level `scoreline.toml` contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub logging: LoggingConfig,
    pub tmdb: TmdbSection,
    pub spotify: SpotifySection,
    pub runner: RunnerSection,
}

/// `[tmdb]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbSection {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub batch_size: usize,
    pub max_connections_per_host: usize,
    pub requests_per_second: Option<NonZeroU32>,
    pub cooldown_secs: u64,
    pub language: String,
    pub include_adult: bool,
}

impl Default for TmdbSection {
    fn default() -> Self {
        let options = TmdbOptions::default();
        Self {
            base_url: TMDB_BASE_URL.to_string(),
            bearer_token: None,
            batch_size: TMDB_BATCH_SIZE,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            requests_per_second: None,
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
            language: options.language,
            include_adult: options.include_adult,
        }
    }
}

/// `[spotify]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifySection {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub batch_size: usize,
    pub max_connections_per_host: usize,
    pub requests_per_second: Option<NonZeroU32>,
    pub cooldown_secs: u64,
}

impl Default for SpotifySection {
    fn default() -> Self {
        Self {
            base_url: SPOTIFY_BASE_URL.to_string(),
            bearer_token: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            requests_per_second: None,
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
        }
    }
}

/// `[runner]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub chunk_size: usize,
    /// Unset = retry a failing chunk until it succeeds
    pub max_chunk_attempts: Option<u32>,
    pub chunk_backoff_ms: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_attempts: None,
            chunk_backoff_ms: 0,
        }
    }
}

impl RunnerSection {
    pub fn retry_policy(&self) -> ChunkRetryPolicy {
        let backoff = Duration::from_millis(self.chunk_backoff_ms);
        match self.max_chunk_attempts {
            Some(max) => ChunkRetryPolicy::bounded(max, backoff),
            None => ChunkRetryPolicy {
                max_attempts: None,
                backoff,
            },
        }
    }
}

impl EnrichConfig {
    /// Locate and load the config file; defaults when there is none
    pub fn load(cli_path: Option<&Path>) -> scoreline_common::Result<Self> {
        let path = resolve_config_path(cli_path);
        load_toml_config(path.as_deref())
    }

    /// Runner with the configured chunking, `chunk_size` overriding the file
    pub fn runner(&self, chunk_size: Option<usize>) -> ChunkedJobRunner {
        ChunkedJobRunner::new(chunk_size.unwrap_or(self.runner.chunk_size))
            .with_retry_policy(self.runner.retry_policy())
    }

    /// TMDB client over HTTP with the resolved bearer token
    pub fn tmdb_api(&self, cli_token: Option<&str>) -> EnrichResult<TmdbApi> {
        let section = &self.tmdb;
        let token = resolve_secret(
            "TMDB bearer token",
            cli_token,
            TMDB_TOKEN_ENV,
            section.bearer_token.as_deref(),
        )?;
        let transport = HttpTransport::new(TransportConfig {
            provider: "tmdb".to_string(),
            base_url: section.base_url.clone(),
            bearer_token: token,
            max_connections_per_host: section.max_connections_per_host,
            requests_per_second: section.requests_per_second,
        })?;
        Ok(self.tmdb_api_with(Arc::new(transport)))
    }

    /// TMDB client over any transport
    pub fn tmdb_api_with(&self, transport: Arc<dyn Transport>) -> TmdbApi {
        let section = &self.tmdb;
        TmdbApi::new(
            BatchRequester::new(
                transport,
                section.batch_size,
                Duration::from_secs(section.cooldown_secs),
            ),
            TmdbOptions {
                language: section.language.clone(),
                include_adult: section.include_adult,
            },
        )
    }

    /// Spotify client over HTTP with the resolved bearer token
    pub fn spotify_api(&self, cli_token: Option<&str>) -> EnrichResult<SpotifyApi> {
        let section = &self.spotify;
        let token = resolve_secret(
            "Spotify bearer token",
            cli_token,
            SPOTIFY_TOKEN_ENV,
            section.bearer_token.as_deref(),
        )?;
        let transport = HttpTransport::new(TransportConfig {
            provider: "spotify".to_string(),
            base_url: section.base_url.clone(),
            bearer_token: token,
            max_connections_per_host: section.max_connections_per_host,
            requests_per_second: section.requests_per_second,
        })?;
        Ok(self.spotify_api_with(Arc::new(transport)))
    }

    /// Spotify client over any transport
    pub fn spotify_api_with(&self, transport: Arc<dyn Transport>) -> SpotifyApi {
        let section = &self.spotify;
        SpotifyApi::new(BatchRequester::new(
            transport,
            section.batch_size,
            Duration::from_secs(section.cooldown_secs),
        ))
    }
}
