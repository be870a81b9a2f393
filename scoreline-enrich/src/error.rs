//! Error types for scoreline-enrich
//!
//! `FetchError` is what a single request can produce. `EnrichError` is what a
//! pipeline stage can produce and what the chunk runner reacts to.

use thiserror::Error;

/// Outcome of a single failed request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Provider throttled the request (HTTP 429). Absorbed by the batch requester.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Any other non-2xx status
    #[error("API error {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// Connection-level failure before a status was received
    #[error("Network error: {0}")]
    Network(String),

    /// 2xx response whose body was not JSON
    #[error("Parse error: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

/// Errors surfaced by pipeline stages to the chunk runner
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Request failure not recovered by the batch requester
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Provider response did not have the shape needed for derivation
    #[error("Malformed {entity}: {reason}")]
    MalformedLeaf { entity: &'static str, reason: String },

    /// Resolver produced a result slice of the wrong length
    #[error("Resolver returned {actual} results for a chunk of {expected} records")]
    ChunkShape { expected: usize, actual: usize },

    /// Endpoint URL could not be built
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Configuration or secret resolution failed
    #[error(transparent)]
    Setup(#[from] scoreline_common::Error),
}

/// Result type for pipeline stages
pub type EnrichResult<T> = Result<T, EnrichError>;
