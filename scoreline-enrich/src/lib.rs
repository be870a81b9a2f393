//! scoreline-enrich library
//!
//! Enriches movie and composer records with data from the TMDB and Spotify
//! web APIs. Records are processed in chunks; each chunk passes through a
//! multi-stage pipeline whose stages are issued as rate-limit-aware batches.
//!
//! Layers, outermost first:
//! - [`runner`]: chunking, chunk retry, result placement
//! - [`pipeline`]: per-pipeline stage sequences
//! - [`batch`]: concurrent batches with whole-batch retry on HTTP 429
//! - [`transport`]: pooled, authenticated HTTP client
//! - [`mapper`]: typed provider responses to domain records

pub mod batch;
pub mod config;
pub mod error;
pub mod mapper;
pub mod model;
pub mod pipeline;
pub mod runner;
pub mod transport;

pub use crate::batch::BatchRequester;
pub use crate::config::EnrichConfig;
pub use crate::error::{EnrichError, EnrichResult, FetchError};
pub use crate::model::{EnrichedRecord, Enrichment, ExternalId, InputRecord};
pub use crate::runner::{ChunkRetryPolicy, ChunkedJobRunner, JobReport, StageResolver};
pub use crate::transport::{HttpTransport, Transport};
