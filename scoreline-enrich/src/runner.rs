//! Chunked job runner
//!
//! Splits an ordered record set into contiguous chunks and drives each chunk
//! through a [`StageResolver`]. A chunk that fails is retried from its first
//! stage; nothing of a failed attempt is kept. Chunks run strictly one after
//! another.
//!
//! **Retry policy:**
//! - `max_attempts: None` retries until the chunk succeeds (default)
//! - `max_attempts: Some(n)` gives up after `n` attempts; the chunk's slots
//!   stay `Pending` and the chunk is listed in [`JobReport::failed_chunks`]

use crate::error::{EnrichError, EnrichResult};
use crate::model::{EnrichedRecord, Enrichment, InputRecord};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default number of records per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 15_000;

/// Half-open ordinal range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Contiguous chunks covering `[0, len)` exactly once; the last may be shorter
pub fn chunks(len: usize, size: usize) -> Vec<Chunk> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| Chunk {
            start,
            end: (start + size).min(len),
        })
        .collect()
}

/// A multi-stage pipeline resolving one chunk of rows
///
/// `resolve` must return exactly one entry per input row, in row order.
#[async_trait]
pub trait StageResolver: Send + Sync {
    type Output: Send;

    /// Pipeline name used in log fields
    fn name(&self) -> &'static str;

    async fn resolve(&self, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<Self::Output>>>;
}

/// How often a failing chunk is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkRetryPolicy {
    /// `None` = retry until success
    pub max_attempts: Option<u32>,
    /// Pause between attempts
    pub backoff: Duration,
}

impl ChunkRetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            backoff,
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Outcome of a full run
#[derive(Debug)]
pub struct JobReport<T> {
    /// One entry per input record, in input order, `position` set to its index
    pub records: Vec<EnrichedRecord<T>>,
    pub chunks_processed: usize,
    /// Resolver invocations across all chunks, retries included
    pub attempts: usize,
    /// Chunks abandoned by a bounded retry policy
    pub failed_chunks: Vec<Chunk>,
}

impl<T> JobReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

impl<T: Serialize> JobReport<T> {
    /// Flatten every record into a JSON row with the enrichment under `column`
    pub fn to_rows(&self, column: &str) -> serde_json::Result<Vec<Value>> {
        self.records.iter().map(|r| r.to_row(column)).collect()
    }
}

pub struct ChunkedJobRunner {
    chunk_size: usize,
    retry: ChunkRetryPolicy,
}

impl ChunkedJobRunner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            retry: ChunkRetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: ChunkRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Resolve every record, chunk by chunk
    pub async fn run<R>(&self, records: &[InputRecord], resolver: &R) -> JobReport<R::Output>
    where
        R: StageResolver + ?Sized,
    {
        let start_time = Instant::now();

        // Correct length from the start, even if a chunk never completes
        let mut output: Vec<Enrichment<R::Output>> =
            records.iter().map(|_| Enrichment::Pending).collect();

        let plan = chunks(records.len(), self.chunk_size);
        let mut attempts = 0usize;
        let mut failed_chunks = Vec::new();

        info!(
            pipeline = resolver.name(),
            records = records.len(),
            chunks = plan.len(),
            chunk_size = self.chunk_size,
            "Starting enrichment run"
        );

        for (index, chunk) in plan.iter().enumerate() {
            let rows = &records[chunk.start..chunk.end];
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                attempts += 1;

                if attempt > 1 {
                    debug!(
                        pipeline = resolver.name(),
                        chunk = index,
                        attempt,
                        "Retrying chunk from first stage"
                    );
                }

                match resolve_chunk(resolver, rows).await {
                    Ok(values) => {
                        for (slot, value) in output[chunk.start..chunk.end].iter_mut().zip(values) {
                            *slot = value;
                        }
                        info!(
                            pipeline = resolver.name(),
                            chunk = index,
                            chunk_start = chunk.start,
                            chunk_end = chunk.end,
                            attempt,
                            "Chunk complete"
                        );
                        break;
                    }
                    Err(e) => {
                        if self.retry.exhausted(attempt) {
                            error!(
                                pipeline = resolver.name(),
                                chunk = index,
                                chunk_start = chunk.start,
                                chunk_end = chunk.end,
                                attempt,
                                error = %e,
                                "Chunk failed: retry limit reached, leaving records pending"
                            );
                            failed_chunks.push(*chunk);
                            break;
                        }

                        warn!(
                            pipeline = resolver.name(),
                            chunk = index,
                            chunk_start = chunk.start,
                            chunk_end = chunk.end,
                            attempt,
                            error = %e,
                            "Chunk failed, retrying"
                        );

                        if !self.retry.backoff.is_zero() {
                            tokio::time::sleep(self.retry.backoff).await;
                        }
                    }
                }
            }
        }

        info!(
            pipeline = resolver.name(),
            chunks = plan.len(),
            attempts,
            failed = failed_chunks.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Enrichment run finished"
        );

        JobReport {
            records: records
                .iter()
                .cloned()
                .zip(output)
                .enumerate()
                .map(|(position, (mut record, value))| {
                    record.position = position;
                    EnrichedRecord { record, value }
                })
                .collect(),
            chunks_processed: plan.len(),
            attempts,
            failed_chunks,
        }
    }
}

impl Default for ChunkedJobRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

async fn resolve_chunk<R>(resolver: &R, rows: &[InputRecord]) -> EnrichResult<Vec<Enrichment<R::Output>>>
where
    R: StageResolver + ?Sized,
{
    let values = resolver.resolve(rows).await?;
    if values.len() != rows.len() {
        return Err(EnrichError::ChunkShape {
            expected: rows.len(),
            actual: values.len(),
        });
    }
    Ok(values)
}
