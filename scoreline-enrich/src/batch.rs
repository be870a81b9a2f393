//! Batched concurrent requests with whole-batch retry on rate limiting
//!
//! Requests are partitioned into contiguous batches. All members of a batch
//! are issued concurrently and joined; the next batch starts only once every
//! member has finished. If any member comes back `RateLimited`, the whole
//! batch is discarded, the requester sleeps for the cooldown, and every
//! member is issued again. Other failures are returned to the caller as-is.

use crate::error::{EnrichResult, FetchError};
use crate::mapper;
use crate::transport::Transport;
use futures::future::join_all;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of requests issued together
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default pause after a rate-limit signal
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Completed-request interval between progress log lines
const PROGRESS_INTERVAL: usize = 1000;

/// Issues keyed requests in sequential, internally concurrent batches
pub struct BatchRequester {
    transport: Arc<dyn Transport>,
    batch_size: usize,
    cooldown: Duration,
    /// Requests accepted over the requester's lifetime
    completed: AtomicUsize,
}

impl BatchRequester {
    pub fn new(transport: Arc<dyn Transport>, batch_size: usize, cooldown: Duration) -> Self {
        Self {
            transport,
            batch_size: batch_size.max(1),
            cooldown,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Total requests accepted so far (rate-limited attempts not counted)
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Issue every request, preserving input order in the output
    pub async fn run_batched<K>(&self, requests: Vec<(K, Url)>) -> Vec<(K, Result<Value, FetchError>)> {
        let total = requests.len();
        let mut results = Vec::with_capacity(total);
        let mut remaining = requests.into_iter();
        let mut batch_index = 0usize;

        loop {
            let batch: Vec<(K, Url)> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let outcomes = self.issue_until_accepted(&batch, batch_index).await;
            self.record_progress(batch.len(), total);

            results.extend(batch.into_iter().map(|(key, _)| key).zip(outcomes));
            batch_index += 1;
        }

        results
    }

    /// Like [`run_batched`](Self::run_batched) but fails on the first
    /// (in request order) non-rate-limit error
    pub async fn fetch_all<K>(&self, requests: Vec<(K, Url)>) -> Result<Vec<(K, Value)>, FetchError> {
        self.run_batched(requests)
            .await
            .into_iter()
            .map(|(key, result)| result.map(|value| (key, value)))
            .collect()
    }

    /// Fetch and decode every response into `R`
    pub async fn fetch_typed<K, R>(
        &self,
        requests: Vec<(K, Url)>,
        entity: &'static str,
    ) -> EnrichResult<Vec<(K, R)>>
    where
        R: DeserializeOwned,
    {
        self.fetch_all(requests)
            .await?
            .into_iter()
            .map(|(key, value)| mapper::decode(entity, value).map(|typed| (key, typed)))
            .collect()
    }

    async fn issue_until_accepted<K>(
        &self,
        batch: &[(K, Url)],
        batch_index: usize,
    ) -> Vec<Result<Value, FetchError>> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcomes = join_all(batch.iter().map(|(_, url)| self.transport.fetch(url))).await;

            let throttled = outcomes
                .iter()
                .filter(|outcome| matches!(outcome, Err(e) if e.is_rate_limited()))
                .count();

            if throttled == 0 {
                debug!(
                    batch = batch_index,
                    size = batch.len(),
                    attempt,
                    "Batch complete"
                );
                return outcomes;
            }

            warn!(
                batch = batch_index,
                size = batch.len(),
                throttled,
                attempt,
                cooldown_secs = self.cooldown.as_secs_f64(),
                "Provider rate limit reached, retrying whole batch after cooldown"
            );
            tokio::time::sleep(self.cooldown).await;
        }
    }

    fn record_progress(&self, accepted: usize, total: usize) {
        let before = self.completed.fetch_add(accepted, Ordering::Relaxed);
        let after = before + accepted;
        if before / PROGRESS_INTERVAL != after / PROGRESS_INTERVAL {
            info!(completed = after, current_run = total, "Request progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers `{"n": <path number>}`; 429 for URLs listed in `throttle_once`
    /// on their first call, 500 for URLs listed in `fail`
    struct ScriptedTransport {
        base: Url,
        calls: Mutex<Vec<String>>,
        throttle_once: Vec<String>,
        fail: Vec<String>,
        seen: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedTransport {
        fn new(throttle_once: &[&str], fail: &[&str]) -> Self {
            Self {
                base: Url::parse("http://stub").unwrap(),
                calls: Mutex::new(Vec::new()),
                throttle_once: throttle_once.iter().map(|s| s.to_string()).collect(),
                fail: fail.iter().map(|s| s.to_string()).collect(),
                seen: Mutex::new(HashMap::new()),
            }
        }

        fn url(n: usize) -> Url {
            Url::parse(&format!("http://stub/item/{}", n)).unwrap()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn base_url(&self) -> &Url {
            &self.base
        }

        async fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
            let key = url.path().to_string();
            self.calls.lock().unwrap().push(key.clone());
            let count = {
                let mut seen = self.seen.lock().unwrap();
                let entry = seen.entry(key.clone()).or_insert(0);
                *entry += 1;
                *entry
            };
            tokio::task::yield_now().await;

            if self.throttle_once.contains(&key) && count == 1 {
                return Err(FetchError::RateLimited);
            }
            if self.fail.contains(&key) {
                return Err(FetchError::RequestFailed {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let n: usize = key.rsplit('/').next().unwrap().parse().unwrap();
            Ok(json!({ "n": n }))
        }
    }

    fn requests(n: usize) -> Vec<(usize, Url)> {
        (0..n).map(|i| (i, ScriptedTransport::url(i))).collect()
    }

    #[tokio::test]
    async fn test_results_preserve_request_order() {
        let transport = Arc::new(ScriptedTransport::new(&[], &[]));
        let requester = BatchRequester::new(transport.clone(), 3, Duration::ZERO);

        let results = requester.run_batched(requests(7)).await;

        let keys: Vec<usize> = results.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (0..7).collect::<Vec<_>>());
        for (key, result) in &results {
            assert_eq!(result.as_ref().unwrap()["n"], json!(*key));
        }
        assert_eq!(transport.calls().len(), 7);
        assert_eq!(requester.completed(), 7);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_entire_batch() {
        // Item 4 sits in the second batch (3..6) of size 3
        let transport = Arc::new(ScriptedTransport::new(&["/item/4"], &[]));
        let requester = BatchRequester::new(transport.clone(), 3, Duration::from_millis(1));

        let results = requester.run_batched(requests(7)).await;

        assert!(results.iter().all(|(_, r)| r.is_ok()));
        let calls = transport.calls();
        assert_eq!(calls.len(), 10, "batch 3..6 issued twice");
        for item in ["/item/3", "/item/4", "/item/5"] {
            assert_eq!(calls.iter().filter(|c| c.as_str() == item).count(), 2);
        }
        for item in ["/item/0", "/item/1", "/item/2", "/item/6"] {
            assert_eq!(calls.iter().filter(|c| c.as_str() == item).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_batches_do_not_overlap() {
        let transport = Arc::new(ScriptedTransport::new(&["/item/1"], &[]));
        let requester = BatchRequester::new(transport.clone(), 2, Duration::from_millis(1));

        requester.run_batched(requests(4)).await;

        // First batch twice (0,1), then second batch (2,3)
        let calls = transport.calls();
        let first_of_second = calls.iter().position(|c| c == "/item/2").unwrap();
        assert!(calls[..first_of_second]
            .iter()
            .all(|c| c == "/item/0" || c == "/item/1"));
        assert_eq!(first_of_second, 4);
    }

    #[tokio::test]
    async fn test_request_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(&[], &["/item/1"]));
        let requester = BatchRequester::new(transport.clone(), 10, Duration::ZERO);

        let results = requester.run_batched(requests(3)).await;

        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[1].1,
            Err(FetchError::RequestFailed { status: 500, .. })
        ));
        assert!(results[2].1.is_ok());
        assert_eq!(transport.calls().len(), 3);

        let all = requester.fetch_all(requests(3)).await;
        assert!(matches!(all, Err(FetchError::RequestFailed { .. })));
    }

    #[tokio::test]
    async fn test_empty_request_list() {
        let transport = Arc::new(ScriptedTransport::new(&[], &[]));
        let requester = BatchRequester::new(transport.clone(), 10, Duration::ZERO);

        let results = requester.run_batched(Vec::<(usize, Url)>::new()).await;
        assert!(results.is_empty());
        assert!(transport.calls().is_empty());
    }
}
