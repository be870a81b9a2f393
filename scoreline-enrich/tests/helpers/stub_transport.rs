//! Scripted transport double
//!
//! Responses are keyed by the full request URL. Each URL may carry a queue of
//! one-shot outcomes (429s, failures) consumed before its steady response.
//! Every call is logged with a sequence number and timestamp.

use async_trait::async_trait;
use reqwest::Url;
use scoreline_enrich::{FetchError, Transport};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// One observed request
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub seq: usize,
    pub url: String,
    pub at: Instant,
    pub succeeded: bool,
}

#[derive(Default)]
struct Route {
    queued: VecDeque<Result<Value, FetchError>>,
    steady: Option<Value>,
}

pub struct StubTransport {
    base: Url,
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<CallRecord>>,
    seq: AtomicUsize,
    /// Answer 429 to the first request of every URL
    throttle_first_call: bool,
}

impl StubTransport {
    pub fn new(base: &str) -> Self {
        Self {
            base: Url::parse(base).unwrap(),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            seq: AtomicUsize::new(0),
            throttle_first_call: false,
        }
    }

    /// Every URL's first request is rate-limited
    pub fn throttling_first_calls(base: &str) -> Self {
        Self {
            throttle_first_call: true,
            ..Self::new(base)
        }
    }

    /// Steady 200 response for `url`
    pub fn respond(&self, url: &Url, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .steady = Some(body);
    }

    /// Next request to `url` gets a 429
    pub fn throttle_once(&self, url: &Url) {
        self.queue(url, Err(FetchError::RateLimited));
    }

    /// Next request to `url` fails with `status`
    pub fn fail_once(&self, url: &Url, status: u16) {
        self.queue(
            url,
            Err(FetchError::RequestFailed {
                status,
                body: "scripted failure".to_string(),
            }),
        );
    }

    fn queue(&self, url: &Url, outcome: Result<Value, FetchError>) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .queued
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests whose URL contains `fragment`
    pub fn calls_matching(&self, fragment: &str) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| c.url.contains(fragment))
            .collect()
    }

    pub fn call_count(&self, url: &Url) -> usize {
        self.calls().iter().filter(|c| c.url == url.as_str()).count()
    }

    fn outcome(&self, key: &str, first_call: bool) -> Result<Value, FetchError> {
        if self.throttle_first_call && first_call {
            return Err(FetchError::RateLimited);
        }

        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.get_mut(key) else {
            return Err(FetchError::RequestFailed {
                status: 404,
                body: format!("no route for {}", key),
            });
        };

        if let Some(queued) = route.queued.pop_front() {
            return queued;
        }
        route.steady.clone().ok_or_else(|| FetchError::RequestFailed {
            status: 404,
            body: format!("no steady response for {}", key),
        })
    }
}

#[async_trait]
impl Transport for StubTransport {
    fn base_url(&self) -> &Url {
        &self.base
    }

    async fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        let key = url.to_string();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let first_call = !self.calls.lock().unwrap().iter().any(|c| c.url == key);

        // Let the other members of the batch start before answering
        tokio::task::yield_now().await;

        let outcome = self.outcome(&key, first_call);
        self.calls.lock().unwrap().push(CallRecord {
            seq,
            url: key,
            at: Instant::now(),
            succeeded: outcome.is_ok(),
        });
        outcome
    }
}
