//! Rate-limited HTTP transport
//!
//! One transport is bound to one provider base URL. It caps concurrent
//! in-flight requests per host, carries the provider's bearer token, and maps
//! HTTP status codes onto [`FetchError`].
//!
//! The network is reached only through the [`Transport`] trait so that stage
//! logic can be exercised against scripted test doubles.

use crate::error::{EnrichError, EnrichResult, FetchError};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{header, Client, StatusCode, Url};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Default ceiling of concurrent requests against one host
pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 50;

/// Connect timeout. Requests carry no total timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Single-request surface shared by the real client and test doubles
#[async_trait]
pub trait Transport: Send + Sync {
    /// Base URL every endpoint of this provider is built from
    fn base_url(&self) -> &Url;

    /// GET one fully encoded URL and parse the JSON body
    async fn fetch(&self, url: &Url) -> Result<Value, FetchError>;
}

/// Construction parameters for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Provider name used in log fields
    pub provider: String,
    pub base_url: String,
    pub bearer_token: String,
    pub max_connections_per_host: usize,
    /// Optional client-side quota, on top of the provider's own 429 signal
    pub requests_per_second: Option<NonZeroU32>,
}

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection-pooled reqwest client for one provider
///
/// Dropping the transport releases its pooled connections.
pub struct HttpTransport {
    /// HTTP client with auth headers preset
    http_client: Client,
    base_url: Url,
    provider: String,
    /// Per-host in-flight ceiling
    permits: Semaphore,
    rate_limiter: Option<DirectRateLimiter>,
}

impl HttpTransport {
    /// Create a transport with the bearer token injected into every request
    pub fn new(config: TransportConfig) -> EnrichResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| EnrichError::Endpoint(format!("{}: {}", config.base_url, e)))?;

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", config.bearer_token))
            .map_err(|e| EnrichError::Client(format!("Invalid bearer token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let max_connections = config.max_connections_per_host.max(1);

        let http_client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(max_connections)
            .build()
            .map_err(|e| EnrichError::Client(e.to_string()))?;

        let rate_limiter = config
            .requests_per_second
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        debug!(
            provider = %config.provider,
            base_url = %base_url,
            max_connections,
            requests_per_second = ?config.requests_per_second,
            "HTTP transport created"
        );

        Ok(Self {
            http_client,
            base_url,
            provider: config.provider,
            permits: Semaphore::new(max_connections),
            rate_limiter,
        })
    }

    /// Number of requests that may start right now without waiting for a slot
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        // Slot is held for the whole request, body included
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        debug!(provider = %self.provider, url = %url, "GET");

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Build `<base>/<path>?<params>` with every parameter form-encoded
pub fn endpoint(base: &Url, path: &str, params: &[(&str, String)]) -> EnrichResult<Url> {
    let raw = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    let url = if params.is_empty() {
        Url::parse(&raw)
    } else {
        Url::parse_with_params(&raw, params.iter().map(|(k, v)| (*k, v.as_str())))
    };

    url.map_err(|e| EnrichError::Endpoint(format!("{}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> TransportConfig {
        TransportConfig {
            provider: "test".to_string(),
            base_url: base_url.to_string(),
            bearer_token: "secret-token".to_string(),
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            requests_per_second: None,
        }
    }

    /// Serve one canned response per connection, recording raw requests
    async fn serve(status_line: &'static str, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                log.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).to_string());
                let response = format!(
                    "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), seen)
    }

    /// Serve `{}` after `delay` on every connection, concurrently, and report
    /// the peak number of connections open at once
    async fn serve_counting(delay: Duration) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let open = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let peak_seen = Arc::clone(&peak);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let open = Arc::clone(&open);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let now_open = open.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now_open, Ordering::SeqCst);

                    let mut buf = vec![0u8; 8192];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;

                    let response = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}";
                    open.fetch_sub(1, Ordering::SeqCst);
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}", addr), peak_seen)
    }

    #[test]
    fn test_client_creation() {
        let transport = HttpTransport::new(config("https://api.themoviedb.org/3"));
        assert!(transport.is_ok());
        assert_eq!(
            transport.unwrap().available_slots(),
            DEFAULT_MAX_CONNECTIONS_PER_HOST
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = HttpTransport::new(config("not a url"));
        assert!(matches!(result, Err(EnrichError::Endpoint(_))));
    }

    #[test]
    fn test_endpoint_encodes_params() {
        let base = Url::parse("https://api.themoviedb.org/3").unwrap();
        let url = endpoint(
            &base,
            "search/movie",
            &[("query", "Amélie & Co".to_string()), ("page", "1".to_string())],
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.themoviedb.org/3/search/movie?query=Am%C3%A9lie+%26+Co&page=1"
        );
    }

    #[test]
    fn test_endpoint_without_params_has_no_query() {
        let base = Url::parse("https://api.spotify.com/v1/").unwrap();
        let url = endpoint(&base, "/tracks/abc", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.spotify.com/v1/tracks/abc");
    }

    #[tokio::test]
    async fn test_success_returns_json_and_sends_bearer() {
        let (base, seen) = serve("HTTP/1.1 200 OK", r#"{"id": 7}"#).await;
        let transport = HttpTransport::new(config(&base)).unwrap();

        let url = endpoint(transport.base_url(), "movie/7", &[]).unwrap();
        let body = transport.fetch(&url).await.unwrap();

        assert_eq!(body["id"], 7);
        let request = seen.lock().unwrap()[0].to_lowercase();
        assert!(request.contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let (base, _) = serve("HTTP/1.1 429 Too Many Requests", "").await;
        let transport = HttpTransport::new(config(&base)).unwrap();

        let url = endpoint(transport.base_url(), "movie/7", &[]).unwrap();
        assert_eq!(transport.fetch(&url).await, Err(FetchError::RateLimited));
    }

    #[tokio::test]
    async fn test_other_error_carries_status_and_body() {
        let (base, _) = serve("HTTP/1.1 404 Not Found", r#"{"status_message":"gone"}"#).await;
        let transport = HttpTransport::new(config(&base)).unwrap();

        let url = endpoint(transport.base_url(), "movie/7", &[]).unwrap();
        match transport.fetch(&url).await {
            Err(FetchError::RequestFailed { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("gone"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // Slot released after the request completes
        assert_eq!(transport.available_slots(), DEFAULT_MAX_CONNECTIONS_PER_HOST);
    }

    #[tokio::test]
    async fn test_requests_beyond_ceiling_wait_for_a_slot() {
        let (base, peak) = serve_counting(Duration::from_millis(50)).await;
        let transport = HttpTransport::new(TransportConfig {
            max_connections_per_host: 1,
            ..config(&base)
        })
        .unwrap();

        let first = endpoint(transport.base_url(), "movie/1", &[]).unwrap();
        let second = endpoint(transport.base_url(), "movie/2", &[]).unwrap();
        let (a, b) = tokio::join!(transport.fetch(&first), transport.fetch(&second));

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(transport.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_requests_within_ceiling_overlap() {
        let (base, peak) = serve_counting(Duration::from_millis(50)).await;
        let transport = HttpTransport::new(TransportConfig {
            max_connections_per_host: 2,
            ..config(&base)
        })
        .unwrap();

        let first = endpoint(transport.base_url(), "movie/1", &[]).unwrap();
        let second = endpoint(transport.base_url(), "movie/2", &[]).unwrap();
        let (a, b) = tokio::join!(transport.fetch(&first), transport.fetch(&second));

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
