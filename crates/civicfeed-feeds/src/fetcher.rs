//! Feed retrieval over HTTP.
//!
//! [`FeedFetcher`] is the seam between the ingestion pipeline and the network.
//! [`HttpFeedFetcher`] is the production implementation; [`StaticFetcher`]
//! serves canned documents for tests and offline runs.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{FeedError, FeedErrorCode, FeedResult};

/// A boxed future for async trait methods, keeping the trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Marker every iCalendar document must contain.
pub const CALENDAR_MARKER: &str = "BEGIN:VCALENDAR";

/// Browser-like headers for the fallback attempt; some hosts reject bots.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/calendar,text/plain;q=0.9,*/*;q=0.8";

/// Retrieves raw feed documents.
pub trait FeedFetcher: Send + Sync {
    /// Fetches the document at `url`.
    ///
    /// # Errors
    ///
    /// Fails with [`FeedErrorCode::InvalidUrl`] before any I/O if the URL is
    /// unusable, otherwise with a network, timeout, HTTP status or content
    /// error.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FeedResult<String>>;
}

/// Settings for [`HttpFeedFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub user_agent: String,
    /// Bodies shorter than this (after trimming) are rejected.
    pub min_body_bytes: usize,
    /// Require [`CALENDAR_MARKER`] in the body.
    pub require_calendar_marker: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: format!("civicfeed/{}", env!("CARGO_PKG_VERSION")),
            min_body_bytes: 32,
            require_calendar_marker: true,
        }
    }
}

impl FetcherConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Checks that `url` is a non-empty absolute http/https URL with a host.
pub fn validate_url(url: &str) -> FeedResult<Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(FeedError::invalid_url("feed URL is empty"));
    }

    let parsed = Url::parse(trimmed).map_err(|e| {
        FeedError::invalid_url(format!("malformed feed URL '{}': {}", trimmed, e)).with_source(e)
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FeedError::invalid_url(format!(
                "unsupported URL scheme '{}'",
                other
            )));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(FeedError::invalid_url("feed URL has no host"));
    }

    Ok(parsed)
}

/// Checks that a fetched body plausibly is a calendar document.
pub fn validate_body(body: &str, config: &FetcherConfig) -> FeedResult<()> {
    let len = body.trim().len();
    if len < config.min_body_bytes {
        return Err(FeedError::invalid_content(format!(
            "response body too small ({} bytes)",
            len
        )));
    }
    if config.require_calendar_marker && !body.to_ascii_uppercase().contains(CALENDAR_MARKER) {
        return Err(FeedError::invalid_content(format!(
            "response is not an iCalendar document (missing {})",
            CALENDAR_MARKER
        )));
    }
    Ok(())
}

/// Fetches feeds with reqwest, retrying once with browser headers.
pub struct HttpFeedFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFeedFetcher {
    pub fn new(config: FetcherConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                FeedError::internal(format!("failed to create HTTP client: {}", e)).with_source(e)
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    async fn fetch_url(&self, url: &str) -> FeedResult<String> {
        let parsed = validate_url(url)?;

        let body = match self.attempt(parsed.clone(), HeaderMap::new()).await {
            Ok(body) => body,
            Err(first) => {
                debug!(url = %parsed, error = %first, "First attempt failed, retrying with browser headers");
                self.attempt(parsed, browser_headers()).await.inspect_err(|e| {
                    warn!(url = %url, code = %e.code(), error = %e, "Fallback attempt failed");
                })?
            }
        };

        validate_body(&body, &self.config)?;
        Ok(body)
    }

    async fn attempt(&self, url: Url, headers: HeaderMap) -> FeedResult<String> {
        trace!(url = %url, "Sending feed request");
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(FeedError::from_reqwest)?;
        handle_response(response).await
    }
}

impl FeedFetcher for HttpFeedFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FeedResult<String>> {
        Box::pin(self.fetch_url(url))
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers
}

async fn handle_response(response: Response) -> FeedResult<String> {
    let status = response.status();
    trace!(status = %status, "Received feed response");

    if !status.is_success() {
        return Err(FeedError::http_status(
            status.as_u16(),
            format!("feed host answered {}", status),
        ));
    }

    response.text().await.map_err(FeedError::from_reqwest)
}

/// A fetcher that serves canned responses keyed by URL.
///
/// URLs are validated the same way as [`HttpFeedFetcher`] does; unknown URLs
/// fail with a network error.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Result<String, (FeedErrorCode, String)>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `url`.
    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses.insert(url.into(), Ok(body.into()));
        self
    }

    /// Fails requests for `url` with the given code.
    pub fn with_error(
        mut self,
        url: impl Into<String>,
        code: FeedErrorCode,
        message: impl Into<String>,
    ) -> Self {
        self.responses.insert(url.into(), Err((code, message.into())));
        self
    }
}

impl FeedFetcher for StaticFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FeedResult<String>> {
        let result = validate_url(url).and_then(|_| match self.responses.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err((code, message))) => Err(FeedError::new(*code, message.clone())),
            None => Err(FeedError::network(format!("no route to {}", url))),
        });
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod url_validation {
        use super::*;

        #[test]
        fn accepts_http_and_https() {
            assert!(validate_url("https://city.example/events.ics").is_ok());
            assert!(validate_url("  http://city.example/feed  ").is_ok());
        }

        #[test]
        fn rejects_empty_and_malformed() {
            for url in ["", "   ", "not a url", "city.example/events.ics"] {
                let err = validate_url(url).unwrap_err();
                assert_eq!(err.code(), FeedErrorCode::InvalidUrl, "{url}");
            }
        }

        #[test]
        fn rejects_other_schemes() {
            for url in ["ftp://city.example/x.ics", "file:///etc/passwd", "webcal://x.example/c"] {
                let err = validate_url(url).unwrap_err();
                assert_eq!(err.code(), FeedErrorCode::InvalidUrl, "{url}");
            }
        }
    }

    mod body_validation {
        use super::*;

        #[test]
        fn accepts_calendar() {
            let body = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";
            assert!(validate_body(body, &FetcherConfig::default()).is_ok());
        }

        #[test]
        fn rejects_tiny_body() {
            let err = validate_body("  ok ", &FetcherConfig::default()).unwrap_err();
            assert_eq!(err.code(), FeedErrorCode::InvalidContent);
        }

        #[test]
        fn rejects_html_page() {
            let body = "<html><body>Please enable JavaScript to continue</body></html>";
            let err = validate_body(body, &FetcherConfig::default()).unwrap_err();
            assert_eq!(err.code(), FeedErrorCode::InvalidContent);
        }

        #[test]
        fn marker_check_can_be_disabled() {
            let config = FetcherConfig {
                require_calendar_marker: false,
                ..Default::default()
            };
            let body = "<html><body>Please enable JavaScript to continue</body></html>";
            assert!(validate_body(body, &config).is_ok());
        }
    }

    #[test]
    fn default_config() {
        let config = FetcherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert!(config.user_agent.starts_with("civicfeed/"));
    }

    #[test]
    fn client_creation() {
        let fetcher =
            HttpFeedFetcher::new(FetcherConfig::default().with_timeout(Duration::from_secs(5)));
        assert!(fetcher.is_ok());
    }

    #[tokio::test]
    async fn invalid_url_fails_without_io() {
        let fetcher = HttpFeedFetcher::new(FetcherConfig::default()).unwrap();
        let err = fetcher.fetch("mailto:someone@example.org").await.unwrap_err();
        assert_eq!(err.code(), FeedErrorCode::InvalidUrl);
    }

    mod http {
        use super::*;
        use std::sync::{Arc, Mutex};

        use axum::Router;
        use axum::extract::State;
        use axum::http::{HeaderMap as RequestHeaders, StatusCode};
        use axum::routing::get;

        const CALENDAR: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\nEND:VCALENDAR\r\n";

        /// `(user-agent, accept)` of every request the test host saw.
        type Seen = Arc<Mutex<Vec<(String, String)>>>;

        fn record(seen: &Seen, headers: &RequestHeaders) -> String {
            let get = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            let agent = get("user-agent");
            seen.lock().unwrap().push((agent.clone(), get("accept")));
            agent
        }

        async fn picky(State(seen): State<Seen>, headers: RequestHeaders) -> (StatusCode, &'static str) {
            if record(&seen, &headers).starts_with("Mozilla/") {
                (StatusCode::OK, CALENDAR)
            } else {
                (StatusCode::FORBIDDEN, "bots not welcome")
            }
        }

        async fn gone(State(seen): State<Seen>, headers: RequestHeaders) -> StatusCode {
            record(&seen, &headers);
            StatusCode::NOT_FOUND
        }

        async fn slow(State(seen): State<Seen>, headers: RequestHeaders) -> &'static str {
            record(&seen, &headers);
            tokio::time::sleep(Duration::from_secs(5)).await;
            CALENDAR
        }

        async fn plain(State(seen): State<Seen>, headers: RequestHeaders) -> &'static str {
            record(&seen, &headers);
            CALENDAR
        }

        async fn page(State(seen): State<Seen>, headers: RequestHeaders) -> &'static str {
            record(&seen, &headers);
            "<html><body>Please enable JavaScript to continue</body></html>"
        }

        /// Starts a local feed host and returns its base URL.
        async fn feed_host() -> (String, Seen) {
            let seen = Seen::default();
            let app = Router::new()
                .route("/picky.ics", get(picky))
                .route("/gone.ics", get(gone))
                .route("/slow.ics", get(slow))
                .route("/plain.ics", get(plain))
                .route("/page.html", get(page))
                .with_state(seen.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
            (format!("http://{addr}"), seen)
        }

        fn fetcher(timeout: Duration) -> HttpFeedFetcher {
            HttpFeedFetcher::new(FetcherConfig::default().with_timeout(timeout)).unwrap()
        }

        #[tokio::test]
        async fn first_attempt_success_makes_one_request() {
            let (base, seen) = feed_host().await;

            let body = fetcher(Duration::from_secs(5))
                .fetch(&format!("{base}/plain.ics"))
                .await
                .unwrap();

            assert_eq!(body, CALENDAR);
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert!(seen[0].0.starts_with("civicfeed/"));
        }

        #[tokio::test]
        async fn retries_with_browser_headers() {
            let (base, seen) = feed_host().await;

            let body = fetcher(Duration::from_secs(5))
                .fetch(&format!("{base}/picky.ics"))
                .await
                .unwrap();

            assert_eq!(body, CALENDAR);
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert!(seen[0].0.starts_with("civicfeed/"));
            assert_eq!(seen[1].0, BROWSER_USER_AGENT);
            assert_eq!(seen[1].1, BROWSER_ACCEPT);
        }

        #[tokio::test]
        async fn non_success_status_after_fallback() {
            let (base, seen) = feed_host().await;

            let err = fetcher(Duration::from_secs(5))
                .fetch(&format!("{base}/gone.ics"))
                .await
                .unwrap_err();

            assert_eq!(err.code(), FeedErrorCode::HttpStatus);
            assert_eq!(err.status(), Some(404));
            assert_eq!(seen.lock().unwrap().len(), 2);
        }

        #[tokio::test]
        async fn slow_host_times_out() {
            let (base, seen) = feed_host().await;

            let err = fetcher(Duration::from_millis(200))
                .fetch(&format!("{base}/slow.ics"))
                .await
                .unwrap_err();

            assert_eq!(err.code(), FeedErrorCode::Timeout);
            assert!(err.is_retryable());
            assert_eq!(seen.lock().unwrap().len(), 2);
        }

        #[tokio::test]
        async fn non_calendar_body_is_invalid_content() {
            let (base, seen) = feed_host().await;

            let err = fetcher(Duration::from_secs(5))
                .fetch(&format!("{base}/page.html"))
                .await
                .unwrap_err();

            assert_eq!(err.code(), FeedErrorCode::InvalidContent);
            // Content is checked once, after a successful response.
            assert_eq!(seen.lock().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn refused_connection_is_network_error() {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let err = fetcher(Duration::from_secs(5))
                .fetch(&format!("http://{addr}/feed.ics"))
                .await
                .unwrap_err();

            assert_eq!(err.code(), FeedErrorCode::NetworkError);
        }
    }

    mod static_fetcher {
        use super::*;

        #[tokio::test]
        async fn serves_bodies_and_errors() {
            let fetcher = StaticFetcher::new()
                .with_body("https://a.example/a.ics", "BEGIN:VCALENDAR")
                .with_error("https://b.example/b.ics", FeedErrorCode::Timeout, "slow");

            assert_eq!(
                fetcher.fetch("https://a.example/a.ics").await.unwrap(),
                "BEGIN:VCALENDAR"
            );
            assert_eq!(
                fetcher.fetch("https://b.example/b.ics").await.unwrap_err().code(),
                FeedErrorCode::Timeout
            );
            assert_eq!(
                fetcher.fetch("https://c.example/c.ics").await.unwrap_err().code(),
                FeedErrorCode::NetworkError
            );
        }

        #[tokio::test]
        async fn validates_urls() {
            let fetcher = StaticFetcher::new().with_body("", "BEGIN:VCALENDAR");
            assert_eq!(
                fetcher.fetch("").await.unwrap_err().code(),
                FeedErrorCode::InvalidUrl
            );
        }
    }
}
