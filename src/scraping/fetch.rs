use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::FetchError;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_DUTCH: &str = "nl-NL,nl;q=0.9,en;q=0.8";

/// A single listing page to fetch: base URL plus query parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Accept invalid TLS certificates (some listing sites run broken chains).
    pub relaxed_tls: bool,
}

impl PageRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            relaxed_tls: false,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn relaxed_tls(mut self, relaxed: bool) -> Self {
        self.relaxed_tls = relaxed;
        self
    }

    /// Replace (or append) a single query parameter.
    pub fn with_query_value(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.query.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.query.push((key.to_string(), value)),
        }
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Full URL including the encoded query string.
    pub fn full_url(&self) -> Result<Url, FetchError> {
        let parsed = if self.query.is_empty() {
            Url::parse(&self.url)
        } else {
            Url::parse_with_params(&self.url, &self.query)
        };
        parsed.map_err(|err| FetchError::InvalidUrl {
            url: self.url.clone(),
            reason: err.to_string(),
        })
    }

    /// Identity of the page within one run, used for loop detection.
    pub fn page_key(&self) -> String {
        self.full_url()
            .map(String::from)
            .unwrap_or_else(|_| self.url.clone())
    }
}

/// Retry bound and exponential backoff shared by every adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (zero-based): base * 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Transport for listing pages. Plain HTTP, a headless browser or a cache of
/// saved pages all fit behind this.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError>;
}

/// Retries transient failures of the wrapped fetcher with exponential
/// backoff. Permanent errors come back on the first attempt.
pub struct Retrying<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: PageFetcher> Retrying<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for Retrying<F> {
    async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            debug!(url = %request.page_key(), attempt = attempt + 1, "fetching page");
            match self.inner.fetch(request).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        url = %request.page_key(),
                        attempt = attempt + 1,
                        error = %err,
                        ?delay,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if attempt > 0 => {
                    return Err(FetchError::Exhausted {
                        url: request.page_key(),
                        attempts: attempt + 1,
                        last: Box::new(err),
                    })
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// reqwest-backed fetcher, one attempt per call. Wrap it in [`Retrying`]
/// for the retry policy.
pub struct HttpFetcher {
    strict: Client,
    relaxed: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let build = |relaxed: bool| {
            let mut headers = HeaderMap::new();
            headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_DUTCH));
            Client::builder()
                .timeout(timeout)
                .user_agent(user_agent)
                .default_headers(headers)
                .danger_accept_invalid_certs(relaxed)
                .build()
                .map_err(FetchError::Client)
        };
        Ok(Self {
            strict: build(false)?,
            relaxed: build(true)?,
        })
    }

    /// Configured client with the configured retry policy around it.
    pub fn from_config(config: &AppConfig) -> Result<Retrying<Self>, FetchError> {
        let fetcher = Self::new(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Retrying::new(fetcher, RetryPolicy::from_config(config)))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError> {
        let url = request.full_url()?;
        let client = if request.relaxed_tls {
            &self.relaxed
        } else {
            &self.strict
        };
        let mut builder = client.get(url.clone());
        for (name, value) in &request.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }

        let response = builder.send().await.map_err(|err| classify(&url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|err| classify(&url, err))
    }
}

fn classify(url: &Url, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            source: err,
        }
    }
}

/// Serves saved pages from memory, keyed by full URL.
#[derive(Default, Clone)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, request: &PageRequest, html: impl Into<String>) -> Self {
        self.pages.insert(request.page_key(), html.into());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError> {
        let key = request.page_key();
        self.pages
            .get(&key)
            .cloned()
            .ok_or(FetchError::Missing { url: key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back a fixed sequence of outcomes, then keeps failing with 503.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<String, FetchError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<String, FetchError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl PageFetcher for Scripted {
        async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.outcomes
                .lock()
                .expect("outcomes lock")
                .pop_front()
                .unwrap_or_else(|| Err(unavailable(request)))
        }
    }

    fn unavailable(request: &PageRequest) -> FetchError {
        FetchError::Status {
            url: request.page_key(),
            status: 503,
        }
    }

    fn no_wait(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let page = PageRequest::new("https://festileaks.com/festivalagenda/");
        let script = Scripted::new(vec![
            Err(unavailable(&page)),
            Err(FetchError::Timeout { url: page.page_key() }),
            Ok("<html></html>".into()),
        ]);
        let fetcher = Retrying::new(script, no_wait(3));

        assert_eq!(fetcher.fetch(&page).await.expect("third attempt"), "<html></html>");
        assert_eq!(fetcher.inner.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let page = PageRequest::new("https://www.festivalinfo.nl/festivals/");
        let script = Scripted::new(Vec::new());
        let fetcher = Retrying::new(script, no_wait(3));

        match fetcher.fetch(&page).await {
            Err(FetchError::Exhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, FetchError::Status { status: 503, .. }));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        assert_eq!(fetcher.inner.calls(), 4);
    }

    #[tokio::test]
    async fn permanent_errors_fail_on_the_first_attempt() {
        let page = PageRequest::new("https://partyflock.nl/agenda/festivals");
        let script = Scripted::new(vec![Err(FetchError::Status {
            url: page.page_key(),
            status: 404,
        })]);
        let fetcher = Retrying::new(script, no_wait(3));

        assert!(matches!(
            fetcher.fetch(&page).await,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(fetcher.inner.calls(), 1);
    }

    #[tokio::test]
    async fn zero_retries_returns_the_error_unwrapped() {
        let page = PageRequest::new("https://www.eblive.nl/festivals/");
        let script = Scripted::new(Vec::new());
        let fetcher = Retrying::new(script, no_wait(0));

        assert!(matches!(
            fetcher.fetch(&page).await,
            Err(FetchError::Status { status: 503, .. })
        ));
        assert_eq!(fetcher.inner.calls(), 1);
    }

    #[test]
    fn encodes_form_style_query_parameters() {
        let request = PageRequest::new("https://www.eblive.nl/festivals/")
            .query("filters[search]", "")
            .query("order_by", "upcoming")
            .query("page_nr", "2");
        let url = request.full_url().expect("valid url");
        assert_eq!(
            url.as_str(),
            "https://www.eblive.nl/festivals/?filters%5Bsearch%5D=&order_by=upcoming&page_nr=2"
        );
    }

    #[test]
    fn replaces_existing_query_values() {
        let request = PageRequest::new("https://example.nl/")
            .query("page_nr", "1")
            .with_query_value("page_nr", "2");
        assert_eq!(request.query_value("page_nr"), Some("2"));
        assert_eq!(request.query.len(), 1);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
    }

    #[test]
    fn status_errors_are_transient_only_for_server_side_codes() {
        let status = |code| FetchError::Status {
            url: "https://example.nl".into(),
            status: code,
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
    }

    #[tokio::test]
    async fn static_fetcher_serves_known_pages_only() {
        let page = PageRequest::new("https://partyflock.nl/agenda/festivals");
        let fetcher = StaticFetcher::new().with_page(&page, "<html></html>");
        assert_eq!(fetcher.fetch(&page).await.expect("known page"), "<html></html>");

        let other = PageRequest::new("https://partyflock.nl/agenda/festivals?page=2");
        assert!(matches!(
            fetcher.fetch(&other).await,
            Err(FetchError::Missing { .. })
        ));
    }

    #[test]
    fn invalid_urls_are_reported() {
        let request = PageRequest::new("not a url");
        assert!(matches!(
            request.full_url(),
            Err(FetchError::InvalidUrl { .. })
        ));
    }
}
