//! Page crawling.
//!
//! [`CrawlEngine::crawl`] fetches a batch of URLs concurrently under a
//! semaphore and returns one [`PageResult`] per input URL, in input order.
//! A single URL failing never fails the batch; only an empty batch does.
//! Transient failures are retried with exponential backoff, and successful
//! fetches are memoized through the shared [`Cache`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use htmd::HtmlToMarkdown;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use crate::cache::Cache;
use crate::error::{CrawlError, FetchError};

/// Default number of concurrent fetches.
pub const DEFAULT_CRAWL_CONCURRENCY: usize = 5;
/// Default per-attempt fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Default retries for transient failures.
pub const DEFAULT_FETCH_RETRIES: u32 = 3;
/// Default initial backoff between retries.
pub const DEFAULT_FETCH_BACKOFF: Duration = Duration::from_millis(500);
/// Default cap on extracted page characters.
pub const DEFAULT_MAX_PAGE_CHARS: usize = 20_000;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Relative jitter applied to each backoff sleep.
const JITTER_FACTOR: f64 = 0.1;
/// Tags dropped before HTML is converted to markdown.
const SKIPPED_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "noscript", "iframe"];

/// Fetches one page and returns its readable text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// [`PageFetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_chars: usize,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests time out after `timeout` and whose
    /// output is capped at `max_chars` characters.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built
    /// (for example when TLS initialisation fails).
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deepsearch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            max_chars,
        })
    }

    /// Creates a fetcher with the default timeout and page cap.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_PAGE_CHARS)
    }

    fn map_transport(&self, err: &reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Connect(err.to_string())
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "{url}: unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();
        let is_html = content_type.contains("html");
        if !is_html && !content_type.starts_with("text/") {
            return Err(FetchError::UnsupportedContent(content_type));
        }

        let body = response.text().await.map_err(|e| self.map_transport(&e))?;
        let text = if is_html {
            extract_text(&body)?
        } else {
            normalize_whitespace(&body)
        };
        if text.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(truncate_chars(text, self.max_chars))
    }
}

/// Converts an HTML document to markdown, dropping non-content tags and
/// collapsing blank runs.
pub fn extract_text(html: &str) -> Result<String, FetchError> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();
    let markdown = converter
        .convert(html)
        .map_err(|e| FetchError::Extraction(e.to_string()))?;
    Ok(normalize_whitespace(&markdown))
}

fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = false;
    }
    out
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
    text
}

/// Crawl engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Maximum concurrent fetches.
    pub concurrency: usize,
    /// Timeout applied to every fetch attempt.
    pub timeout: Duration,
    /// Retries for transient failures.
    pub retries: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub backoff: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CRAWL_CONCURRENCY,
            timeout: DEFAULT_FETCH_TIMEOUT,
            retries: DEFAULT_FETCH_RETRIES,
            backoff: DEFAULT_FETCH_BACKOFF,
        }
    }
}

/// Outcome of one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// Requested URL.
    pub url: String,
    /// Extracted text or the final failure.
    pub result: Result<String, FetchError>,
}

impl PageResult {
    /// Returns the page text when the fetch succeeded.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }
}

/// Outcome of a crawl batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    /// `true` iff every URL succeeded.
    pub success: bool,
    /// One entry per requested URL, in request order.
    pub results: Vec<PageResult>,
}

impl CrawlOutcome {
    /// Number of URLs that failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_err()).count()
    }
}

/// Serializable per-URL summary, used by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport<'a> {
    /// Requested URL.
    pub url: &'a str,
    /// Extracted characters on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chars: Option<usize>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> From<&'a PageResult> for PageReport<'a> {
    fn from(page: &'a PageResult) -> Self {
        match &page.result {
            Ok(text) => Self {
                url: &page.url,
                chars: Some(text.chars().count()),
                error: None,
            },
            Err(e) => Self {
                url: &page.url,
                chars: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Concurrent, retrying, memoized page fetcher.
#[derive(Clone)]
pub struct CrawlEngine {
    fetcher: Arc<dyn PageFetcher>,
    cache: Cache,
    config: CrawlConfig,
}

impl CrawlEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, cache: Cache, config: CrawlConfig) -> Self {
        Self {
            fetcher,
            cache,
            config,
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Fetches every URL, returning results aligned with `urls`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::NoUrls`] when `urls` is empty.
    pub async fn crawl(&self, urls: &[String]) -> Result<CrawlOutcome, CrawlError> {
        if urls.is_empty() {
            return Err(CrawlError::NoUrls);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        // Dropping the set aborts every fetch still in flight.
        let mut tasks = JoinSet::new();

        for (idx, url) in urls.iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let cache = self.cache.clone();
            let config = self.config.clone();
            let url = url.clone();

            tasks.spawn(async move {
                let result = match sem.acquire().await {
                    Ok(_permit) => {
                        cache
                            .memoize("fetch_page", &url, || {
                                fetch_with_retry(fetcher.as_ref(), &url, &config)
                            })
                            .await
                    }
                    Err(e) => Err(FetchError::Task(format!("semaphore closed: {e}"))),
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<String, FetchError>>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => {
                    if let Some(slot) = slots.get_mut(idx) {
                        *slot = Some(result);
                    }
                }
                Err(e) => warn!(error = %e, "fetch task failed"),
            }
        }

        let results: Vec<PageResult> = urls
            .iter()
            .zip(slots)
            .map(|(url, slot)| {
                let result = slot.unwrap_or_else(|| {
                    Err(FetchError::Task("fetch task did not complete".to_string()))
                });
                if let Err(e) = &result {
                    debug!(url = %url, error = %e, "page fetch failed");
                }
                PageResult {
                    url: url.clone(),
                    result,
                }
            })
            .collect();

        let success = results.iter().all(|r| r.result.is_ok());
        debug!(
            urls = urls.len(),
            failed = results.iter().filter(|r| r.result.is_err()).count(),
            "crawl completed"
        );
        Ok(CrawlOutcome { success, results })
    }
}

impl std::fmt::Debug for CrawlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlEngine")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    config: &CrawlConfig,
) -> Result<String, FetchError> {
    let mut delay = config.backoff;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = tokio::time::timeout(config.timeout, fetcher.fetch(url))
            .await
            .unwrap_or(Err(FetchError::Timeout(config.timeout)));

        match result {
            Ok(text) => {
                if attempt > 1 {
                    debug!(url, attempt, "fetch succeeded after retry");
                }
                return Ok(text);
            }
            Err(e) if e.is_transient() && attempt <= config.retries => {
                let wait = jittered(delay);
                warn!(url, attempt, error = %e, wait = ?wait, "transient fetch failure, retrying");
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    let factor = 1.0 + (fastrand::f64() - 0.5) * 2.0 * JITTER_FACTOR;
    delay.mul_f64(factor)
}
