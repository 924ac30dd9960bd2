//! Web search.
//!
//! [`SearchProvider`] is the raw provider contract; [`SerperProvider`]
//! implements it against the Serper Google search API. [`SearchExecutor`]
//! is what the research loop calls: it caps results, applies the shared
//! rate limit and cache, and bounds each call with a timeout. It never
//! retries; a failed search yields no information for that step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::Cache;
use crate::error::SearchError;
use crate::rate_limit::RateLimiter;

/// Default Serper endpoint.
const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";
/// Maximum bytes of an error body kept in [`SearchError::Status`].
const MAX_ERROR_BODY: usize = 500;

/// One organic result exactly as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganicResult {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub link: String,
    /// Provider snippet.
    #[serde(default)]
    pub snippet: String,
    /// Publication date, when the provider knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A normalized search result as kept in the research history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Provider snippet.
    pub snippet: String,
    /// Publication date, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Query-relevant digest of the page; `None` until summarization ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl From<OrganicResult> for SearchResult {
    fn from(r: OrganicResult) -> Self {
        Self {
            title: r.title,
            url: r.link,
            snippet: r.snippet,
            published_date: r.date.filter(|d| !d.trim().is_empty()),
            summary: None,
        }
    }
}

impl SearchResult {
    /// Returns `true` once summarization has finished for this result.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.summary.is_some()
    }
}

/// Web search provider contract.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name (e.g., `"serper"`).
    fn name(&self) -> &'static str;

    /// Runs one query, returning at most `num` organic results in provider order.
    async fn search(&self, query: &str, num: usize) -> Result<Vec<OrganicResult>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

/// Serper (`google.serper.dev`) search provider.
pub struct SerperProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SerperProvider {
    /// Creates a provider. A missing key makes every search fail with
    /// [`SearchError::MissingApiKey`].
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: SERPER_ENDPOINT.to_string(),
        }
    }

    /// Overrides the endpoint (proxies, test servers).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl std::fmt::Debug for SerperProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperProvider")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl SearchProvider for SerperProvider {
    fn name(&self) -> &'static str {
        "serper"
    }

    async fn search(&self, query: &str, num: usize) -> Result<Vec<OrganicResult>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&serde_json::json!({ "q": query, "num": num }))
            .send()
            .await
            .map_err(|e| SearchError::Request {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: SerperResponse = response.json().await.map_err(|e| SearchError::Parse {
            message: e.to_string(),
        })?;

        Ok(payload.organic)
    }
}

/// Runs searches for the research loop.
#[derive(Clone)]
pub struct SearchExecutor {
    provider: Arc<dyn SearchProvider>,
    limiter: Arc<RateLimiter>,
    cache: Cache,
    timeout: Duration,
}

impl SearchExecutor {
    /// Rate limiter key consumed by every provider call.
    pub const RATE_LIMIT_KEY: &'static str = "search";

    /// Creates an executor over shared services.
    #[must_use]
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        limiter: Arc<RateLimiter>,
        cache: Cache,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            limiter,
            cache,
            timeout,
        }
    }

    /// Searches `query`, returning at most `num` normalized results in
    /// provider order.
    ///
    /// Cached results are served without touching the rate limit.
    pub async fn search(&self, query: &str, num: usize) -> Result<Vec<SearchResult>, SearchError> {
        let raw: Vec<OrganicResult> = self
            .cache
            .memoize("search", &(query, num), || async {
                self.limiter.acquire(Self::RATE_LIMIT_KEY).await?;
                tokio::time::timeout(self.timeout, self.provider.search(query, num))
                    .await
                    .map_err(|_| SearchError::Timeout(self.timeout))?
            })
            .await?;

        debug!(
            provider = self.provider.name(),
            query,
            results = raw.len(),
            "search completed"
        );

        Ok(raw.into_iter().take(num).map(SearchResult::from).collect())
    }
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Truncates `s` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
