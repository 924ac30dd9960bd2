//! Research configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;
use crate::rate_limit::RateLimitConfig;
use crate::web::crawl::{
    CrawlConfig, DEFAULT_CRAWL_CONCURRENCY, DEFAULT_FETCH_BACKOFF, DEFAULT_FETCH_RETRIES,
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_PAGE_CHARS,
};

/// Default research iterations before a forced answer.
pub const DEFAULT_MAX_STEPS: usize = 10;
/// Default search results requested per query.
pub const DEFAULT_SEARCH_RESULTS: usize = 10;
/// Default concurrent summaries per batch.
const DEFAULT_SUMMARY_CONCURRENCY: usize = 5;
/// Default search call timeout in seconds.
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 15;
/// Default per-summary timeout in seconds.
const DEFAULT_SUMMARY_TIMEOUT_SECS: u64 = 60;
/// Default reasoning-engine request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default cache time-to-live in seconds (six hours).
const DEFAULT_CACHE_TTL_SECS: u64 = 6 * 60 * 60;
/// Default search requests per minute.
const DEFAULT_SEARCH_RPM: u32 = 60;
/// Default decider max tokens.
const DEFAULT_DECISION_MAX_TOKENS: u32 = 1024;
/// Default planner max tokens.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 1024;
/// Default summarizer max tokens.
const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 2048;
/// Default answer max tokens.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 4096;

/// Default model for the fast agents (decider, planner, summarizer).
const DEFAULT_FAST_MODEL: &str = "gpt-4o-mini";
/// Default model for the answer synthesizer.
const DEFAULT_ANSWER_MODEL: &str = "gpt-4o";

/// Configuration for a research run.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Reasoning-engine provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for the action decider.
    pub decision_model: String,
    /// Model for the query planner.
    pub planner_model: String,
    /// Model for page summaries.
    pub summarizer_model: String,
    /// Model for the final answer.
    pub answer_model: String,
    /// Maximum tokens for decider responses.
    pub decision_max_tokens: u32,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens per summary.
    pub summary_max_tokens: u32,
    /// Maximum tokens for the answer.
    pub answer_max_tokens: u32,
    /// Serper API key; searches fail without it.
    pub serper_api_key: Option<String>,
    /// Research iterations before the answer is forced.
    pub max_steps: usize,
    /// Search results requested per query.
    pub search_results: usize,
    /// Concurrent page fetches per crawl batch.
    pub crawl_concurrency: usize,
    /// Concurrent summaries per batch.
    pub summary_concurrency: usize,
    /// Timeout for one search call.
    pub search_timeout: Duration,
    /// Timeout for one fetch attempt.
    pub fetch_timeout: Duration,
    /// Retries for transient fetch failures.
    pub fetch_retries: u32,
    /// Backoff before the first fetch retry.
    pub fetch_backoff: Duration,
    /// Cap on extracted page characters.
    pub max_page_chars: usize,
    /// Timeout for one summary.
    pub summary_timeout: Duration,
    /// Reasoning-engine request timeout.
    pub timeout: Duration,
    /// Time-to-live of cached search results and pages.
    pub cache_ttl: Duration,
    /// Shared search budget.
    pub search_rate_limit: RateLimitConfig,
    /// Wall-clock budget for a whole run; the run is cancelled when it elapses.
    pub time_budget: Option<Duration>,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
}

impl ResearchConfig {
    /// Creates a new builder for `ResearchConfig`.
    #[must_use]
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Crawl engine settings derived from this configuration.
    #[must_use]
    pub const fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            concurrency: self.crawl_concurrency,
            timeout: self.fetch_timeout,
            retries: self.fetch_retries,
            backoff: self.fetch_backoff,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Builder for [`ResearchConfig`].
#[derive(Debug, Clone, Default)]
pub struct ResearchConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    decision_model: Option<String>,
    planner_model: Option<String>,
    summarizer_model: Option<String>,
    answer_model: Option<String>,
    serper_api_key: Option<String>,
    max_steps: Option<usize>,
    search_results: Option<usize>,
    crawl_concurrency: Option<usize>,
    summary_concurrency: Option<usize>,
    search_timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
    fetch_retries: Option<u32>,
    fetch_backoff: Option<Duration>,
    max_page_chars: Option<usize>,
    summary_timeout: Option<Duration>,
    timeout: Option<Duration>,
    cache_ttl: Option<Duration>,
    search_rate_limit: Option<RateLimitConfig>,
    time_budget: Option<Duration>,
    prompt_dir: Option<PathBuf>,
}

impl ResearchConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("DEEPSEARCH_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("DEEPSEARCH_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("DEEPSEARCH_BASE_URL"))
                .ok();
        }
        if self.decision_model.is_none() {
            self.decision_model = std::env::var("DEEPSEARCH_DECISION_MODEL").ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("DEEPSEARCH_PLANNER_MODEL").ok();
        }
        if self.summarizer_model.is_none() {
            self.summarizer_model = std::env::var("DEEPSEARCH_SUMMARIZER_MODEL").ok();
        }
        if self.answer_model.is_none() {
            self.answer_model = std::env::var("DEEPSEARCH_ANSWER_MODEL").ok();
        }
        if self.serper_api_key.is_none() {
            self.serper_api_key = std::env::var("SERPER_API_KEY").ok();
        }
        if self.max_steps.is_none() {
            self.max_steps = env_parse("DEEPSEARCH_MAX_STEPS");
        }
        if self.search_results.is_none() {
            self.search_results = env_parse("DEEPSEARCH_SEARCH_RESULTS");
        }
        if self.crawl_concurrency.is_none() {
            self.crawl_concurrency = env_parse("DEEPSEARCH_CRAWL_CONCURRENCY");
        }
        if self.summary_concurrency.is_none() {
            self.summary_concurrency = env_parse("DEEPSEARCH_SUMMARY_CONCURRENCY");
        }
        if self.cache_ttl.is_none() {
            self.cache_ttl = env_parse("DEEPSEARCH_CACHE_TTL_SECS").map(Duration::from_secs);
        }
        if self.search_rate_limit.is_none() {
            self.search_rate_limit =
                env_parse::<u32>("DEEPSEARCH_SEARCH_RPM").map(|rpm| RateLimitConfig {
                    max_requests: rpm,
                    ..RateLimitConfig::default()
                });
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("DEEPSEARCH_PROMPT_DIR")
                .ok()
                .map(PathBuf::from);
        }
        self
    }

    /// Sets the reasoning-engine provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the decider model.
    #[must_use]
    pub fn decision_model(mut self, model: impl Into<String>) -> Self {
        self.decision_model = Some(model.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the summarizer model.
    #[must_use]
    pub fn summarizer_model(mut self, model: impl Into<String>) -> Self {
        self.summarizer_model = Some(model.into());
        self
    }

    /// Sets the answer model.
    #[must_use]
    pub fn answer_model(mut self, model: impl Into<String>) -> Self {
        self.answer_model = Some(model.into());
        self
    }

    /// Sets the Serper API key.
    #[must_use]
    pub fn serper_api_key(mut self, key: impl Into<String>) -> Self {
        self.serper_api_key = Some(key.into());
        self
    }

    /// Sets the research step budget.
    #[must_use]
    pub const fn max_steps(mut self, n: usize) -> Self {
        self.max_steps = Some(n);
        self
    }

    /// Sets the search results per query.
    #[must_use]
    pub const fn search_results(mut self, n: usize) -> Self {
        self.search_results = Some(n);
        self
    }

    /// Sets the crawl concurrency.
    #[must_use]
    pub const fn crawl_concurrency(mut self, n: usize) -> Self {
        self.crawl_concurrency = Some(n);
        self
    }

    /// Sets the summary concurrency.
    #[must_use]
    pub const fn summary_concurrency(mut self, n: usize) -> Self {
        self.summary_concurrency = Some(n);
        self
    }

    /// Sets the search timeout.
    #[must_use]
    pub const fn search_timeout(mut self, duration: Duration) -> Self {
        self.search_timeout = Some(duration);
        self
    }

    /// Sets the per-attempt fetch timeout.
    #[must_use]
    pub const fn fetch_timeout(mut self, duration: Duration) -> Self {
        self.fetch_timeout = Some(duration);
        self
    }

    /// Sets the transient fetch retries.
    #[must_use]
    pub const fn fetch_retries(mut self, n: u32) -> Self {
        self.fetch_retries = Some(n);
        self
    }

    /// Sets the initial fetch backoff.
    #[must_use]
    pub const fn fetch_backoff(mut self, duration: Duration) -> Self {
        self.fetch_backoff = Some(duration);
        self
    }

    /// Sets the page character cap.
    #[must_use]
    pub const fn max_page_chars(mut self, n: usize) -> Self {
        self.max_page_chars = Some(n);
        self
    }

    /// Sets the per-summary timeout.
    #[must_use]
    pub const fn summary_timeout(mut self, duration: Duration) -> Self {
        self.summary_timeout = Some(duration);
        self
    }

    /// Sets the reasoning-engine request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the cache time-to-live.
    #[must_use]
    pub const fn cache_ttl(mut self, duration: Duration) -> Self {
        self.cache_ttl = Some(duration);
        self
    }

    /// Sets the shared search rate limit.
    #[must_use]
    pub fn search_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.search_rate_limit = Some(config);
        self
    }

    /// Sets the wall-clock budget for a run.
    #[must_use]
    pub const fn time_budget(mut self, duration: Duration) -> Self {
        self.time_budget = Some(duration);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`ResearchConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, and
    /// [`AgentError::Config`] when the step budget or a concurrency limit
    /// is zero.
    pub fn build(self) -> Result<ResearchConfig, AgentError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::ApiKeyMissing)?;

        let config = ResearchConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            decision_model: self
                .decision_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            planner_model: self
                .planner_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            summarizer_model: self
                .summarizer_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            answer_model: self
                .answer_model
                .unwrap_or_else(|| DEFAULT_ANSWER_MODEL.to_string()),
            decision_max_tokens: DEFAULT_DECISION_MAX_TOKENS,
            planner_max_tokens: DEFAULT_PLANNER_MAX_TOKENS,
            summary_max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            answer_max_tokens: DEFAULT_ANSWER_MAX_TOKENS,
            serper_api_key: self.serper_api_key.filter(|k| !k.trim().is_empty()),
            max_steps: self.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
            search_results: self.search_results.unwrap_or(DEFAULT_SEARCH_RESULTS),
            crawl_concurrency: self.crawl_concurrency.unwrap_or(DEFAULT_CRAWL_CONCURRENCY),
            summary_concurrency: self
                .summary_concurrency
                .unwrap_or(DEFAULT_SUMMARY_CONCURRENCY),
            search_timeout: self
                .search_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SEARCH_TIMEOUT_SECS)),
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            fetch_retries: self.fetch_retries.unwrap_or(DEFAULT_FETCH_RETRIES),
            fetch_backoff: self.fetch_backoff.unwrap_or(DEFAULT_FETCH_BACKOFF),
            max_page_chars: self.max_page_chars.unwrap_or(DEFAULT_MAX_PAGE_CHARS),
            summary_timeout: self
                .summary_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SUMMARY_TIMEOUT_SECS)),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            cache_ttl: self
                .cache_ttl
                .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS)),
            search_rate_limit: self.search_rate_limit.unwrap_or_else(|| RateLimitConfig {
                max_requests: DEFAULT_SEARCH_RPM,
                ..RateLimitConfig::default()
            }),
            time_budget: self.time_budget,
            prompt_dir: self.prompt_dir,
        };

        if config.max_steps == 0 {
            return Err(AgentError::Config {
                message: "max_steps must be at least 1".to_string(),
            });
        }
        if config.search_results == 0 {
            return Err(AgentError::Config {
                message: "search_results must be at least 1".to_string(),
            });
        }
        if config.crawl_concurrency == 0 || config.summary_concurrency == 0 {
            return Err(AgentError::Config {
                message: "concurrency limits must be at least 1".to_string(),
            });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ResearchConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.search_results, DEFAULT_SEARCH_RESULTS);
        assert_eq!(config.crawl_concurrency, 5);
        assert_eq!(config.decision_model, "gpt-4o-mini");
        assert_eq!(config.answer_model, "gpt-4o");
        assert_eq!(config.cache_ttl, Duration::from_secs(21_600));
        assert_eq!(config.search_rate_limit.max_requests, 60);
        assert!(config.time_budget.is_none());
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = ResearchConfig::builder().build();
        assert!(matches!(result, Err(AgentError::ApiKeyMissing)));
        let result = ResearchConfig::builder().api_key("  ").build();
        assert!(matches!(result, Err(AgentError::ApiKeyMissing)));
    }

    #[test]
    fn test_builder_rejects_zero_limits() {
        let result = ResearchConfig::builder().api_key("k").max_steps(0).build();
        assert!(matches!(result, Err(AgentError::Config { .. })));
        let result = ResearchConfig::builder()
            .api_key("k")
            .crawl_concurrency(0)
            .build();
        assert!(matches!(result, Err(AgentError::Config { .. })));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = ResearchConfig::builder()
            .api_key("key")
            .provider("custom")
            .decision_model("gpt-3.5-turbo")
            .max_steps(3)
            .crawl_concurrency(2)
            .fetch_timeout(Duration::from_secs(5))
            .time_budget(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "custom");
        assert_eq!(config.decision_model, "gpt-3.5-turbo");
        assert_eq!(config.max_steps, 3);
        let crawl = config.crawl_config();
        assert_eq!(crawl.concurrency, 2);
        assert_eq!(crawl.timeout, Duration::from_secs(5));
        assert_eq!(config.time_budget, Some(Duration::from_secs(90)));
    }
}
