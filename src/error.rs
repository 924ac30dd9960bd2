//! Error types for deepsearch.
//!
//! Library components return their own narrow error enums; the research
//! loop folds the fatal ones into [`AgentError`] and absorbs the rest as
//! partial data. [`Error`] is the top-level type used by the CLI.

use std::time::Duration;

use thiserror::Error;

/// Result alias for CLI-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Research agent failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors raised by the research agent and its reasoning-engine calls.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the reasoning engine.
    #[error("API key missing: set OPENAI_API_KEY or DEEPSEARCH_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name as configured.
        name: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// What was wrong.
        message: String,
    },

    /// The reasoning engine request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The reasoning engine returned output outside the requested schema.
    #[error("{agent} returned output outside its schema: {message}")]
    SchemaViolation {
        /// Agent that issued the call.
        agent: &'static str,
        /// Decoding failure description.
        message: String,
        /// Raw engine output.
        content: String,
    },

    /// A rate-limited resource stayed throttled after all retries.
    #[error("rate limited on '{key}' after {retries} retries")]
    RateLimited {
        /// Limiter key.
        key: String,
        /// Retries attempted.
        retries: u32,
    },

    /// The research run was cancelled or ran out of wall-clock budget.
    #[error("research cancelled")]
    Cancelled,

    /// Search failure surfaced to a direct caller.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Crawl batch contract violation surfaced to a direct caller.
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    /// Internal orchestration failure (task join, semaphore).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Failure description.
        message: String,
    },
}

impl From<RateLimitError> for AgentError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exhausted { key, retries } => Self::RateLimited { key, retries },
        }
    }
}

/// Errors from a single web search call.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// No search API key configured.
    #[error("search API key missing: set SERPER_API_KEY")]
    MissingApiKey,

    /// Transport-level failure.
    #[error("search request failed: {message}")]
    Request {
        /// Transport error message.
        message: String,
    },

    /// Provider answered with a non-success status.
    #[error("search provider returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Provider response could not be decoded.
    #[error("search response malformed: {message}")]
    Parse {
        /// Decode error message.
        message: String,
    },

    /// The call exceeded its timeout.
    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    /// The shared search budget stayed exhausted.
    #[error("search rate limited on '{key}' after {retries} retries")]
    RateLimited {
        /// Limiter key.
        key: String,
        /// Retries attempted.
        retries: u32,
    },
}

impl From<RateLimitError> for SearchError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exhausted { key, retries } => Self::RateLimited { key, retries },
        }
    }
}

/// Per-URL fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// URL could not be parsed or is not http(s).
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Fetch exceeded its timeout.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or transport failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Non-success HTTP status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// Response content type cannot be turned into text.
    #[error("unsupported content type: {0}")]
    UnsupportedContent(String),

    /// The page produced no text.
    #[error("page has no extractable text")]
    Empty,

    /// HTML to text conversion failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The fetch task panicked or was aborted.
    #[error("fetch task failed: {0}")]
    Task(String),

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    /// Returns `true` for failures worth retrying (timeouts, connection
    /// errors, 5xx and 429 responses).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::InvalidUrl(_)
            | Self::UnsupportedContent(_)
            | Self::Empty
            | Self::Extraction(_)
            | Self::Task(_)
            | Self::Client(_) => false,
        }
    }
}

/// Whole-batch crawl failure.
#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    /// The batch contained no URLs.
    #[error("crawl requires at least one URL")]
    NoUrls,
}

/// Cache layer failures. Never fatal: the memoizer treats them as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Arguments or result could not be (de)serialized.
    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The backing store failed.
    #[error("cache store failed: {message}")]
    Store {
        /// Store error message.
        message: String,
    },
}

/// Rate limiter failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The window stayed full for every retry.
    #[error("rate limit on '{key}' still exceeded after {retries} retries")]
    Exhausted {
        /// Limiter key.
        key: String,
        /// Retries attempted.
        retries: u32,
    },
}

/// CLI command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command failed while executing.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Invalid command arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be formatted.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),
}
