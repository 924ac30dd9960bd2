//! External web access: search and page crawling.
//!
//! Both halves are split into a provider trait (the network boundary,
//! substituted in tests) and an engine that layers rate limiting,
//! memoization, timeouts and retries on top of it.

pub mod crawl;
pub mod search;

pub use crawl::{
    CrawlConfig, CrawlEngine, CrawlOutcome, HttpFetcher, PageFetcher, PageReport, PageResult,
    extract_text,
};
pub use search::{OrganicResult, SearchExecutor, SearchProvider, SearchResult, SerperProvider};
