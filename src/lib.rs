//! # deepsearch
//!
//! Iterative web research agent. Given a conversation, it repeatedly
//! decides whether it knows enough to answer; if not, it plans search
//! queries, runs them, fetches and summarizes the result pages, and feeds
//! the digests back into the next decision. When the decider is satisfied
//! (or the step budget runs out) it writes a markdown answer citing its
//! sources.
//!
//! ## Modules
//!
//! - [`agent`]: research loop, reasoning-engine agents and providers
//! - [`web`]: search executor and crawl engine
//! - [`cache`]: memoizing cache over a key-value store
//! - [`rate_limit`]: sliding-window rate limiter
//! - [`cli`]: command-line interface
//! - `mcp`: Model Context Protocol server (feature `mcp`)
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use deepsearch::agent::message::user_message;
//! use deepsearch::agent::{Orchestrator, ResearchConfig, ResearchServices};
//! use deepsearch::cache::Cache;
//! use deepsearch::rate_limit::RateLimiter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), deepsearch::Error> {
//! let config = ResearchConfig::from_env()?;
//! let limiter = Arc::new(RateLimiter::new(config.search_rate_limit.clone()));
//! let services = ResearchServices::from_config(&config, Cache::in_memory(config.cache_ttl), limiter)?;
//! let outcome = Orchestrator::new(services, config)
//!     .research(vec![user_message("What is the capital of France?")], CancellationToken::new())
//!     .await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cache;
pub mod cli;
pub mod error;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod rate_limit;
pub mod web;

pub use error::{Error, Result};
