//! MCP (Model Context Protocol) server for deepsearch.
//!
//! Exposes the research loop as an MCP tool so external agents can
//! delegate web research.
//!
//! # Feature Gate
//!
//! This module requires the `mcp` feature flag:
//! ```toml
//! [dependencies]
//! deepsearch = { version = "...", features = ["mcp"] }
//! ```
//!
//! # Architecture
//!
//! ```text
//! MCP Client
//!   ↓ research(question, history?, max_steps?)
//! DeepsearchMcpServer
//!   ↓ RateLimiter::acquire("research")
//! Orchestrator::research_with_steps()
//!   ↓
//! ResearchOutcome JSON → MCP Client
//! ```

pub mod params;
pub mod server;
pub mod transport;

pub use params::{HistoryMessage, ResearchParams};
pub use server::DeepsearchMcpServer;
pub use transport::{serve_http, serve_stdio};
