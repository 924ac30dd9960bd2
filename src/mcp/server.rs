//! MCP server implementation for deepsearch.
//!
//! Exposes the research loop as the `research` tool. Every call passes a
//! boundary rate limiter before any research work starts.

use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, ErrorCode, Implementation, ProtocolVersion, ServerCapabilities,
    ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, tool, tool_handler, tool_router};
use tracing::{info, warn};

use crate::agent::config::ResearchConfig;
use crate::agent::event::TracingObserver;
use crate::agent::orchestrator::{Orchestrator, ResearchServices};
use crate::cache::Cache;
use crate::error::AgentError;
use crate::rate_limit::{RateLimitConfig, RateLimiter};

use super::params::ResearchParams;

/// Limiter key for research requests.
pub const RESEARCH_RATE_LIMIT_KEY: &str = "research";
/// Research requests admitted per window by default.
const DEFAULT_RESEARCH_RPM: u32 = 10;
/// JSON-RPC error code reported when the boundary limiter stays exhausted.
const RATE_LIMITED_CODE: ErrorCode = ErrorCode(-32029);

/// Maps a research failure onto an MCP error.
fn to_mcp_error(err: &AgentError) -> McpError {
    match err {
        AgentError::RateLimited { .. } => McpError::new(RATE_LIMITED_CODE, err.to_string(), None),
        AgentError::Config { .. } => McpError::invalid_params(err.to_string(), None),
        _ => McpError::internal_error(format!("Research failed: {err}"), None),
    }
}

/// deepsearch MCP server.
#[derive(Clone)]
pub struct DeepsearchMcpServer {
    tool_router: ToolRouter<Self>,
    orchestrator: Arc<Orchestrator>,
    limiter: Arc<RateLimiter>,
}

#[tool_router]
impl DeepsearchMcpServer {
    /// Research a question on the web and answer it with cited sources.
    #[tool(
        name = "research",
        description = "Research a question on the web. Iteratively plans search queries, reads and summarizes the result pages, and decides when enough is known; then writes a markdown answer with inline source links. Optional `history` supplies earlier conversation turns; optional `max_steps` bounds the research iterations. Returns JSON with the answer and run statistics."
    )]
    async fn research(
        &self,
        Parameters(params): Parameters<ResearchParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if params.question.trim().is_empty() {
            return Err(McpError::invalid_params("question must not be empty", None));
        }
        let conversation = params
            .conversation()
            .map_err(|message| McpError::invalid_params(message, None))?;
        let max_steps = params
            .max_steps
            .unwrap_or(self.orchestrator.config().max_steps);

        self.admit().await?;
        info!(question = %params.question, max_steps, "research requested");

        let outcome = self
            .orchestrator
            .research_with_steps(conversation, max_steps, context.ct.child_token())
            .await
            .map_err(|e| to_mcp_error(&e))?;

        let json = serde_json::to_string_pretty(&outcome)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {e}"), None))?;

        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for DeepsearchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "deepsearch".to_string(),
                title: Some("deepsearch MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "deepsearch: iterative web research agent. Use the `research` tool to answer \
                 questions that need current or sourced information from the web."
                    .to_string(),
            ),
        }
    }
}

impl DeepsearchMcpServer {
    /// Creates a server around an orchestrator and a boundary limiter.
    #[must_use]
    pub fn new(orchestrator: Orchestrator, limiter: Arc<RateLimiter>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            orchestrator: Arc::new(orchestrator),
            limiter,
        }
    }

    /// Creates a server from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the research configuration cannot be loaded from
    /// environment variables or if the provider cannot be created.
    pub fn from_env() -> Result<Self, crate::error::Error> {
        let config = ResearchConfig::from_env()?;
        let search_limiter = Arc::new(RateLimiter::new(config.search_rate_limit.clone()));
        let services = ResearchServices::from_config(
            &config,
            Cache::in_memory(config.cache_ttl),
            search_limiter,
        )?;
        let orchestrator =
            Orchestrator::new(services, config).with_observer(Arc::new(TracingObserver));

        let rpm = std::env::var("DEEPSEARCH_RESEARCH_RPM")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_RESEARCH_RPM);
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests: rpm,
            window: Duration::from_secs(60),
            ..RateLimitConfig::default()
        }));

        Ok(Self::new(orchestrator, limiter))
    }

    /// Admits one research request, waiting for capacity up to the
    /// limiter's retry budget. Check and record are a single step, so
    /// concurrent sessions cannot overshoot the budget.
    async fn admit(&self) -> Result<(), McpError> {
        self.limiter
            .acquire(RESEARCH_RATE_LIMIT_KEY)
            .await
            .map_err(|e| {
                warn!(error = %e, "research request throttled");
                McpError::new(RATE_LIMITED_CODE, e.to_string(), None)
            })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn server(max_requests: u32) -> DeepsearchMcpServer {
        let config = ResearchConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|e| panic!("config: {e}"));
        let services = ResearchServices::from_config(
            &config,
            Cache::disabled(),
            Arc::new(RateLimiter::unlimited()),
        )
        .unwrap_or_else(|e| panic!("services: {e}"));
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            max_retries: 0,
            ..RateLimitConfig::default()
        }));
        DeepsearchMcpServer::new(Orchestrator::new(services, config), limiter)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_admission_never_exceeds_budget() {
        let server = server(10);
        let mut handles = Vec::new();
        for _ in 0..64 {
            let server = server.clone();
            handles.push(tokio::spawn(async move { server.admit().await }));
        }

        let mut admitted = 0;
        let mut throttled = 0;
        for handle in handles {
            match handle.await.unwrap_or_else(|e| panic!("join: {e}")) {
                Ok(()) => admitted += 1,
                Err(e) => {
                    assert_eq!(e.code, RATE_LIMITED_CODE);
                    throttled += 1;
                }
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(throttled, 54);
    }

    #[test]
    fn test_error_mapping() {
        let limited = to_mcp_error(&AgentError::RateLimited {
            key: "search".to_string(),
            retries: 3,
        });
        assert_eq!(limited.code, RATE_LIMITED_CODE);

        let config = to_mcp_error(&AgentError::Config {
            message: "max_steps must be at least 1".to_string(),
        });
        assert_eq!(config.code, ErrorCode::INVALID_PARAMS);

        let cancelled = to_mcp_error(&AgentError::Cancelled);
        assert_eq!(cancelled.code, ErrorCode::INTERNAL_ERROR);
    }
}
