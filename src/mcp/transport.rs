//! Transports for the deepsearch MCP server.
//!
//! `stdio` serves one client (typically an editor or desktop assistant that
//! spawned the process); streamable HTTP serves any number of sessions from
//! one process, all sharing the orchestrator, its cache and the boundary
//! limiter held by [`DeepsearchMcpServer`].

use std::sync::Arc;

use rmcp::ServiceExt;
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::server::DeepsearchMcpServer;

/// Path the streamable HTTP endpoint is mounted at.
const MCP_PATH: &str = "/mcp";

/// Serves the `research` tool to the client on the other end of
/// stdin/stdout.
///
/// Returns once the client closes the stream. Logs go to stderr, so stdout
/// carries JSON-RPC only.
///
/// # Errors
///
/// Returns an error if the initialize handshake fails or the session ends
/// with a transport error.
pub async fn serve_stdio(server: DeepsearchMcpServer) -> anyhow::Result<()> {
    info!("MCP server listening on stdio");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    info!("MCP stdio session closed");
    Ok(())
}

/// Serves the `research` tool over streamable HTTP at `http://{host}:{port}/mcp`.
///
/// Every session gets a clone of `server`, so research runs from different
/// clients share one cache and count against one research rate limit.
/// Ctrl-C stops accepting connections and cancels open sessions.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the HTTP server fails.
pub async fn serve_http(server: DeepsearchMcpServer, host: &str, port: u16) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            cancellation_token: shutdown.child_token(),
            ..Default::default()
        },
    );

    let router = axum::Router::new().nest_service(MCP_PATH, service);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(endpoint = %format!("http://{addr}{MCP_PATH}"), "MCP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down MCP server");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
