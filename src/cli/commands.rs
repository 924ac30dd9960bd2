//! Command implementations.
//!
//! Each command builds its services, bridges into async with a tokio
//! runtime and returns the formatted output for `main` to print.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::config::{DEFAULT_SEARCH_TIMEOUT_SECS, ResearchConfig};
use crate::agent::event::TracingObserver;
use crate::agent::message::user_message;
use crate::agent::orchestrator::{Orchestrator, ResearchServices};
use crate::agent::prompt::PromptSet;
use crate::cache::Cache;
use crate::cli::output::{
    OutputFormat, format_crawl_reports, format_outcome, format_search_results,
};
#[cfg(feature = "mcp")]
use crate::cli::parser::McpCommands;
use crate::cli::parser::{Cli, Commands};
use crate::error::{CommandError, Result};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::web::{
    CrawlConfig, CrawlEngine, HttpFetcher, PageReport, SearchExecutor, SerperProvider,
};

/// Parameters for the ask command.
#[derive(Debug, Clone)]
pub struct AskParams<'a> {
    /// Question to research.
    pub question: &'a str,
    /// Iteration budget.
    pub max_steps: usize,
    /// Results per query.
    pub search_results: usize,
    /// Crawl and summary concurrency override.
    pub concurrency: Option<usize>,
    /// Model override for the fast agents.
    pub model: Option<&'a str>,
    /// Model override for the answer.
    pub answer_model: Option<&'a str>,
    /// Prompt directory override.
    pub prompt_dir: Option<&'a Path>,
    /// Wall-clock budget in seconds.
    pub time_budget_secs: Option<u64>,
    /// Disable caching.
    pub no_cache: bool,
}

/// Executes the parsed command and returns its output.
///
/// # Errors
///
/// Returns an error if configuration, the research run or the command
/// itself fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ask {
            question,
            max_steps,
            search_results,
            concurrency,
            model,
            answer_model,
            prompt_dir,
            time_budget_secs,
            no_cache,
        } => {
            let params = AskParams {
                question,
                max_steps: *max_steps,
                search_results: *search_results,
                concurrency: *concurrency,
                model: model.as_deref(),
                answer_model: answer_model.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
                time_budget_secs: *time_budget_secs,
                no_cache: *no_cache,
            };
            cmd_ask(&params, format, cli.verbose)
        }
        Commands::Search { query, num } => cmd_search(query, *num, format),
        Commands::Crawl { urls } => cmd_crawl(urls, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
        #[cfg(feature = "mcp")]
        Commands::Mcp(cmd) => cmd_mcp(cmd),
    }
}

/// Builds the research configuration from env plus CLI overrides.
fn ask_config(params: &AskParams<'_>) -> Result<ResearchConfig> {
    let mut builder = ResearchConfig::builder()
        .from_env()
        .max_steps(params.max_steps)
        .search_results(params.search_results);
    if let Some(n) = params.concurrency {
        builder = builder.crawl_concurrency(n).summary_concurrency(n);
    }
    if let Some(model) = params.model {
        builder = builder
            .decision_model(model)
            .planner_model(model)
            .summarizer_model(model);
    }
    if let Some(model) = params.answer_model {
        builder = builder.answer_model(model);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if let Some(secs) = params.time_budget_secs {
        builder = builder.time_budget(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn cmd_ask(params: &AskParams<'_>, format: OutputFormat, verbose: bool) -> Result<String> {
    if params.question.trim().is_empty() {
        return Err(CommandError::InvalidArgument("question must not be empty".to_string()).into());
    }

    let config = ask_config(params)?;
    let cache = if params.no_cache {
        Cache::disabled()
    } else {
        Cache::in_memory(config.cache_ttl)
    };
    let limiter = Arc::new(RateLimiter::new(config.search_rate_limit.clone()));
    let services = ResearchServices::from_config(&config, cache, limiter)?;
    let orchestrator =
        Orchestrator::new(services, config).with_observer(Arc::new(TracingObserver));

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let token = CancellationToken::new();
        let interrupt = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling research");
                interrupt.cancel();
            }
        });
        orchestrator
            .research(vec![user_message(params.question)], token)
            .await
    })?;

    Ok(format_outcome(&outcome, format, verbose))
}

fn cmd_search(query: &str, num: usize, format: OutputFormat) -> Result<String> {
    if num == 0 {
        return Err(CommandError::InvalidArgument("-n must be at least 1".to_string()).into());
    }

    let executor = SearchExecutor::new(
        Arc::new(SerperProvider::new(std::env::var("SERPER_API_KEY").ok())),
        Arc::new(RateLimiter::new(RateLimitConfig::default())),
        Cache::disabled(),
        Duration::from_secs(DEFAULT_SEARCH_TIMEOUT_SECS),
    );

    let rt = runtime()?;
    let results = rt
        .block_on(executor.search(query, num))
        .map_err(|e| CommandError::ExecutionFailed(format!("Search failed: {e}")))?;

    Ok(format_search_results(&results, format))
}

fn cmd_crawl(urls: &[String], format: OutputFormat) -> Result<String> {
    let fetcher = HttpFetcher::with_defaults()
        .map_err(|e| CommandError::ExecutionFailed(format!("Crawl failed: {e}")))?;
    let engine = CrawlEngine::new(
        Arc::new(fetcher),
        Cache::disabled(),
        CrawlConfig::default(),
    );

    let rt = runtime()?;
    let outcome = rt
        .block_on(engine.crawl(urls))
        .map_err(|e| CommandError::ExecutionFailed(format!("Crawl failed: {e}")))?;

    let reports: Vec<PageReport<'_>> = outcome.results.iter().map(PageReport::from).collect();
    Ok(format_crawl_reports(&reports, format))
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str("  ");
                output.push_str(
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown"),
                );
                output.push('\n');
            }
            output.push_str("\nEdit these files to customize agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

/// Starts the MCP server with the specified transport.
///
/// Runs until the client disconnects (stdio) or the server is stopped (http).
#[cfg(feature = "mcp")]
fn cmd_mcp(cmd: &McpCommands) -> Result<String> {
    use crate::mcp::{DeepsearchMcpServer, serve_http, serve_stdio};

    let McpCommands::Serve {
        transport,
        host,
        port,
    } = cmd;

    let server = DeepsearchMcpServer::from_env().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create MCP server: {e}"))
    })?;

    let rt = runtime()?;
    rt.block_on(async {
        match transport.as_str() {
            "stdio" => serve_stdio(server).await,
            "http" => serve_http(server, host, *port).await,
            other => Err(anyhow::anyhow!("unknown transport '{other}' (expected stdio or http)")),
        }
    })
    .map_err(|e| CommandError::ExecutionFailed(format!("MCP server error: {e}")))?;

    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params(question: &str) -> AskParams<'_> {
        AskParams {
            question,
            max_steps: 3,
            search_results: 4,
            concurrency: Some(2),
            model: Some("fast"),
            answer_model: Some("slow"),
            prompt_dir: None,
            time_budget_secs: Some(30),
            no_cache: false,
        }
    }

    #[test]
    fn test_cmd_init_prompts_writes_then_skips() {
        let dir = TempDir::new().unwrap_or_else(|e| unreachable!("{e}"));
        let first = cmd_init_prompts(Some(dir.path()), OutputFormat::Text)
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(first.starts_with("Wrote 5 prompt template(s)"));

        let second = cmd_init_prompts(Some(dir.path()), OutputFormat::Json)
            .unwrap_or_else(|e| unreachable!("{e}"));
        let value: serde_json::Value = serde_json::from_str(&second).unwrap_or_default();
        assert_eq!(value["count"], 0);
    }

    #[test]
    fn test_cmd_ask_rejects_blank_question() {
        let err = cmd_ask(&params("   "), OutputFormat::Text, false);
        assert!(matches!(
            err,
            Err(crate::error::Error::Command(CommandError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn test_cmd_search_rejects_zero_results() {
        assert!(cmd_search("q", 0, OutputFormat::Text).is_err());
    }

    #[test]
    fn test_cmd_crawl_reports_invalid_url() {
        let output = cmd_crawl(&["not a url".to_string()], OutputFormat::Json)
            .unwrap_or_else(|e| unreachable!("{e}"));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap_or_default();
        assert_eq!(value[0]["url"], "not a url");
        assert!(value[0]["error"].is_string());
    }
}
