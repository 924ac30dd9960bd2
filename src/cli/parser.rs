//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::config::{DEFAULT_MAX_STEPS, DEFAULT_SEARCH_RESULTS};

/// deepsearch: iterative web research agent.
///
/// Decides, searches, crawls and summarizes in a loop until it can answer
/// a question with cited sources.
#[derive(Parser, Debug)]
#[command(name = "deepsearch")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a question and print a cited answer.
    ///
    /// Requires `OPENAI_API_KEY` (or `DEEPSEARCH_API_KEY`) and
    /// `SERPER_API_KEY`. Press Ctrl-C to cancel.
    #[command(after_help = r#"Examples:
  deepsearch ask "What is the capital of France?"
  deepsearch ask "Latest stable Rust release and its headline features" --max-steps 4
  deepsearch ask "Compare tokio and async-std" --answer-model gpt-4o --verbose
  deepsearch --format json ask "Who won the 2022 World Cup?" | jq '.answer'
"#)]
    Ask {
        /// The question to research.
        question: String,

        /// Maximum research iterations before the answer is forced.
        #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
        max_steps: usize,

        /// Search results requested per query.
        #[arg(short = 'n', long, default_value_t = DEFAULT_SEARCH_RESULTS)]
        search_results: usize,

        /// Concurrent page fetches and summaries.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Model for the decider, planner and summarizer.
        #[arg(long)]
        model: Option<String>,

        /// Model for the final answer.
        #[arg(long)]
        answer_model: Option<String>,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,

        /// Wall-clock budget in seconds; the run is cancelled when it elapses.
        #[arg(long)]
        time_budget_secs: Option<u64>,

        /// Disable the search and page cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// Run a single web search.
    #[command(after_help = r#"Examples:
  deepsearch search "rust async runtimes"
  deepsearch search "tokio release notes" -n 3
  deepsearch --format json search "serde derive" | jq '.[].url'
"#)]
    Search {
        /// Search query text.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'n', long, default_value_t = DEFAULT_SEARCH_RESULTS)]
        num: usize,
    },

    /// Fetch pages and report per-URL extraction status.
    #[command(after_help = r#"Examples:
  deepsearch crawl https://www.rust-lang.org/
  deepsearch crawl https://a.example https://b.example --format json
"#)]
    Crawl {
        /// URLs to fetch.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Write default prompt templates to disk for customization.
    ///
    /// Creates markdown template files in the prompt directory so users
    /// can customize agent system prompts without recompiling.
    #[command(name = "init-prompts")]
    #[command(after_help = r#"Examples:
  deepsearch init-prompts                      # Write to ~/.config/deepsearch/prompts/
  deepsearch init-prompts --dir ./my-prompts   # Write to custom directory
"#)]
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/deepsearch/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Start MCP (Model Context Protocol) server.
    #[cfg(feature = "mcp")]
    #[command(subcommand)]
    Mcp(McpCommands),
}

/// MCP server subcommands.
#[cfg(feature = "mcp")]
#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// Serve the `research` tool.
    #[command(after_help = r#"Examples:
  deepsearch mcp serve                                   # stdio transport
  deepsearch mcp serve --transport http --port 8080      # streamable HTTP at /mcp
"#)]
    Serve {
        /// Transport: stdio or http.
        #[arg(long, default_value = "stdio")]
        transport: String,

        /// Host to bind (http transport).
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind (http transport).
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}
