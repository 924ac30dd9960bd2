//! CLI layer for deepsearch.
//!
//! Provides the command-line interface using clap, with commands for
//! researching questions and exercising the search and crawl stages.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
#[cfg(feature = "mcp")]
pub use parser::McpCommands;
pub use parser::{Cli, Commands};
