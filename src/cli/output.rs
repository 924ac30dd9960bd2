//! Output formatting for CLI commands.

use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::agent::ResearchOutcome;
use crate::agent::synthesizer::contains_markdown_link;
use crate::web::{PageReport, SearchResult};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON, or an error object on failure.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
    }
}

/// Formats a research outcome: the answer followed by a run footer.
#[must_use]
pub fn format_outcome(outcome: &ResearchOutcome, format: OutputFormat, verbose: bool) -> String {
    if format == OutputFormat::Json {
        return format.to_json(outcome);
    }

    let mut output = outcome.answer.clone();
    let forced = if outcome.forced { " (forced)" } else { "" };
    let _ = write!(
        output,
        "\n\n---\nSteps: {}{forced} | Searches: {} | Pages: {} ({} failed) | Summaries failed: {} | Tokens: {} | Time: {:.1}s",
        outcome.steps,
        outcome.searches,
        outcome.urls_crawled,
        outcome.crawl_failures,
        outcome.summary_failures,
        outcome.total_tokens,
        outcome.elapsed.as_secs_f64()
    );
    if verbose {
        for query in &outcome.queries {
            let _ = write!(output, "\nQuery: {query}");
        }
        if !contains_markdown_link(&outcome.answer) {
            output.push_str("\nWarning: answer contains no markdown source links");
        }
    }
    output.push('\n');
    output
}

/// Formats search results.
#[must_use]
pub fn format_search_results(results: &[SearchResult], format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(results);
    }
    if results.is_empty() {
        return "No results.\n".to_string();
    }

    let mut output = String::new();
    for (idx, result) in results.iter().enumerate() {
        let _ = writeln!(output, "{}. {}", idx + 1, result.title);
        let _ = writeln!(output, "   {}", result.url);
        if let Some(date) = &result.published_date {
            let _ = writeln!(output, "   {date}");
        }
        if !result.snippet.is_empty() {
            let _ = writeln!(output, "   {}", result.snippet);
        }
    }
    output
}

/// Formats per-URL crawl reports.
#[must_use]
pub fn format_crawl_reports(reports: &[PageReport<'_>], format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(reports);
    }

    let mut output = String::new();
    for report in reports {
        match (&report.error, report.chars) {
            (Some(error), _) => {
                let _ = writeln!(output, "fail  {} ({error})", report.url);
            }
            (None, chars) => {
                let _ = writeln!(output, "ok    {} ({} chars)", report.url, chars.unwrap_or(0));
            }
        }
    }
    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    let _ = writeln!(output, "\n{} fetched, {failed} failed", reports.len() - failed);
    output
}
