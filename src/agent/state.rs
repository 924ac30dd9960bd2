//! Per-question research state.
//!
//! [`ResearchState`] is owned by the orchestrator for one question. It
//! counts iterations, accumulates search records append-only, and renders
//! the text projections handed to the decider, planner and synthesizer.
//! Rendering is a pure function of the state.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, Role};
use crate::web::SearchResult;

/// One executed query and its results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Query as planned.
    pub query: String,
    /// Results in provider order.
    pub results: Vec<SearchResult>,
}

impl SearchRecord {
    /// Iterates the results whose summary is available.
    pub fn completed(&self) -> impl Iterator<Item = &SearchResult> {
        self.results.iter().filter(|r| r.is_complete())
    }
}

/// Accumulated knowledge for one research run.
#[derive(Debug, Clone)]
pub struct ResearchState {
    step: usize,
    max_steps: usize,
    search_records: Vec<SearchRecord>,
    conversation: Vec<ChatMessage>,
}

impl ResearchState {
    /// Creates the state for a conversation with a step budget.
    #[must_use]
    pub const fn new(conversation: Vec<ChatMessage>, max_steps: usize) -> Self {
        Self {
            step: 0,
            max_steps,
            search_records: Vec::new(),
            conversation,
        }
    }

    /// Iterations completed so far.
    #[must_use]
    pub const fn step(&self) -> usize {
        self.step
    }

    /// Iteration budget.
    #[must_use]
    pub const fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Recorded searches, oldest first.
    #[must_use]
    pub fn records(&self) -> &[SearchRecord] {
        &self.search_records
    }

    /// The conversation the run started from.
    #[must_use]
    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    /// Appends a search record. Repeated queries are kept.
    pub fn report_search(&mut self, record: SearchRecord) {
        self.search_records.push(record);
    }

    /// Advances the iteration counter.
    pub const fn increment_step(&mut self) {
        self.step += 1;
    }

    /// Returns `true` once the iteration budget is spent.
    #[must_use]
    pub const fn should_stop(&self) -> bool {
        self.step >= self.max_steps
    }

    /// Latest user message, if any.
    #[must_use]
    pub fn user_question(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Renders the search history.
    ///
    /// Each record becomes a `## Query: "<query>"` section listing its
    /// completed results; results still awaiting a summary are omitted.
    #[must_use]
    pub fn render_history(&self) -> String {
        let mut sections = Vec::with_capacity(self.search_records.len());
        for record in &self.search_records {
            let mut parts = vec![format!("## Query: \"{}\"", record.query)];
            parts.extend(record.completed().map(render_result));
            sections.push(parts.join("\n\n"));
        }
        sections.join("\n\n")
    }

    /// Renders the conversation as `<User>`/`<Assistant>` blocks.
    #[must_use]
    pub fn render_conversation(&self) -> String {
        let mut out = String::new();
        for message in &self.conversation {
            let tag = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => continue,
            };
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            let _ = write!(out, "<{tag}>\n{}\n</{tag}>", message.content);
        }
        out
    }
}

fn render_result(result: &SearchResult) -> String {
    let heading = match result.published_date.as_deref() {
        Some(date) => format!("### {date} - {}", result.title),
        None => format!("### {}", result.title),
    };
    let summary = result.summary.as_deref().unwrap_or_default();
    [
        heading,
        result.url.clone(),
        result.snippet.clone(),
        format!("<summary>\n{summary}\n</summary>"),
    ]
    .join("\n\n")
}
