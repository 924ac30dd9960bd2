//! Progress events emitted by the research loop.
//!
//! Observers are one-way sinks: they cannot influence control flow, and a
//! slow observer only delays the loop by the time its callback takes.

use serde::Serialize;

use super::action::Action;
use super::synthesizer::AnswerMode;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// The decider chose an action.
    ActionChosen {
        /// Zero-based iteration.
        step: usize,
        /// Short display label.
        title: String,
        /// Decider reasoning.
        reasoning: String,
        /// The action.
        action: Action,
    },
    /// The planner produced queries.
    QueriesPlanned {
        /// Zero-based iteration.
        step: usize,
        /// Plan text.
        plan: String,
        /// Queries in execution order.
        queries: Vec<String>,
    },
    /// A query returned results.
    SearchCompleted {
        /// The query.
        query: String,
        /// Results returned.
        results: usize,
    },
    /// A query failed and contributes nothing this iteration.
    SearchFailed {
        /// The query.
        query: String,
        /// Failure description.
        error: String,
    },
    /// A query's pages were fetched and summarized.
    PagesCrawled {
        /// The query.
        query: String,
        /// Pages requested.
        urls: usize,
        /// Pages that failed to fetch.
        failed: usize,
    },
    /// The synthesizer started writing the answer.
    Answering {
        /// Answer mode.
        mode: AnswerMode,
    },
}

/// Receives [`ResearchEvent`]s.
pub trait ResearchObserver: Send + Sync {
    /// Called for each event, in emission order.
    fn on_event(&self, event: &ResearchEvent);
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResearchObserver for NoopObserver {
    fn on_event(&self, _event: &ResearchEvent) {}
}

/// Observer that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ResearchObserver for TracingObserver {
    fn on_event(&self, event: &ResearchEvent) {
        match event {
            ResearchEvent::ActionChosen { step, title, .. } => {
                tracing::info!(step, title = %title, "action chosen");
            }
            ResearchEvent::QueriesPlanned { step, queries, .. } => {
                tracing::info!(step, queries = ?queries, "queries planned");
            }
            ResearchEvent::SearchCompleted { query, results } => {
                tracing::info!(query = %query, results, "search completed");
            }
            ResearchEvent::SearchFailed { query, error } => {
                tracing::warn!(query = %query, error = %error, "search failed");
            }
            ResearchEvent::PagesCrawled { query, urls, failed } => {
                tracing::info!(query = %query, urls, failed, "pages crawled");
            }
            ResearchEvent::Answering { mode } => {
                tracing::info!(mode = ?mode, "answering");
            }
        }
    }
}
