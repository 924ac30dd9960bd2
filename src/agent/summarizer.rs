//! Page summarizer agent and its batch fan-out.
//!
//! Each search result is condensed into a query-relevant digest. A batch
//! is summarized concurrently under a semaphore; every summary has its own
//! timeout and a failure degrades that result to an empty digest instead
//! of failing the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::config::ResearchConfig;
use super::message::TokenUsage;
use super::prompt::{PageContext, build_summarizer_prompt};
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::error::AgentError;
use crate::web::SearchResult;

/// Agent that condenses one page for one query.
pub struct SummarizerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SummarizerAgent {
    /// Creates a new summarizer with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &ResearchConfig, system_prompt: String) -> Self {
        Self {
            model: config.summarizer_model.clone(),
            max_tokens: config.summary_max_tokens,
            system_prompt,
        }
    }

    /// Summarizes one page.
    ///
    /// # Errors
    ///
    /// Returns provider errors unchanged.
    pub async fn summarize(
        &self,
        provider: &dyn LlmProvider,
        conversation: &str,
        page: &PageContext<'_>,
    ) -> Result<(String, TokenUsage), AgentError> {
        let user_msg = build_summarizer_prompt(conversation, page);
        let response = self.execute(provider, &user_msg).await?;
        Ok((response.content.trim().to_string(), response.usage))
    }
}

#[async_trait]
impl Agent for SummarizerAgent {
    fn name(&self) -> &'static str {
        "summarizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Summarized results of one query.
#[derive(Debug, Clone)]
pub struct SummaryBatch {
    /// Results in input order, each with `summary` set.
    pub results: Vec<SearchResult>,
    /// Summaries that failed or timed out.
    pub failures: usize,
    /// Tokens used by successful summaries.
    pub usage: TokenUsage,
}

/// Bounded-concurrency summarization of result batches.
#[derive(Clone)]
pub struct Summarizer {
    agent: Arc<SummarizerAgent>,
    provider: Arc<dyn LlmProvider>,
    concurrency: usize,
    timeout: Duration,
}

impl Summarizer {
    /// Creates a summarizer over `provider`.
    #[must_use]
    pub fn new(
        agent: SummarizerAgent,
        provider: Arc<dyn LlmProvider>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            provider,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Summarizes every result of `query`.
    ///
    /// `pages[i]` holds the crawled text of `results[i]`, or `None` when the
    /// fetch failed; such results are summarized from their snippet.
    pub async fn summarize_batch(
        &self,
        query: &str,
        conversation: &str,
        results: Vec<SearchResult>,
        pages: Vec<Option<String>>,
    ) -> SummaryBatch {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let query: Arc<str> = Arc::from(query);
        let conversation: Arc<str> = Arc::from(conversation);

        // Dropping the set aborts every summary still in flight.
        let mut tasks = JoinSet::new();
        for (idx, result) in results.iter().enumerate() {
            let result = result.clone();
            let page = pages.get(idx).cloned().flatten();
            let sem = Arc::clone(&semaphore);
            let agent = Arc::clone(&self.agent);
            let provider = Arc::clone(&self.provider);
            let query = Arc::clone(&query);
            let conversation = Arc::clone(&conversation);
            let timeout = self.timeout;

            tasks.spawn(async move {
                let outcome = async {
                    let _permit = sem.acquire().await.map_err(|e| AgentError::Orchestration {
                        message: format!("semaphore acquire failed: {e}"),
                    })?;
                    let context = PageContext {
                        query: &query,
                        title: &result.title,
                        url: &result.url,
                        date: result.published_date.as_deref(),
                        snippet: &result.snippet,
                        content: page.as_deref(),
                    };
                    tokio::time::timeout(
                        timeout,
                        agent.summarize(provider.as_ref(), &conversation, &context),
                    )
                    .await
                    .map_err(|_| AgentError::Orchestration {
                        message: format!("summary timed out after {timeout:?}"),
                    })?
                }
                .await;
                (idx, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<(String, TokenUsage), AgentError>>> =
            std::iter::repeat_with(|| None).take(results.len()).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    if let Some(slot) = outcomes.get_mut(idx) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => warn!(error = %e, "summary task failed"),
            }
        }

        let mut batch = SummaryBatch {
            results: Vec::with_capacity(results.len()),
            failures: 0,
            usage: TokenUsage::default(),
        };
        for (mut result, outcome) in results.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                Err(AgentError::Orchestration {
                    message: "summary task did not complete".to_string(),
                })
            });
            match outcome {
                Ok((summary, usage)) => {
                    batch.usage.accumulate(usage);
                    result.summary = Some(summary);
                }
                Err(e) => {
                    warn!(url = %result.url, error = %e, "summary failed, keeping empty digest");
                    batch.failures += 1;
                    result.summary = Some(String::new());
                }
            }
            batch.results.push(result);
        }

        debug!(
            query = %query,
            results = batch.results.len(),
            failures = batch.failures,
            "summaries completed"
        );
        batch
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("model", &self.agent.model)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
