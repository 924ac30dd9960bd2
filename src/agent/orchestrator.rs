//! Orchestrator for the iterative research loop.
//!
//! Coordinates the full pipeline: decide → plan → (search → crawl →
//! summarize per query, concurrently) → record → repeat, until the decider
//! answers or the step budget forces an answer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::action::Action;
use super::client::create_provider;
use super::config::ResearchConfig;
use super::decider::DeciderAgent;
use super::event::{NoopObserver, ResearchEvent, ResearchObserver};
use super::message::{ChatMessage, Role, TokenUsage};
use super::planner::PlannerAgent;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::state::{ResearchState, SearchRecord};
use super::summarizer::{Summarizer, SummarizerAgent};
use super::synthesizer::{AnswerMode, SynthesizerAgent};
use crate::cache::Cache;
use crate::error::{AgentError, SearchError};
use crate::rate_limit::RateLimiter;
use crate::web::{CrawlEngine, HttpFetcher, SearchExecutor, SerperProvider};

/// Shared external services, constructed once per process and injected.
#[derive(Clone)]
pub struct ResearchServices {
    /// Reasoning engine.
    pub provider: Arc<dyn LlmProvider>,
    /// Rate-limited, cached search.
    pub search: SearchExecutor,
    /// Concurrent, cached page fetching.
    pub crawler: CrawlEngine,
}

impl ResearchServices {
    /// Bundles already-built services.
    #[must_use]
    pub const fn new(
        provider: Arc<dyn LlmProvider>,
        search: SearchExecutor,
        crawler: CrawlEngine,
    ) -> Self {
        Self {
            provider,
            search,
            crawler,
        }
    }

    /// Builds the production services (configured provider, Serper search,
    /// HTTP fetcher) over a shared cache and limiter.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnsupportedProvider`] for unknown providers and
    /// [`AgentError::Config`] when the HTTP fetcher cannot be built.
    pub fn from_config(
        config: &ResearchConfig,
        cache: Cache,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, AgentError> {
        let provider = create_provider(config)?;
        let search = SearchExecutor::new(
            Arc::new(SerperProvider::new(config.serper_api_key.clone())),
            limiter,
            cache.clone(),
            config.search_timeout,
        );
        let crawler = CrawlEngine::new(
            Arc::new(
                HttpFetcher::new(config.fetch_timeout, config.max_page_chars).map_err(|e| {
                    AgentError::Config {
                        message: e.to_string(),
                    }
                })?,
            ),
            cache,
            config.crawl_config(),
        );
        Ok(Self::new(provider, search, crawler))
    }
}

impl std::fmt::Debug for ResearchServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchServices")
            .field("provider", &self.provider.name())
            .field("search", &self.search)
            .field("crawler", &self.crawler)
            .finish()
    }
}

/// Result of one research run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    /// Final markdown answer.
    pub answer: String,
    /// Whether the step budget forced the answer.
    pub forced: bool,
    /// Research iterations completed.
    pub steps: usize,
    /// Queries executed, in execution order.
    pub queries: Vec<String>,
    /// Searches recorded.
    pub searches: usize,
    /// Pages requested.
    pub urls_crawled: usize,
    /// Pages that failed to fetch.
    pub crawl_failures: usize,
    /// Summaries that failed or timed out.
    pub summary_failures: usize,
    /// Tokens used across all agents.
    pub total_tokens: u32,
    /// Wall-clock time of the run.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Counters accumulated over a run.
#[derive(Debug, Default, Clone, Copy)]
struct RunStats {
    urls_crawled: usize,
    crawl_failures: usize,
    summary_failures: usize,
    usage: TokenUsage,
}

impl RunStats {
    const fn absorb(&mut self, other: Self) {
        self.urls_crawled += other.urls_crawled;
        self.crawl_failures += other.crawl_failures;
        self.summary_failures += other.summary_failures;
        self.usage.accumulate(other.usage);
    }
}

/// Outcome of one query's search → crawl → summarize pipeline.
#[derive(Debug)]
struct QueryOutcome {
    record: Option<SearchRecord>,
    stats: RunStats,
}

/// Per-query pipeline, cloned into each spawned task.
#[derive(Clone)]
struct QueryPipeline {
    search: SearchExecutor,
    crawler: CrawlEngine,
    summarizer: Summarizer,
    observer: Arc<dyn ResearchObserver>,
    search_results: usize,
}

impl QueryPipeline {
    async fn run(self, query: String, conversation: Arc<str>) -> Result<QueryOutcome, AgentError> {
        let mut stats = RunStats::default();

        let results = match self.search.search(&query, self.search_results).await {
            Ok(results) => results,
            Err(SearchError::RateLimited { key, retries }) => {
                return Err(AgentError::RateLimited { key, retries });
            }
            Err(e) => {
                warn!(query = %query, error = %e, "search failed, skipping query");
                self.observer.on_event(&ResearchEvent::SearchFailed {
                    query,
                    error: e.to_string(),
                });
                return Ok(QueryOutcome {
                    record: None,
                    stats,
                });
            }
        };

        self.observer.on_event(&ResearchEvent::SearchCompleted {
            query: query.clone(),
            results: results.len(),
        });

        if results.is_empty() {
            return Ok(QueryOutcome {
                record: Some(SearchRecord {
                    query,
                    results,
                }),
                stats,
            });
        }

        let urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        let crawl = self.crawler.crawl(&urls).await?;
        stats.urls_crawled = urls.len();
        stats.crawl_failures = crawl.failures();
        self.observer.on_event(&ResearchEvent::PagesCrawled {
            query: query.clone(),
            urls: urls.len(),
            failed: stats.crawl_failures,
        });

        let pages: Vec<Option<String>> = crawl
            .results
            .into_iter()
            .map(|page| page.result.ok())
            .collect();
        let batch = self
            .summarizer
            .summarize_batch(&query, &conversation, results, pages)
            .await;
        stats.summary_failures = batch.failures;
        stats.usage = batch.usage;

        Ok(QueryOutcome {
            record: Some(SearchRecord {
                query,
                results: batch.results,
            }),
            stats,
        })
    }
}

/// Drives the research loop for one question at a time.
pub struct Orchestrator {
    services: ResearchServices,
    config: ResearchConfig,
    prompts: PromptSet,
    observer: Arc<dyn ResearchObserver>,
}

impl Orchestrator {
    /// Creates a new orchestrator with the given services and configuration.
    ///
    /// Loads prompt templates from [`ResearchConfig::prompt_dir`], falling
    /// back to compiled-in defaults.
    #[must_use]
    pub fn new(services: ResearchServices, config: ResearchConfig) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self {
            services,
            config,
            prompts,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the prompt set.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Sets the progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ResearchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Researches the latest user question in `conversation`.
    ///
    /// Runs until the decider answers or `max_steps` iterations have been
    /// spent, in which case the answer is forced. `cancel` (and the
    /// configured time budget) abandon the run; nothing from an abandoned
    /// iteration is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] on cancellation,
    /// [`AgentError::SchemaViolation`] for undecodable decider or planner
    /// output, [`AgentError::RateLimited`] when the search budget stays
    /// exhausted, and provider errors from the decider, planner or
    /// synthesizer. Search, fetch and summary failures are absorbed.
    pub async fn research(
        &self,
        conversation: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<ResearchOutcome, AgentError> {
        self.research_with_steps(conversation, self.config.max_steps, cancel)
            .await
    }

    /// Same as [`research`](Self::research) with a per-run step budget.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] when `max_steps` is zero, otherwise as
    /// [`research`](Self::research).
    pub async fn research_with_steps(
        &self,
        conversation: Vec<ChatMessage>,
        max_steps: usize,
        cancel: CancellationToken,
    ) -> Result<ResearchOutcome, AgentError> {
        if max_steps == 0 {
            return Err(AgentError::Config {
                message: "max_steps must be at least 1".to_string(),
            });
        }
        let has_question = conversation
            .iter()
            .any(|m| m.role == Role::User && !m.content.trim().is_empty());
        if !has_question {
            return Err(AgentError::Orchestration {
                message: "conversation contains no user question".to_string(),
            });
        }

        let token = cancel.child_token();
        let budget_timer = self.config.time_budget.map(|budget| {
            let timer_token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                warn!(budget = ?budget, "time budget elapsed, cancelling research");
                timer_token.cancel();
            })
        });

        let result = self.run(conversation, max_steps, &token).await;

        if let Some(timer) = budget_timer {
            timer.abort();
        }
        result
    }

    async fn run(
        &self,
        conversation: Vec<ChatMessage>,
        max_steps: usize,
        token: &CancellationToken,
    ) -> Result<ResearchOutcome, AgentError> {
        let start = Instant::now();
        let current_date = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string();
        let mut state = ResearchState::new(conversation, max_steps);
        let mut stats = RunStats::default();
        let decider = DeciderAgent::new(&self.config, self.prompts.decider.clone());
        let planner = PlannerAgent::new(&self.config, self.prompts.planner.clone());
        let provider = self.services.provider.as_ref();

        while !state.should_stop() {
            if token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let (decision, usage) = cancellable(token, decider.decide(provider, &state)).await?;
            stats.usage.accumulate(usage);
            self.observer.on_event(&ResearchEvent::ActionChosen {
                step: state.step(),
                title: decision.title.clone(),
                reasoning: decision.reasoning.clone(),
                action: decision.action.clone(),
            });

            let feedback = match decision.action {
                Action::Answer => {
                    return self
                        .finish(&state, AnswerMode::Normal, stats, &current_date, start, token)
                        .await;
                }
                Action::Continue { feedback } => feedback,
            };

            let (records, iteration_stats) = cancellable(
                token,
                self.iterate(&planner, &state, feedback.as_deref(), &current_date),
            )
            .await?;

            for record in records {
                state.report_search(record);
            }
            stats.absorb(iteration_stats);
            state.increment_step();
            debug!(step = state.step(), records = state.records().len(), "iteration complete");
        }

        info!(max_steps = state.max_steps(), "step budget exhausted, forcing answer");
        self.finish(&state, AnswerMode::Forced, stats, &current_date, start, token)
            .await
    }

    /// Plans and executes one iteration, returning records in plan order.
    async fn iterate(
        &self,
        planner: &PlannerAgent,
        state: &ResearchState,
        feedback: Option<&str>,
        current_date: &str,
    ) -> Result<(Vec<SearchRecord>, RunStats), AgentError> {
        let mut stats = RunStats::default();
        let (plan, usage) = planner
            .plan(self.services.provider.as_ref(), state, feedback, current_date)
            .await?;
        stats.usage.accumulate(usage);
        self.observer.on_event(&ResearchEvent::QueriesPlanned {
            step: state.step(),
            plan: plan.plan.clone(),
            queries: plan.queries.clone(),
        });

        let pipeline = QueryPipeline {
            search: self.services.search.clone(),
            crawler: self.services.crawler.clone(),
            summarizer: Summarizer::new(
                SummarizerAgent::new(&self.config, self.prompts.summarizer.clone()),
                Arc::clone(&self.services.provider),
                self.config.summary_concurrency,
                self.config.summary_timeout,
            ),
            observer: Arc::clone(&self.observer),
            search_results: self.config.search_results,
        };
        let conversation: Arc<str> = Arc::from(state.render_conversation());

        let query_count = plan.queries.len();
        // Dropping the set (cancellation) aborts every query still in
        // flight, and with it the crawl and summary tasks it owns.
        let mut tasks = JoinSet::new();
        for (idx, query) in plan.queries.into_iter().enumerate() {
            let pipeline = pipeline.clone();
            let conversation = Arc::clone(&conversation);
            tasks.spawn(async move { (idx, pipeline.run(query, conversation).await) });
        }

        let mut outcomes: Vec<Option<Result<QueryOutcome, AgentError>>> =
            std::iter::repeat_with(|| None).take(query_count).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    if let Some(slot) = outcomes.get_mut(idx) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => warn!(error = %e, "query task failed"),
            }
        }

        let mut records = Vec::with_capacity(query_count);
        let mut first_error = None;
        for outcome in outcomes {
            let outcome = outcome.unwrap_or_else(|| {
                Err(AgentError::Orchestration {
                    message: "query task did not complete".to_string(),
                })
            });
            match outcome {
                Ok(outcome) => {
                    stats.absorb(outcome.stats);
                    records.extend(outcome.record);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok((records, stats)),
        }
    }

    async fn finish(
        &self,
        state: &ResearchState,
        mode: AnswerMode,
        mut stats: RunStats,
        current_date: &str,
        start: Instant,
        token: &CancellationToken,
    ) -> Result<ResearchOutcome, AgentError> {
        self.observer.on_event(&ResearchEvent::Answering { mode });
        let synthesizer = SynthesizerAgent::new(&self.config, &self.prompts, mode);
        let response = cancellable(
            token,
            synthesizer.answer(self.services.provider.as_ref(), state, current_date),
        )
        .await?;
        stats.usage.accumulate(response.usage);

        let outcome = ResearchOutcome {
            answer: response.content,
            forced: mode == AnswerMode::Forced,
            steps: state.step(),
            queries: state.records().iter().map(|r| r.query.clone()).collect(),
            searches: state.records().len(),
            urls_crawled: stats.urls_crawled,
            crawl_failures: stats.crawl_failures,
            summary_failures: stats.summary_failures,
            total_tokens: stats.usage.total_tokens,
            elapsed: start.elapsed(),
        };
        info!(
            steps = outcome.steps,
            forced = outcome.forced,
            searches = outcome.searches,
            tokens = outcome.total_tokens,
            "research complete"
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("services", &self.services)
            .field("max_steps", &self.config.max_steps)
            .finish_non_exhaustive()
    }
}

/// Races `fut` against cancellation of `token`.
async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(AgentError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_elapsed_millis() {
        let outcome = ResearchOutcome {
            answer: "Paris.".to_string(),
            forced: false,
            steps: 1,
            queries: vec!["capital of France".to_string()],
            searches: 1,
            urls_crawled: 3,
            crawl_failures: 1,
            summary_failures: 0,
            total_tokens: 120,
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&outcome).unwrap_or_default();
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["forced"], false);
        assert_eq!(json["queries"][0], "capital of France");
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = cancellable(&token, async { Ok::<_, AgentError>(1) }).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));

        let fresh = CancellationToken::new();
        let result = cancellable(&fresh, async { Ok::<_, AgentError>(2) }).await;
        assert_eq!(result.ok(), Some(2));
    }
}
