//! Shared fakes for research loop integration tests.
//!
//! Provides a scripted reasoning engine that recognizes each agent by its
//! system prompt, a deterministic search provider, a page fetcher with
//! configurable failures, and an observer that records events.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deepsearch::agent::{
    ChatRequest, ChatResponse, LlmProvider, Orchestrator, PromptSet, ResearchConfig,
    ResearchEvent, ResearchObserver, ResearchServices, TokenUsage,
};
use deepsearch::cache::Cache;
use deepsearch::error::{AgentError, FetchError, SearchError};
use deepsearch::rate_limit::RateLimiter;
use deepsearch::web::{
    CrawlConfig, CrawlEngine, OrganicResult, PageFetcher, SearchExecutor, SearchProvider,
};
use serde_json::json;

/// Which agent issued a reasoning-engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Decide,
    Plan,
    Summarize,
    Answer,
    AnswerForced,
}

/// Decider output continuing research.
pub fn continue_with(feedback: &str) -> String {
    json!({
        "title": "Continuing research",
        "reasoning": "more information needed",
        "type": "continue",
        "feedback": feedback,
    })
    .to_string()
}

/// Decider output answering now.
pub fn answer_now() -> String {
    json!({
        "title": "Answering question",
        "reasoning": "enough information",
        "type": "answer",
        "feedback": null,
    })
    .to_string()
}

/// Planner output with the given queries.
pub fn plan_of(queries: &[&str]) -> String {
    json!({ "plan": "search the basics first", "queries": queries }).to_string()
}

/// Reasoning engine scripted per agent.
///
/// Decider and planner replies are consumed from queues; once a queue is
/// down to one entry, that entry repeats.
pub struct ScriptedLlm {
    prompts: PromptSet,
    decisions: Mutex<VecDeque<String>>,
    plans: Mutex<VecDeque<String>>,
    answer: String,
    decide_delay: Option<Duration>,
    calls: Mutex<Vec<CallKind>>,
    user_messages: Mutex<Vec<(CallKind, String)>>,
}

impl ScriptedLlm {
    /// Answers immediately with `answer`.
    pub fn new(answer: &str) -> Self {
        Self {
            prompts: PromptSet::defaults(),
            decisions: Mutex::new(VecDeque::from([answer_now()])),
            plans: Mutex::new(VecDeque::from([plan_of(&["default query"])])),
            answer: answer.to_string(),
            decide_delay: None,
            calls: Mutex::new(Vec::new()),
            user_messages: Mutex::new(Vec::new()),
        }
    }

    /// Scripts decider replies in order.
    pub fn with_decisions(self, decisions: Vec<String>) -> Self {
        *self.decisions.lock().unwrap() = decisions.into();
        self
    }

    /// Scripts planner replies in order.
    pub fn with_plans(self, plans: Vec<String>) -> Self {
        *self.plans.lock().unwrap() = plans.into();
        self
    }

    /// Delays every decider reply.
    pub fn with_decide_delay(mut self, delay: Duration) -> Self {
        self.decide_delay = Some(delay);
        self
    }

    /// Calls in arrival order.
    pub fn calls(&self) -> Vec<CallKind> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls of one kind.
    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|k| **k == kind).count()
    }

    /// User messages sent by agents of `kind`, in arrival order.
    pub fn user_messages(&self, kind: CallKind) -> Vec<String> {
        self.user_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn classify(&self, system: &str) -> CallKind {
        if system == self.prompts.decider {
            CallKind::Decide
        } else if system == self.prompts.planner {
            CallKind::Plan
        } else if system == self.prompts.summarizer {
            CallKind::Summarize
        } else if system == self.prompts.answer_forced {
            CallKind::AnswerForced
        } else {
            CallKind::Answer
        }
    }

    fn next(queue: &Mutex<VecDeque<String>>) -> String {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }

    fn summarize(prompt: &str) -> String {
        let url = prompt
            .lines()
            .find_map(|line| line.strip_prefix("- URL: "))
            .unwrap_or("unknown");
        let source = if prompt.contains("<page>") { "page" } else { "snippet" };
        format!("Digest of {url} from {source}")
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let system = request
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let user = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let kind = self.classify(system);
        self.calls.lock().unwrap().push(kind);
        self.user_messages.lock().unwrap().push((kind, user.clone()));

        let content = match kind {
            CallKind::Decide => {
                if let Some(delay) = self.decide_delay {
                    tokio::time::sleep(delay).await;
                }
                Self::next(&self.decisions)
            }
            CallKind::Plan => Self::next(&self.plans),
            CallKind::Summarize => Self::summarize(&user),
            CallKind::Answer | CallKind::AnswerForced => self.answer.clone(),
        };

        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: Some("stop".to_string()),
        })
    }
}

/// Search provider returning two stub results per query.
#[derive(Default)]
pub struct FakeSearch {
    failures: Mutex<HashMap<String, SearchError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `query` fail with `error`.
    pub fn fail(self, query: &str, error: SearchError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(query.to_string(), error);
        self
    }

    /// Queries received, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// URL-safe slug of a query.
pub fn slug(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[async_trait]
impl SearchProvider for FakeSearch {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn search(&self, query: &str, num: usize) -> Result<Vec<OrganicResult>, SearchError> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(error) = self.failures.lock().unwrap().get(query) {
            return Err(error.clone());
        }
        let slug = slug(query);
        Ok((1..=2)
            .map(|n| OrganicResult {
                title: format!("{query} result {n}"),
                link: format!("https://stub.example/{slug}/{n}"),
                snippet: format!("Snippet {n} about {query}"),
                date: (n == 1).then(|| "2024-05-01".to_string()),
            })
            .take(num)
            .collect())
    }
}

/// Page fetcher returning stub text, failing for configured URLs.
#[derive(Default)]
pub struct FakeFetcher {
    broken: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `url` fail with a 404.
    pub fn break_url(self, url: &str) -> Self {
        self.broken.lock().unwrap().insert(url.to_string());
        self
    }

    /// Delays every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs fetched, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// URLs whose fetch ran to completion.
    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.finished.lock().unwrap().push(url.to_string());
        if self.broken.lock().unwrap().contains(url) {
            return Err(FetchError::Status(404));
        }
        Ok(format!("Full text of {url}"))
    }
}

/// Observer that records every event.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ResearchEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ResearchEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ResearchObserver for RecordingObserver {
    fn on_event(&self, event: &ResearchEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Test configuration with the given step budget.
pub fn config(max_steps: usize) -> ResearchConfig {
    ResearchConfig::builder()
        .api_key("test-key")
        .max_steps(max_steps)
        .search_results(2)
        .build()
        .expect("valid test config")
}

/// Wires fakes into an orchestrator with default prompts.
pub fn orchestrator(
    llm: &Arc<ScriptedLlm>,
    search: &Arc<FakeSearch>,
    fetcher: &Arc<FakeFetcher>,
    config: ResearchConfig,
) -> Orchestrator {
    let cache = Cache::in_memory(Duration::from_secs(3600));
    let search = SearchExecutor::new(
        Arc::clone(search) as Arc<dyn SearchProvider>,
        Arc::new(RateLimiter::unlimited()),
        cache.clone(),
        Duration::from_secs(5),
    );
    let crawler = CrawlEngine::new(
        Arc::clone(fetcher) as Arc<dyn PageFetcher>,
        cache,
        CrawlConfig {
            concurrency: 3,
            timeout: Duration::from_secs(5),
            retries: 1,
            backoff: Duration::from_millis(10),
        },
    );
    let services = ResearchServices::new(Arc::clone(llm) as Arc<dyn LlmProvider>, search, crawler);
    Orchestrator::new(services, config).with_prompts(PromptSet::defaults())
}
