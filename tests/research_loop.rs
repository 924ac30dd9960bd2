//! End-to-end tests for the research loop over scripted fakes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    CallKind, FakeFetcher, FakeSearch, RecordingObserver, ScriptedLlm, answer_now, continue_with,
    orchestrator, plan_of,
};
use deepsearch::agent::message::{assistant_message, user_message};
use deepsearch::agent::synthesizer::contains_markdown_link;
use deepsearch::agent::{Action, AnswerMode, ResearchEvent, ResearchObserver};
use deepsearch::error::{AgentError, SearchError};
use deepsearch::rate_limit::RateLimitConfig;
use tokio_util::sync::CancellationToken;

const PARIS_ANSWER: &str =
    "The capital of France is Paris [Paris - Wikipedia](https://stub.example/paris).";

fn fakes(llm: ScriptedLlm) -> (Arc<ScriptedLlm>, Arc<FakeSearch>, Arc<FakeFetcher>) {
    (
        Arc::new(llm),
        Arc::new(FakeSearch::new()),
        Arc::new(FakeFetcher::new()),
    )
}

#[tokio::test]
async fn test_capital_of_france_answers_without_searching() {
    let (llm, search, fetcher) = fakes(ScriptedLlm::new(PARIS_ANSWER));
    let outcome = orchestrator(&llm, &search, &fetcher, common::config(5))
        .research(
            vec![user_message("What is the capital of France?")],
            CancellationToken::new(),
        )
        .await
        .expect("research succeeds");

    assert_eq!(llm.calls(), vec![CallKind::Decide, CallKind::Answer]);
    assert!(search.calls().is_empty());
    assert!(fetcher.calls().is_empty());
    assert!(!outcome.forced);
    assert_eq!(outcome.steps, 0);
    assert_eq!(outcome.searches, 0);
    assert!(outcome.answer.contains("https://stub.example/paris"));
    assert!(contains_markdown_link(&outcome.answer));
    assert_eq!(outcome.total_tokens, 30);
}

#[tokio::test]
async fn test_forced_completion_after_max_steps() {
    let llm = ScriptedLlm::new("Best effort answer.")
        .with_decisions(vec![continue_with("still missing facts")])
        .with_plans(vec![plan_of(&["first"]), plan_of(&["second"]), plan_of(&["third"])]);
    let (llm, search, fetcher) = fakes(llm);
    let observer = Arc::new(RecordingObserver::default());

    let outcome = orchestrator(&llm, &search, &fetcher, common::config(3))
        .with_observer(Arc::clone(&observer) as Arc<dyn ResearchObserver>)
        .research(vec![user_message("Unanswerable?")], CancellationToken::new())
        .await
        .expect("forced answer is not an error");

    assert_eq!(llm.count(CallKind::Decide), 3);
    assert_eq!(llm.count(CallKind::Plan), 3);
    assert_eq!(llm.count(CallKind::AnswerForced), 1);
    assert_eq!(llm.count(CallKind::Answer), 0);
    assert!(outcome.forced);
    assert_eq!(outcome.steps, 3);
    assert_eq!(outcome.queries, vec!["first", "second", "third"]);
    assert_eq!(search.calls(), vec!["first", "second", "third"]);

    let last = observer.events().pop();
    assert_eq!(
        last,
        Some(ResearchEvent::Answering {
            mode: AnswerMode::Forced
        })
    );
}

#[tokio::test]
async fn test_iteration_feeds_history_and_feedback_forward() {
    let llm = ScriptedLlm::new(PARIS_ANSWER)
        .with_decisions(vec![continue_with("need the population"), answer_now()])
        .with_plans(vec![plan_of(&["paris population", "paris area"])]);
    let (llm, search, fetcher) = fakes(llm);
    let observer = Arc::new(RecordingObserver::default());

    let outcome = orchestrator(&llm, &search, &fetcher, common::config(5))
        .with_observer(Arc::clone(&observer) as Arc<dyn ResearchObserver>)
        .research(
            vec![
                user_message("What is the capital of France?"),
                assistant_message("Paris."),
                user_message("How many people live there?"),
            ],
            CancellationToken::new(),
        )
        .await
        .expect("research succeeds");

    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.queries, vec!["paris population", "paris area"]);
    assert_eq!(outcome.urls_crawled, 4);
    assert_eq!(outcome.crawl_failures, 0);
    assert_eq!(llm.count(CallKind::Summarize), 4);

    let planner_prompt = &llm.user_messages(CallKind::Plan)[0];
    assert!(planner_prompt.contains("<feedback>\nneed the population\n</feedback>"));
    assert!(planner_prompt.contains("<Assistant>\nParis.\n</Assistant>"));

    let decider_prompts = llm.user_messages(CallKind::Decide);
    assert_eq!(decider_prompts.len(), 2);
    assert!(!decider_prompts[0].contains("## Query:"));
    let second = &decider_prompts[1];
    let population = second
        .find("## Query: \"paris population\"")
        .expect("first query rendered");
    let area = second.find("## Query: \"paris area\"").expect("second query rendered");
    assert!(population < area, "records follow plan order");
    assert!(second.contains("### 2024-05-01 - paris population result 1"));
    assert!(second.contains("Digest of https://stub.example/paris-population/1 from page"));

    let answer_prompt = &llm.user_messages(CallKind::Answer)[0];
    assert!(answer_prompt.contains("<question>How many people live there?</question>"));

    let events = observer.events();
    assert!(matches!(
        events.first(),
        Some(ResearchEvent::ActionChosen {
            step: 0,
            action: Action::Continue { .. },
            ..
        })
    ));
    assert!(matches!(events.get(1), Some(ResearchEvent::QueriesPlanned { step: 0, .. })));
    let crawled = events
        .iter()
        .filter(|e| matches!(e, ResearchEvent::PagesCrawled { urls: 2, failed: 0, .. }))
        .count();
    assert_eq!(crawled, 2);
    assert_eq!(
        events.last(),
        Some(&ResearchEvent::Answering {
            mode: AnswerMode::Normal
        })
    );
}

#[tokio::test]
async fn test_partial_failures_are_absorbed() {
    let llm = ScriptedLlm::new(PARIS_ANSWER)
        .with_decisions(vec![continue_with("facts"), answer_now()])
        .with_plans(vec![plan_of(&["good query", "bad query"])]);
    let llm = Arc::new(llm);
    let search = Arc::new(FakeSearch::new().fail(
        "bad query",
        SearchError::Status {
            status: 500,
            body: "upstream down".to_string(),
        },
    ));
    let fetcher = Arc::new(FakeFetcher::new().break_url("https://stub.example/good-query/2"));
    let observer = Arc::new(RecordingObserver::default());

    let outcome = orchestrator(&llm, &search, &fetcher, common::config(5))
        .with_observer(Arc::clone(&observer) as Arc<dyn ResearchObserver>)
        .research(vec![user_message("q")], CancellationToken::new())
        .await
        .expect("partial failures do not fail the run");

    assert_eq!(outcome.searches, 1);
    assert_eq!(outcome.queries, vec!["good query"]);
    assert_eq!(outcome.urls_crawled, 2);
    assert_eq!(outcome.crawl_failures, 1);
    assert_eq!(outcome.summary_failures, 0);

    let decider_prompt = &llm.user_messages(CallKind::Decide)[1];
    assert!(decider_prompt.contains("Digest of https://stub.example/good-query/2 from snippet"));
    assert!(!decider_prompt.contains("bad query"));

    assert!(observer.events().iter().any(|e| matches!(
        e,
        ResearchEvent::SearchFailed { query, .. } if query == "bad query"
    )));
}

#[tokio::test]
async fn test_empty_search_results_are_recorded_without_crawling() {
    struct EmptySearch;

    #[async_trait::async_trait]
    impl deepsearch::web::SearchProvider for EmptySearch {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn search(
            &self,
            _query: &str,
            _num: usize,
        ) -> Result<Vec<deepsearch::web::OrganicResult>, SearchError> {
            Ok(Vec::new())
        }
    }

    let llm = Arc::new(
        ScriptedLlm::new("Nothing found.")
            .with_decisions(vec![continue_with("anything"), answer_now()])
            .with_plans(vec![plan_of(&["obscure"])]),
    );
    let fetcher = Arc::new(FakeFetcher::new());
    let cache = deepsearch::cache::Cache::disabled();
    let services = deepsearch::agent::ResearchServices::new(
        Arc::clone(&llm) as Arc<dyn deepsearch::agent::LlmProvider>,
        deepsearch::web::SearchExecutor::new(
            Arc::new(EmptySearch),
            Arc::new(deepsearch::rate_limit::RateLimiter::unlimited()),
            cache.clone(),
            Duration::from_secs(5),
        ),
        deepsearch::web::CrawlEngine::new(
            Arc::clone(&fetcher) as Arc<dyn deepsearch::web::PageFetcher>,
            cache,
            deepsearch::web::CrawlConfig::default(),
        ),
    );
    let outcome = deepsearch::agent::Orchestrator::new(services, common::config(5))
        .with_prompts(deepsearch::agent::PromptSet::defaults())
        .research(vec![user_message("q")], CancellationToken::new())
        .await
        .expect("empty results are not an error");

    assert_eq!(outcome.searches, 1);
    assert_eq!(outcome.urls_crawled, 0);
    assert!(fetcher.calls().is_empty());
    assert!(llm.user_messages(CallKind::Decide)[1].contains("## Query: \"obscure\""));
}

#[tokio::test]
async fn test_search_rate_limit_exhaustion_is_fatal() {
    let llm = ScriptedLlm::new("unused")
        .with_decisions(vec![continue_with("facts")])
        .with_plans(vec![plan_of(&["throttled"])]);
    let llm = Arc::new(llm);
    let search = Arc::new(FakeSearch::new().fail(
        "throttled",
        SearchError::RateLimited {
            key: "search".to_string(),
            retries: RateLimitConfig::default().max_retries,
        },
    ));
    let fetcher = Arc::new(FakeFetcher::new());

    let result = orchestrator(&llm, &search, &fetcher, common::config(5))
        .research(vec![user_message("q")], CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AgentError::RateLimited { retries: 3, .. })));
    assert_eq!(llm.count(CallKind::Answer) + llm.count(CallKind::AnswerForced), 0);
}

#[tokio::test]
async fn test_undecodable_decision_is_schema_violation() {
    let (llm, search, fetcher) =
        fakes(ScriptedLlm::new("unused").with_decisions(vec!["I think we should answer".to_string()]));

    let result = orchestrator(&llm, &search, &fetcher, common::config(5))
        .research(vec![user_message("q")], CancellationToken::new())
        .await;

    match result {
        Err(AgentError::SchemaViolation { agent, content, .. }) => {
            assert_eq!(agent, "decider");
            assert_eq!(content, "I think we should answer");
        }
        other => panic!("expected schema violation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_oversized_plan_is_schema_violation() {
    let llm = ScriptedLlm::new("unused")
        .with_decisions(vec![continue_with("facts")])
        .with_plans(vec![plan_of(&["a", "b", "c", "d", "e", "f"])]);
    let (llm, search, fetcher) = fakes(llm);

    let result = orchestrator(&llm, &search, &fetcher, common::config(5))
        .research(vec![user_message("q")], CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(AgentError::SchemaViolation {
            agent: "planner",
            ..
        })
    ));
    assert!(search.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (llm, search, fetcher) = fakes(ScriptedLlm::new(PARIS_ANSWER));
    let token = CancellationToken::new();
    token.cancel();

    let result = orchestrator(&llm, &search, &fetcher, common::config(5))
        .research(vec![user_message("q")], token)
        .await;

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(llm.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_in_flight_decision() {
    let (llm, search, fetcher) =
        fakes(ScriptedLlm::new(PARIS_ANSWER).with_decide_delay(Duration::from_secs(30)));
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let result = orchestrator(&llm, &search, &fetcher, common::config(5))
        .research(vec![user_message("q")], token)
        .await;

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert_eq!(llm.calls(), vec![CallKind::Decide]);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_in_flight_crawl() {
    let llm = Arc::new(
        ScriptedLlm::new(PARIS_ANSWER).with_decisions(vec![continue_with("need sources")]),
    );
    let search = Arc::new(FakeSearch::new());
    let fetcher = Arc::new(FakeFetcher::new().with_delay(Duration::from_secs(2)));
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let result = orchestrator(&llm, &search, &fetcher, common::config(5))
        .research(vec![user_message("q")], token)
        .await;
    assert!(matches!(result, Err(AgentError::Cancelled)));
    let started_at_cancel = fetcher.calls().len();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.calls().len(), started_at_cancel);
    assert!(fetcher.finished().is_empty());
    assert_eq!(llm.count(CallKind::Summarize), 0);
}

#[tokio::test(start_paused = true)]
async fn test_time_budget_cancels_run() {
    let (llm, search, fetcher) =
        fakes(ScriptedLlm::new(PARIS_ANSWER).with_decide_delay(Duration::from_secs(30)));
    let config = deepsearch::agent::ResearchConfig::builder()
        .api_key("test-key")
        .time_budget(Duration::from_secs(2))
        .build()
        .expect("valid config");

    let result = orchestrator(&llm, &search, &fetcher, config)
        .research(vec![user_message("q")], CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AgentError::Cancelled)));
}

#[tokio::test]
async fn test_rejects_conversation_without_question() {
    let (llm, search, fetcher) = fakes(ScriptedLlm::new(PARIS_ANSWER));
    let orchestrator = orchestrator(&llm, &search, &fetcher, common::config(5));

    let empty = orchestrator
        .research(Vec::new(), CancellationToken::new())
        .await;
    assert!(matches!(empty, Err(AgentError::Orchestration { .. })));

    let assistant_only = orchestrator
        .research(vec![assistant_message("hello")], CancellationToken::new())
        .await;
    assert!(matches!(assistant_only, Err(AgentError::Orchestration { .. })));

    let zero_steps = orchestrator
        .research_with_steps(vec![user_message("q")], 0, CancellationToken::new())
        .await;
    assert!(matches!(zero_steps, Err(AgentError::Config { .. })));
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_repeated_queries_hit_the_cache() {
    let llm = ScriptedLlm::new(PARIS_ANSWER)
        .with_decisions(vec![continue_with("facts")])
        .with_plans(vec![plan_of(&["same query"])]);
    let (llm, search, fetcher) = fakes(llm);

    let outcome = orchestrator(&llm, &search, &fetcher, common::config(2))
        .research(vec![user_message("q")], CancellationToken::new())
        .await
        .expect("research succeeds");

    assert_eq!(outcome.queries, vec!["same query", "same query"]);
    assert_eq!(search.calls(), vec!["same query"]);
    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(llm.count(CallKind::Summarize), 4);
}
