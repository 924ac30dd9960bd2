//! Iterative research agent.
//!
//! Provides the decide → plan → search → crawl → summarize loop and the
//! final answer synthesis. Uses a pluggable provider abstraction backed by
//! OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! Conversation → Orchestrator
//!   ├── DeciderAgent (continue with feedback, or answer)
//!   ├── PlannerAgent (1-5 queries)
//!   ├── Fan-out → one task per query
//!   │   ├── SearchExecutor (rate-limited, cached)
//!   │   ├── CrawlEngine (bounded, retried, cached)
//!   │   └── Summarizer (bounded, per-page timeout)
//!   ├── Record searches in plan order
//!   └── SynthesizerAgent → final markdown answer (normal or forced)
//! ```

pub mod action;
pub mod client;
pub mod config;
pub mod decider;
pub mod event;
pub mod message;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod state;
pub mod summarizer;
pub mod synthesizer;
pub mod traits;

// Re-export key types
pub use action::{Action, Decision};
pub use config::{ResearchConfig, ResearchConfigBuilder};
pub use decider::DeciderAgent;
pub use event::{NoopObserver, ResearchEvent, ResearchObserver, TracingObserver};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::{Orchestrator, ResearchOutcome, ResearchServices};
pub use planner::{PlannerAgent, QueryPlan};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use state::{ResearchState, SearchRecord};
pub use summarizer::{Summarizer, SummarizerAgent, SummaryBatch};
pub use synthesizer::{AnswerMode, SynthesizerAgent};
pub use traits::{Agent, AgentResponse};
