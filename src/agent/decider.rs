//! Action decider agent.
//!
//! Reads the conversation and the search history and decides whether the
//! loop should keep researching or answer. Output outside the
//! `next_action` schema is fatal for the run; there is no local retry.

use async_trait::async_trait;
use tracing::debug;

use super::action::{Decision, RawDecision, decision_schema};
use super::config::ResearchConfig;
use super::message::{ResponseSchema, TokenUsage};
use super::prompt::build_decider_prompt;
use super::provider::LlmProvider;
use super::state::ResearchState;
use super::traits::{Agent, decode_structured};
use crate::error::AgentError;

/// Agent that chooses the next [`Action`](super::action::Action).
pub struct DeciderAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl DeciderAgent {
    /// Creates a new decider with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &ResearchConfig, system_prompt: String) -> Self {
        Self {
            model: config.decision_model.clone(),
            max_tokens: config.decision_max_tokens,
            system_prompt,
        }
    }

    /// Decides the next action for `state`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::SchemaViolation`] for undecodable output and
    /// provider errors unchanged.
    pub async fn decide(
        &self,
        provider: &dyn LlmProvider,
        state: &ResearchState,
    ) -> Result<(Decision, TokenUsage), AgentError> {
        let user_msg = build_decider_prompt(&state.render_conversation(), &state.render_history());
        let response = self.execute(provider, &user_msg).await?;
        let decision: Decision = decode_structured::<RawDecision>(self.name(), &response)?.into();
        debug!(step = state.step(), action = ?decision.action, "decision");
        Ok((decision, response.usage))
    }
}

#[async_trait]
impl Agent for DeciderAgent {
    fn name(&self) -> &'static str {
        "decider"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn response_schema(&self) -> Option<ResponseSchema> {
        Some(decision_schema())
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
