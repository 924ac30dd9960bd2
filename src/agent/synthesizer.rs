//! Answer synthesizer agent.
//!
//! Produces the final markdown answer from the conversation and the
//! rendered search history. [`AnswerMode::Forced`] is used when the step
//! budget ran out and asks for a best-effort answer that states its
//! uncertainty.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

use super::config::ResearchConfig;
use super::prompt::{PromptSet, build_answer_prompt};
use super::provider::LlmProvider;
use super::state::ResearchState;
use super::traits::{Agent, AgentResponse};
use crate::error::AgentError;

/// Matches an inline markdown link to an http(s) URL.
static MARKDOWN_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\(https?://[^\s)]+\)").ok());

/// How the answer is being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// The decider judged the information sufficient.
    Normal,
    /// The step budget is exhausted.
    Forced,
}

/// Agent that writes the final answer.
pub struct SynthesizerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
    mode: AnswerMode,
}

impl SynthesizerAgent {
    /// Creates a synthesizer for `mode`, picking the matching system prompt.
    #[must_use]
    pub fn new(config: &ResearchConfig, prompts: &PromptSet, mode: AnswerMode) -> Self {
        let system_prompt = match mode {
            AnswerMode::Normal => prompts.answer.clone(),
            AnswerMode::Forced => prompts.answer_forced.clone(),
        };
        Self {
            model: config.answer_model.clone(),
            max_tokens: config.answer_max_tokens,
            system_prompt,
            mode,
        }
    }

    /// Answer mode this agent was built for.
    #[must_use]
    pub const fn mode(&self) -> AnswerMode {
        self.mode
    }

    /// Writes the answer for `state`.
    ///
    /// # Errors
    ///
    /// Returns provider errors unchanged.
    pub async fn answer(
        &self,
        provider: &dyn LlmProvider,
        state: &ResearchState,
        current_date: &str,
    ) -> Result<AgentResponse, AgentError> {
        let user_msg = build_answer_prompt(
            state.user_question().unwrap_or_default(),
            &state.render_conversation(),
            &state.render_history(),
            current_date,
        );
        let mut response = self.execute(provider, &user_msg).await?;
        response.content = response.content.trim().to_string();
        Ok(response)
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.1
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Returns `true` if `text` contains at least one markdown link to an
/// http(s) URL.
#[must_use]
pub fn contains_markdown_link(text: &str) -> bool {
    MARKDOWN_LINK
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}
