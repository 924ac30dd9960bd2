//! Agent trait definition.
//!
//! All research agents (decider, planner, summarizer, synthesizer)
//! implement this trait, which provides a uniform interface for the
//! orchestrator. Structured agents decode their output through
//! [`decode_structured`], the single schema-violation path.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::message::{
    ChatRequest, ChatResponse, ResponseSchema, TokenUsage, system_message, user_message,
};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Characters of raw output quoted in schema-violation messages.
const PREVIEW_CHARS: usize = 200;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all agents in the system.
///
/// Agents encapsulate a specific role with a fixed system prompt and model
/// configuration. The orchestrator calls [`Agent::execute`] to run the
/// agent against a provider.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Output schema, for agents whose response is decoded.
    fn response_schema(&self) -> Option<ResponseSchema> {
        None
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Executes the agent with the given user message.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            response_schema: self.response_schema(),
        };

        let response: ChatResponse = provider.chat(&request).await?;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}

/// Decodes a structured agent response into `T`.
///
/// Accepts bare JSON or JSON wrapped in a markdown code fence. Anything
/// else is an [`AgentError::SchemaViolation`]; when the response was
/// truncated (`finish_reason == "length"`) the message says so.
///
/// # Errors
///
/// Returns [`AgentError::SchemaViolation`] if the content does not decode.
pub fn decode_structured<T: DeserializeOwned>(
    agent: &'static str,
    response: &AgentResponse,
) -> Result<T, AgentError> {
    let json_str = strip_code_fence(&response.content);

    serde_json::from_str::<T>(json_str).map_err(|e| {
        let truncated = response.finish_reason.as_deref() == Some("length");
        let preview: String = json_str.chars().take(PREVIEW_CHARS).collect();
        let message = if truncated {
            format!("response truncated (finish_reason=length): {e}")
        } else {
            format!("{e}; preview: {preview:?}")
        };
        AgentError::SchemaViolation {
            agent,
            message,
            content: response.content.clone(),
        }
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}
