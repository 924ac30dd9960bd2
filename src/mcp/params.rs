//! MCP tool parameter types.
//!
//! Defines the input schemas for MCP tools using `schemars` for automatic
//! JSON Schema generation required by the MCP protocol.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agent::message::{ChatMessage, assistant_message, user_message};

/// One prior conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HistoryMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,

    /// Message text.
    pub content: String,
}

/// Parameters for the `research` MCP tool.
///
/// Runs the full research loop: decide → plan → search → crawl → summarize
/// → answer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResearchParams {
    /// The question to research.
    pub question: String,

    /// Earlier conversation turns, oldest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryMessage>>,

    /// Research iteration budget override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

impl ResearchParams {
    /// Builds the conversation: history turns followed by the question.
    ///
    /// # Errors
    ///
    /// Returns a description of the first history entry with an unknown role.
    pub fn conversation(&self) -> Result<Vec<ChatMessage>, String> {
        let mut messages = Vec::new();
        for (idx, turn) in self.history.iter().flatten().enumerate() {
            let message = match turn.role.to_ascii_lowercase().as_str() {
                "user" => user_message(&turn.content),
                "assistant" => assistant_message(&turn.content),
                other => return Err(format!("history[{idx}] has unknown role '{other}'")),
            };
            messages.push(message);
        }
        messages.push(user_message(&self.question));
        Ok(messages)
    }
}
