//! Next-action decision type and its wire schema.
//!
//! The decider's output schema lives here, next to the type it decodes
//! into, so an alternative decision shape can replace both together.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::message::ResponseSchema;

/// What the loop does next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Gather more information, guided by optional feedback.
    Continue {
        /// What is still missing.
        #[serde(skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    /// Stop researching and answer.
    Answer,
}

/// A decoded decision with its display annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Chosen action.
    pub action: Action,
    /// Short label for progress displays.
    pub title: String,
    /// Why the action was chosen.
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ActionKind {
    Continue,
    Answer,
}

/// Wire form of a decision.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDecision {
    #[serde(default)]
    title: String,
    #[serde(default)]
    reasoning: String,
    #[serde(rename = "type")]
    kind: ActionKind,
    #[serde(default)]
    feedback: Option<String>,
}

impl From<RawDecision> for Decision {
    fn from(raw: RawDecision) -> Self {
        let action = match raw.kind {
            ActionKind::Continue => Action::Continue {
                feedback: raw
                    .feedback
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty()),
            },
            ActionKind::Answer => Action::Answer,
        };
        Self {
            action,
            title: raw.title,
            reasoning: raw.reasoning,
        }
    }
}

/// Output schema for the decider (`next_action`).
#[must_use]
pub fn decision_schema() -> ResponseSchema {
    ResponseSchema::new(
        "next_action",
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Extremely concise label for the step, e.g. 'Continuing research', 'Answering question'."
                },
                "reasoning": {
                    "type": "string",
                    "description": "The reason this step was chosen."
                },
                "type": {
                    "type": "string",
                    "enum": ["continue", "answer"],
                    "description": "'continue' to search for more information, 'answer' to answer now."
                },
                "feedback": {
                    "type": ["string", "null"],
                    "description": "Required when type is 'continue': the specific information still missing."
                }
            },
            "required": ["title", "reasoning", "type", "feedback"],
            "additionalProperties": false
        }),
    )
}
