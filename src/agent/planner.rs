//! Query planner agent.
//!
//! Turns the conversation, the search history and the decider's latest
//! feedback into a short research plan with one to five search queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::config::ResearchConfig;
use super::message::{ResponseSchema, TokenUsage};
use super::prompt::build_planner_prompt;
use super::provider::LlmProvider;
use super::state::ResearchState;
use super::traits::{Agent, decode_structured};
use crate::error::AgentError;

/// Maximum queries in one plan.
pub const MAX_QUERIES: usize = 5;

/// A research plan and the queries that execute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Free-text plan.
    #[serde(default)]
    pub plan: String,
    /// Queries in execution order.
    pub queries: Vec<String>,
}

impl QueryPlan {
    /// Trims queries and checks the 1-5 non-blank query contract.
    fn validate(mut self) -> Result<Self, String> {
        for query in &mut self.queries {
            *query = query.trim().to_string();
        }
        if self.queries.is_empty() {
            return Err("plan contains no queries".to_string());
        }
        if self.queries.len() > MAX_QUERIES {
            return Err(format!(
                "plan contains {} queries, at most {MAX_QUERIES} allowed",
                self.queries.len()
            ));
        }
        if let Some(idx) = self.queries.iter().position(String::is_empty) {
            return Err(format!("query {idx} is blank"));
        }
        Ok(self)
    }
}

/// Output schema for the planner (`query_plan`).
#[must_use]
pub fn query_plan_schema() -> ResponseSchema {
    ResponseSchema::new(
        "query_plan",
        json!({
            "type": "object",
            "properties": {
                "plan": {
                    "type": "string",
                    "description": "Research plan: the logical progression of information needed and the dependencies between pieces."
                },
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "1-5 specific natural-language search queries, foundational first."
                }
            },
            "required": ["plan", "queries"],
            "additionalProperties": false
        }),
    )
}

/// Agent that plans the next batch of searches.
pub struct PlannerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl PlannerAgent {
    /// Creates a new planner with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &ResearchConfig, system_prompt: String) -> Self {
        Self {
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            system_prompt,
        }
    }

    /// Plans queries for the current state.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::SchemaViolation`] when the output does not
    /// decode or violates the query count contract.
    pub async fn plan(
        &self,
        provider: &dyn LlmProvider,
        state: &ResearchState,
        feedback: Option<&str>,
        current_date: &str,
    ) -> Result<(QueryPlan, TokenUsage), AgentError> {
        let user_msg = build_planner_prompt(
            &state.render_conversation(),
            &state.render_history(),
            feedback,
            current_date,
        );
        let response = self.execute(provider, &user_msg).await?;
        let plan = decode_structured::<QueryPlan>(self.name(), &response)?
            .validate()
            .map_err(|message| AgentError::SchemaViolation {
                agent: self.name(),
                message,
                content: response.content.clone(),
            })?;
        debug!(queries = plan.queries.len(), "query plan");
        Ok((plan, response.usage))
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn name(&self) -> &'static str {
        "planner"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn response_schema(&self) -> Option<ResponseSchema> {
        Some(query_plan_schema())
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
