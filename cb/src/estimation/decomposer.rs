//! SubtaskDecomposer - LLM-driven breakdown of a task into subtasks
//!
//! Renders the decomposition prompt, asks the model to answer through the
//! `submit_subtasks` tool, and validates what comes back. No retries and no
//! persistence happen here.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::EstimationError;
use crate::config::DecomposerConfig;
use crate::domain::TaskCategory;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, Message, ToolDefinition};
use crate::prompts::{DecomposeContext, PromptLoader};

/// Tool the model calls with its answer
pub const SUBMIT_TOOL: &str = "submit_subtasks";

/// Number of subtasks the prompt asks for
const REQUESTED_MIN: usize = 3;
const REQUESTED_MAX: usize = 5;

/// A validated subtask proposal, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtaskDraft {
    /// Sort key as numbered by the model
    pub order: i32,
    pub description: String,
    pub category: TaskCategory,
    /// Introduced by the decomposer rather than named by the user
    pub is_implicit: bool,
}

impl SubtaskDraft {
    /// The whole task as its own single step
    pub fn whole_task(description: &str) -> Self {
        Self {
            order: 1,
            description: description.trim().to_string(),
            category: TaskCategory::Unknown,
            is_implicit: true,
        }
    }
}

/// Wire shape of one subtask in the model output
#[derive(Debug, Deserialize)]
struct SubtaskOutput {
    id: i64,
    description: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct DecompositionOutput {
    subtasks: Vec<SubtaskOutput>,
}

/// Breaks task descriptions into categorised subtasks
pub struct SubtaskDecomposer {
    llm: Arc<dyn LlmClient>,
    prompts: PromptLoader,
    config: DecomposerConfig,
}

impl SubtaskDecomposer {
    pub fn new(llm: Arc<dyn LlmClient>, config: DecomposerConfig) -> Self {
        let prompts = PromptLoader::new(config.prompt_dir.as_deref());
        Self { llm, prompts, config }
    }

    /// Decompose a description into ordered subtasks
    pub async fn decompose(&self, description: &str) -> Result<Vec<SubtaskDraft>, EstimationError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(EstimationError::InvalidInput("task description is empty".to_string()));
        }
        debug!(description_len = description.len(), "decompose: called");

        let request = self.build_request(description)?;
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let response = match tokio::time::timeout(timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, "decompose: LLM call failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout_ms = self.config.timeout_ms, "decompose: timed out");
                return Err(EstimationError::DecompositionUnavailable(format!(
                    "no response within {}ms",
                    self.config.timeout_ms
                )));
            }
        };

        let drafts = self.parse_response(&response)?;
        info!(subtask_count = drafts.len(), "Task decomposed");
        Ok(drafts)
    }

    fn build_request(&self, description: &str) -> Result<CompletionRequest, EstimationError> {
        let context = DecomposeContext {
            description: description.to_string(),
            min_subtasks: REQUESTED_MIN.min(self.config.max_subtasks),
            max_subtasks: REQUESTED_MAX.min(self.config.max_subtasks),
            categories: offered_categories().map(|c| c.to_string()).collect(),
            tool_name: SUBMIT_TOOL.to_string(),
        };
        let system_prompt = self
            .prompts
            .decompose_prompt(&context)
            .map_err(|e| EstimationError::InvalidConfig(e.to_string()))?;

        Ok(CompletionRequest {
            system_prompt,
            messages: vec![Message::user(format!("Break this task into subtasks:\n\n{}", description))],
            tools: vec![submit_tool()],
            max_tokens: self.config.max_tokens,
        })
    }

    /// Prefer the tool call; fall back to JSON in the text content
    fn parse_response(&self, response: &CompletionResponse) -> Result<Vec<SubtaskDraft>, EstimationError> {
        let output: DecompositionOutput = if let Some(call) = response.find_tool_call(SUBMIT_TOOL) {
            debug!("parse_response: using tool call");
            serde_json::from_value(call.input.clone())
                .map_err(|e| EstimationError::DecompositionParse(format!("tool input: {}", e)))?
        } else if let Some(content) = response.content.as_deref() {
            debug!("parse_response: no tool call, parsing text content");
            serde_json::from_str(strip_code_fences(content))
                .map_err(|e| EstimationError::DecompositionParse(format!("text content: {}", e)))?
        } else {
            return Err(EstimationError::DecompositionParse(
                "response had neither a tool call nor text".to_string(),
            ));
        };

        self.validate(output)
    }

    fn validate(&self, output: DecompositionOutput) -> Result<Vec<SubtaskDraft>, EstimationError> {
        let count = output.subtasks.len();
        if count == 0 {
            return Err(EstimationError::DecompositionParse("empty subtask list".to_string()));
        }
        if count > self.config.max_subtasks {
            return Err(EstimationError::DecompositionParse(format!(
                "{} subtasks exceeds the limit of {}",
                count, self.config.max_subtasks
            )));
        }

        let mut drafts = Vec::with_capacity(count);
        for item in output.subtasks {
            let description = item.description.trim();
            if description.is_empty() {
                return Err(EstimationError::DecompositionParse(format!(
                    "subtask {} has a blank description",
                    item.id
                )));
            }
            let category = item
                .category
                .parse::<TaskCategory>()
                .map_err(EstimationError::DecompositionParse)?;
            let order = i32::try_from(item.id)
                .map_err(|_| EstimationError::DecompositionParse(format!("subtask id {} out of range", item.id)))?;
            drafts.push(SubtaskDraft {
                order,
                description: description.to_string(),
                category,
                is_implicit: true,
            });
        }

        // Stable: equal ids keep the model's order
        drafts.sort_by_key(|d| d.order);
        Ok(drafts)
    }
}

/// Categories the model may assign; `unknown` is only ever a parse fallback
fn offered_categories() -> impl Iterator<Item = TaskCategory> {
    TaskCategory::ALL
        .iter()
        .copied()
        .filter(|c| *c != TaskCategory::Unknown)
}

fn submit_tool() -> ToolDefinition {
    let categories: Vec<&str> = offered_categories().map(|c| c.as_str()).collect();
    ToolDefinition::new(
        SUBMIT_TOOL,
        "Submit the subtasks for the task. Call this once with every subtask.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "subtasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {
                                "type": "integer",
                                "description": "Position of the subtask, starting at 1"
                            },
                            "description": {
                                "type": "string",
                                "description": "One concrete step, as a short imperative sentence"
                            },
                            "category": {
                                "type": "string",
                                "enum": categories
                            }
                        },
                        "required": ["id", "description", "category"]
                    }
                }
            },
            "required": ["subtasks"]
        }),
    )
}

/// Remove a surrounding ``` or ```json fence if present
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
