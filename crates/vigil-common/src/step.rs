use crate::decision::ActionDecision;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
    pub status: u16, // generic status code (e.g. 200)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ok,
    Noop,
}

/// Outcome of a primitive call against a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action_id: String,
    pub primitive: String,
    pub params: serde_json::Value,
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
}

/// What happened to a step's decision. A skipped step serializes as
/// `{"skipped": "duplicate"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionRecord {
    Executed(ExecutionResult),
    Skipped { skipped: SkipReason },
}

impl ExecutionRecord {
    pub fn duplicate() -> Self {
        ExecutionRecord::Skipped {
            skipped: SkipReason::Duplicate,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            ExecutionRecord::Skipped {
                skipped: SkipReason::Duplicate
            }
        )
    }
}

/// One entry of a loop run's trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: u32,
    pub action: ActionDecision,
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn not_executed(step: u32, action: ActionDecision) -> Self {
        Self {
            step,
            action,
            executed: false,
            execution_result: None,
            error: None,
        }
    }

    pub fn skipped_duplicate(step: u32, action: ActionDecision) -> Self {
        Self {
            execution_result: Some(ExecutionRecord::duplicate()),
            ..Self::not_executed(step, action)
        }
    }

    pub fn executed(step: u32, action: ActionDecision, result: ExecutionResult) -> Self {
        Self {
            step,
            action,
            executed: true,
            execution_result: Some(ExecutionRecord::Executed(result)),
            error: None,
        }
    }

    pub fn failed(step: u32, action: ActionDecision, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::not_executed(step, action)
        }
    }
}
