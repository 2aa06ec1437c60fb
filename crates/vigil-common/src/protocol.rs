//! Request/response contracts exchanged with the transport layer.

use crate::decision::ActionDecision;
use crate::element::{UIElement, Viewport};
use crate::health::EngineHealth;
use crate::session::{ExecutedAction, SessionId};
use crate::step::{ExecutionResult, StepResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub keep_artifacts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_artifacts: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub session_id: SessionId,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecideRequest {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_actions: Option<Vec<ExecutedAction>>,
    #[serde(default)]
    pub force: bool,
}

impl DecideRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            last_actions: None,
            force: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    pub elements: Vec<UIElement>,
}

/// Outcome of a single decide-and-act call. `status` is `"noop"` when the
/// decision was a noop, and `"low_confidence"` when the gate held it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecideResponse {
    pub session_id: SessionId,
    pub action: ActionDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perception: Option<Perception>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRequest {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
    #[serde(default = "default_true")]
    pub stop_on_low_confidence: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl LoopRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            max_steps: None,
            stop_on_low_confidence: true,
            force: false,
            request_id: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResponse {
    pub session_id: SessionId,
    pub goal: String,
    pub completed: bool,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub engine: EngineHealth,
    pub active_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loop_request_defaults() {
        let req: LoopRequest = serde_json::from_value(json!({"goal": "find docs"})).unwrap();
        assert!(req.stop_on_low_confidence);
        assert!(!req.force);
        assert_eq!(req.max_steps, None);
    }

    #[test]
    fn test_health_response_is_flat() {
        let health = HealthResponse {
            engine: EngineHealth::new(std::time::Duration::from_millis(2000)),
            active_sessions: 3,
        };
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["up"], false);
        assert_eq!(value["state"], "stopped");
        assert_eq!(value["current_backoff_ms"], 2000);
        assert_eq!(value["active_sessions"], 3);
    }
}
