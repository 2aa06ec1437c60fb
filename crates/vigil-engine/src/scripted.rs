//! File-backed collaborators: a reasoner that replays recorded decisions and
//! a perception source that always reports the same elements.

use crate::collaborators::{Perception, PerceptionError, Reasoner, ReasonerError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use vigil_common::{ExecutedAction, RawDecision, UIElement};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse script: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Replays decisions in order, then answers `noop` once the script runs out.
/// Scripts are YAML or JSON lists of decisions in the wire shape.
pub struct ScriptedReasoner {
    decisions: Mutex<VecDeque<RawDecision>>,
}

impl ScriptedReasoner {
    pub fn new(decisions: impl IntoIterator<Item = RawDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, ScriptError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ScriptError> {
        let decisions: Vec<RawDecision> = serde_yaml::from_str(content)?;
        Ok(Self::new(decisions))
    }

    pub fn remaining(&self) -> usize {
        self.decisions.lock().len()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn decide(
        &self,
        goal: &str,
        elements: &[UIElement],
        history: &[ExecutedAction],
    ) -> Result<RawDecision, ReasonerError> {
        debug!(
            goal,
            elements = elements.len(),
            history = history.len(),
            "Replaying scripted decision"
        );
        let next = self.decisions.lock().pop_front();
        Ok(next.unwrap_or_else(|| RawDecision {
            action: "noop".into(),
            target: None,
            value: None,
            confidence: 1.0,
            reason: "script exhausted".into(),
        }))
    }
}

/// Reports a fixed element list for every screenshot.
#[derive(Debug, Clone, Default)]
pub struct StaticPerception {
    elements: Vec<UIElement>,
}

impl StaticPerception {
    pub fn new(elements: Vec<UIElement>) -> Self {
        Self { elements }
    }

    pub async fn from_path(path: &Path) -> Result<Self, ScriptError> {
        let content = tokio::fs::read_to_string(path).await?;
        let elements: Vec<UIElement> = serde_yaml::from_str(&content)?;
        Ok(Self::new(elements))
    }
}

#[async_trait]
impl Perception for StaticPerception {
    async fn analyze(&self, screenshot: &Path) -> Result<Vec<UIElement>, PerceptionError> {
        if !tokio::fs::try_exists(screenshot).await? {
            return Err(PerceptionError::Failed(format!(
                "screenshot not found: {}",
                screenshot.display()
            )));
        }
        Ok(self.elements.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_noops() {
        let reasoner = ScriptedReasoner::from_str(
            r#"
- action: click
  target: {by: id, value: yolo-1}
  confidence: 0.9
  reason: open menu
- {"action": "press_key", "confidence": 0.8}
"#,
        )
        .unwrap();
        assert_eq!(reasoner.remaining(), 2);

        let first = reasoner.decide("goal", &[], &[]).await.unwrap();
        assert_eq!(first.action, "click");
        assert_eq!(first.target.unwrap().value, "yolo-1");

        let second = reasoner.decide("goal", &[], &[]).await.unwrap();
        assert_eq!(second.action, "press_key");
        assert_eq!(second.reason, "");

        let third = reasoner.decide("goal", &[], &[]).await.unwrap();
        assert_eq!(third.action, "noop");
        assert_eq!(third.confidence, 1.0);
    }
}
