//! Narrow interfaces to the perception and reasoning backends.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use vigil_common::{ExecutedAction, RawDecision, UIElement};

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("Perception failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("Reasoner call failed: {0}")]
    Call(String),
}

/// Detects UI elements in a screenshot.
#[async_trait]
pub trait Perception: Send + Sync {
    async fn analyze(&self, screenshot: &Path) -> Result<Vec<UIElement>, PerceptionError>;
}

/// Proposes the next action for a goal. Prompting and retries on malformed
/// model output are the implementation's concern; the returned decision is
/// validated by the caller.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn decide(
        &self,
        goal: &str,
        elements: &[UIElement],
        history: &[ExecutedAction],
    ) -> Result<RawDecision, ReasonerError>;
}
