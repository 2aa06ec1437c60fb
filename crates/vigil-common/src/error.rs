use crate::decision::ActionKind;
use thiserror::Error;

/// Failures raised by an engine, a browsing context or a page primitive.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Engine not ready")]
    NotReady,
    #[error("Element not found for selector '{selector}'")]
    ElementNotFound { selector: String },
    #[error("Primitive '{primitive}' failed: {reason}")]
    Primitive { primitive: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Other: {0}")]
    Other(String),
}

impl BackendError {
    pub fn primitive(primitive: &str, reason: impl ToString) -> Self {
        BackendError::Primitive {
            primitive: primitive.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failures resolving a symbolic target against the latest perception output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("Element with id '{0}' not found in perception output")]
    TargetNotFound(String),
    #[error("Invalid coords format: {0}")]
    InvalidTarget(String),
    #[error("Unknown target kind: {0}")]
    UnknownTargetKind(String),
}

/// A decision from the reasoning backend that does not fit the action schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),
    #[error("Action '{0}' requires a target")]
    MissingTarget(ActionKind),
    #[error("Action '{0}' requires a value")]
    MissingValue(ActionKind),
    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("Malformed decision: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElementError {
    #[error("Invalid bounding box [{x1}, {y1}, {x2}, {y2}]: expected x1 < x2 and y1 < y2")]
    InvalidBoundingBox { x1: f64, y1: f64, x2: f64, y2: f64 },
    #[error("Element confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}
