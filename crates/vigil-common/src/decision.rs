//! Action decisions produced by the reasoning backend.
//!
//! Decisions cross the reasoning boundary as [`RawDecision`] (the loose wire
//! shape) and are validated exactly once into [`ActionDecision`], whose
//! [`Action`] is a closed enum that downstream code matches exhaustively.

use crate::error::{DecisionError, TargetError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decision as emitted by the reasoning backend, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDecision {
    pub action: String,
    #[serde(default)]
    pub target: Option<RawTarget>,
    #[serde(default)]
    pub value: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTarget {
    pub by: String,
    pub value: String,
}

/// Symbolic reference to something on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Element id from the latest perception output.
    Id(String),
    /// Raw `"x,y"` pixel coordinates, parsed at resolution time.
    Coords(String),
    /// CSS selector handed to selector-based primitives.
    Selector(String),
}

impl Target {
    pub fn parse(by: &str, value: impl Into<String>) -> Result<Self, TargetError> {
        match by {
            "id" => Ok(Target::Id(value.into())),
            "coords" => Ok(Target::Coords(value.into())),
            "selector" => Ok(Target::Selector(value.into())),
            other => Err(TargetError::UnknownTargetKind(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Id(_) => "id",
            Target::Coords(_) => "coords",
            Target::Selector(_) => "selector",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Target::Id(v) | Target::Coords(v) | Target::Selector(v) => v,
        }
    }

    pub fn to_raw(&self) -> RawTarget {
        RawTarget {
            by: self.kind().to_string(),
            value: self.value().to_string(),
        }
    }
}

impl TryFrom<&RawTarget> for Target {
    type Error = TargetError;

    fn try_from(raw: &RawTarget) -> Result<Self, Self::Error> {
        Target::parse(&raw.by, raw.value.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Navigate,
    Scroll,
    Hover,
    PressKey,
    Noop,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Navigate => "navigate",
            ActionKind::Scroll => "scroll",
            ActionKind::Hover => "hover",
            ActionKind::PressKey => "press_key",
            ActionKind::Noop => "noop",
        }
    }

    pub fn takes_target(&self) -> bool {
        matches!(
            self,
            ActionKind::Click | ActionKind::Type | ActionKind::Scroll | ActionKind::Hover
        )
    }

    pub fn takes_value(&self) -> bool {
        matches!(
            self,
            ActionKind::Type | ActionKind::Navigate | ActionKind::PressKey
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(ActionKind::Click),
            "type" => Ok(ActionKind::Type),
            "navigate" => Ok(ActionKind::Navigate),
            "scroll" => Ok(ActionKind::Scroll),
            "hover" => Ok(ActionKind::Hover),
            "press_key" => Ok(ActionKind::PressKey),
            "noop" => Ok(ActionKind::Noop),
            other => Err(DecisionError::UnsupportedAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click { target: Target },
    Type { target: Target, text: String },
    Navigate { url: String },
    /// Coordinate targets scroll by their y component; anything else uses
    /// the configured default distance.
    Scroll { target: Option<Target> },
    Hover { target: Target },
    /// `None` presses the configured default key.
    PressKey { key: Option<String> },
    Noop,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Click { .. } => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::Hover { .. } => ActionKind::Hover,
            Action::PressKey { .. } => ActionKind::PressKey,
            Action::Noop => ActionKind::Noop,
        }
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            Action::Click { target } | Action::Type { target, .. } | Action::Hover { target } => {
                Some(target)
            }
            Action::Scroll { target } => target.as_ref(),
            Action::Navigate { .. } | Action::PressKey { .. } | Action::Noop => None,
        }
    }
}

/// A validated decision. Serializes to the same wire shape as [`RawDecision`],
/// and deserializing one runs the validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDecision", into = "RawDecision")]
pub struct ActionDecision {
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
}

impl ActionDecision {
    pub fn new(action: Action, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action,
            confidence,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.action, Action::Noop)
    }
}

impl TryFrom<RawDecision> for ActionDecision {
    type Error = DecisionError;

    fn try_from(raw: RawDecision) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&raw.confidence) {
            return Err(DecisionError::ConfidenceOutOfRange(raw.confidence));
        }
        let kind: ActionKind = raw.action.parse()?;
        // A decision carries only the fields its action uses.
        if raw.target.is_some() && !kind.takes_target() {
            return Err(DecisionError::Malformed(format!(
                "'{}' does not take a target",
                kind
            )));
        }
        if raw.value.as_deref().is_some_and(|v| !v.is_empty()) && !kind.takes_value() {
            return Err(DecisionError::Malformed(format!(
                "'{}' does not take a value",
                kind
            )));
        }
        let target = raw.target.as_ref().map(Target::try_from).transpose()?;
        let require_target = |target: Option<Target>| target.ok_or(DecisionError::MissingTarget(kind));

        let action = match kind {
            ActionKind::Click => Action::Click {
                target: require_target(target)?,
            },
            ActionKind::Type => Action::Type {
                target: require_target(target)?,
                text: raw.value.unwrap_or_default(),
            },
            ActionKind::Navigate => Action::Navigate {
                url: raw
                    .value
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(DecisionError::MissingValue(kind))?,
            },
            ActionKind::Scroll => Action::Scroll { target },
            ActionKind::Hover => Action::Hover {
                target: require_target(target)?,
            },
            ActionKind::PressKey => Action::PressKey {
                key: raw.value.filter(|v| !v.is_empty()),
            },
            ActionKind::Noop => Action::Noop,
        };

        Ok(ActionDecision {
            action,
            confidence: raw.confidence,
            reason: raw.reason,
        })
    }
}

impl From<ActionDecision> for RawDecision {
    fn from(decision: ActionDecision) -> Self {
        let kind = decision.kind();
        let (target, value) = match decision.action {
            Action::Click { target } | Action::Hover { target } => (Some(target.to_raw()), None),
            Action::Type { target, text } => (Some(target.to_raw()), Some(text)),
            Action::Navigate { url } => (None, Some(url)),
            Action::Scroll { target } => (target.as_ref().map(Target::to_raw), None),
            Action::PressKey { key } => (None, key),
            Action::Noop => (None, None),
        };
        RawDecision {
            action: kind.as_str().to_string(),
            target,
            value,
            confidence: decision.confidence,
            reason: decision.reason,
        }
    }
}
