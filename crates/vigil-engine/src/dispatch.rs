//! Maps validated actions onto concrete page primitives.
//!
//! Planning is pure: [`Dispatcher::plan`] resolves the symbolic target against
//! the latest perception output and yields a [`PrimitiveCall`]. Only
//! [`Dispatcher::execute`] touches the page.

use crate::backend::{BackendError, Page};
use crate::config::AgentConfig;
use serde_json::{Value, json};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;
use vigil_common::{
    Action, ActionKind, ExecutionResult, ExecutionStatus, Point, Target, TargetError, UIElement,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("Action '{action}' cannot target a {target_kind}")]
    UnsupportedMapping {
        action: ActionKind,
        target_kind: &'static str,
    },
    #[error("Execution failed: {0}")]
    Execution(#[from] BackendError),
}

/// Where a target landed after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    Point(Point),
    Selector(String),
}

/// Resolve a symbolic target against the elements of the latest perception
/// call.
pub fn resolve(target: &Target, elements: &[UIElement]) -> Result<ResolvedTarget, TargetError> {
    match target {
        Target::Id(id) => elements
            .iter()
            .find(|el| &el.id == id)
            .map(|el| ResolvedTarget::Point(el.bbox.center()))
            .ok_or_else(|| TargetError::TargetNotFound(id.clone())),
        Target::Coords(raw) => parse_coords(raw).map(ResolvedTarget::Point),
        Target::Selector(selector) => Ok(ResolvedTarget::Selector(selector.clone())),
    }
}

/// Parse `"x,y"`; each component may be fractional and is truncated.
pub fn parse_coords(raw: &str) -> Result<Point, TargetError> {
    let invalid = || TargetError::InvalidTarget(raw.to_string());
    let mut parts = raw.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let parse = |s: &str| -> Result<i64, TargetError> {
        let v: f64 = s.trim().parse().map_err(|_| invalid())?;
        if v.is_finite() {
            Ok(v.trunc() as i64)
        } else {
            Err(invalid())
        }
    };
    Ok(Point::new(parse(x)?, parse(y)?))
}

/// A single primitive invocation against a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveCall {
    ClickAt(Point),
    ClickSelector(String),
    TypeAt { point: Point, text: String },
    TypeSelector { selector: String, text: String },
    Navigate(String),
    Scroll { dx: i64, dy: i64 },
    HoverAt(Point),
    PressKey(String),
    Noop,
}

impl PrimitiveCall {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveCall::ClickAt(_) => "click_at",
            PrimitiveCall::ClickSelector(_) => "click_selector",
            PrimitiveCall::TypeAt { .. } => "type_at",
            PrimitiveCall::TypeSelector { .. } => "type_selector",
            PrimitiveCall::Navigate(_) => "navigate",
            PrimitiveCall::Scroll { .. } => "scroll",
            PrimitiveCall::HoverAt(_) => "hover",
            PrimitiveCall::PressKey(_) => "press_key",
            PrimitiveCall::Noop => "noop",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            PrimitiveCall::ClickAt(p) | PrimitiveCall::HoverAt(p) => json!({"x": p.x, "y": p.y}),
            PrimitiveCall::ClickSelector(selector) => json!({"selector": selector}),
            PrimitiveCall::TypeAt { point, text } => {
                json!({"x": point.x, "y": point.y, "text": text})
            }
            PrimitiveCall::TypeSelector { selector, text } => {
                json!({"selector": selector, "text": text})
            }
            PrimitiveCall::Navigate(url) => json!({"url": url}),
            PrimitiveCall::Scroll { dx, dy } => json!({"dx": dx, "dy": dy}),
            PrimitiveCall::PressKey(key) => json!({"key": key}),
            PrimitiveCall::Noop => json!({}),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    default_scroll_px: i64,
    default_key: String,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for Dispatcher {
    fn from(config: &AgentConfig) -> Self {
        Self {
            default_scroll_px: config.default_scroll_px,
            default_key: config.default_key.clone(),
        }
    }
}

impl Dispatcher {
    pub fn plan(&self, action: &Action, elements: &[UIElement]) -> Result<PrimitiveCall, DispatchError> {
        let call = match action {
            Action::Click { target } => match resolve(target, elements)? {
                ResolvedTarget::Point(p) => PrimitiveCall::ClickAt(p),
                ResolvedTarget::Selector(s) => PrimitiveCall::ClickSelector(s),
            },
            Action::Type { target, text } => match resolve(target, elements)? {
                ResolvedTarget::Point(point) => PrimitiveCall::TypeAt {
                    point,
                    text: text.clone(),
                },
                ResolvedTarget::Selector(selector) => PrimitiveCall::TypeSelector {
                    selector,
                    text: text.clone(),
                },
            },
            Action::Navigate { url } => PrimitiveCall::Navigate(url.clone()),
            Action::Scroll { target } => {
                let dy = match target {
                    Some(Target::Coords(raw)) => parse_coords(raw)?.y,
                    _ => self.default_scroll_px,
                };
                PrimitiveCall::Scroll { dx: 0, dy }
            }
            Action::Hover { target } => match resolve(target, elements)? {
                ResolvedTarget::Point(p) => PrimitiveCall::HoverAt(p),
                ResolvedTarget::Selector(_) => {
                    return Err(DispatchError::UnsupportedMapping {
                        action: ActionKind::Hover,
                        target_kind: "selector",
                    });
                }
            },
            Action::PressKey { key } => {
                PrimitiveCall::PressKey(key.clone().unwrap_or_else(|| self.default_key.clone()))
            }
            Action::Noop => PrimitiveCall::Noop,
        };
        Ok(call)
    }

    pub async fn execute(
        &self,
        page: &dyn Page,
        call: &PrimitiveCall,
    ) -> Result<ExecutionResult, DispatchError> {
        let started = Instant::now();
        let mut navigation = None;
        let mut status = ExecutionStatus::Ok;

        debug!(primitive = call.name(), "Executing primitive");
        match call {
            PrimitiveCall::ClickAt(p) => page.click_at(*p).await?,
            PrimitiveCall::ClickSelector(selector) => page.click_selector(selector).await?,
            PrimitiveCall::TypeAt { point, text } => page.type_at(*point, text).await?,
            PrimitiveCall::TypeSelector { selector, text } => {
                page.type_selector(selector, text).await?
            }
            PrimitiveCall::Navigate(url) => navigation = Some(page.navigate(url).await?),
            PrimitiveCall::Scroll { dx, dy } => page.scroll(*dx, *dy).await?,
            PrimitiveCall::HoverAt(p) => page.hover(*p).await?,
            PrimitiveCall::PressKey(key) => page.press_key(key).await?,
            PrimitiveCall::Noop => status = ExecutionStatus::Noop,
        }

        Ok(ExecutionResult {
            action_id: uuid::Uuid::new_v4().simple().to_string(),
            primitive: call.name().to_string(),
            params: call.params(),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            navigation,
        })
    }

    /// Plan and execute in one go.
    pub async fn dispatch(
        &self,
        page: &dyn Page,
        action: &Action,
        elements: &[UIElement],
    ) -> Result<ExecutionResult, DispatchError> {
        let call = self.plan(action, elements)?;
        self.execute(page, &call).await
    }
}
