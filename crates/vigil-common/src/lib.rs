pub mod decision;
pub mod element;
pub mod error;
pub mod health;
pub mod protocol;
pub mod session;
pub mod step;

pub use decision::{Action, ActionDecision, ActionKind, RawDecision, RawTarget, Target};
pub use element::{BoundingBox, Point, UIElement, Viewport};
pub use error::{BackendError, DecisionError, ElementError, TargetError};
pub use health::{EngineHealth, SupervisorState};
pub use session::{ExecutedAction, SessionId, SessionInfo, SessionStatus};
pub use step::{
    ExecutionRecord, ExecutionResult, ExecutionStatus, NavigationResult, SkipReason, StepResult,
};
