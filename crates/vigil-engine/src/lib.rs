pub mod agent;
pub mod backend;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod scripted;
pub mod service;
pub mod session;
pub mod supervisor;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use vigil_common::protocol;

pub use agent::{AgentError, DecisionLoop, StepOutcome};
pub use service::{AgentService, ServiceError};
pub use supervisor::{Supervisor, SupervisorError};
