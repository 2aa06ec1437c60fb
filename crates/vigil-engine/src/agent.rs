//! The perceive → decide → act controller.

use crate::collaborators::{Perception, PerceptionError, Reasoner, ReasonerError};
use crate::config::AgentConfig;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::session::{Session, SessionError, SessionRegistry};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_common::protocol::{
    DecideRequest, DecideResponse, LoopRequest, LoopResponse, Perception as PerceptionOutput,
};
use vigil_common::{ActionDecision, DecisionError, ExecutedAction, SessionId, StepResult, UIElement};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Perception(#[from] PerceptionError),
    #[error(transparent)]
    Reasoner(#[from] ReasonerError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// What the loop does after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Stop(String),
    Completed,
}

struct Observation {
    elements: Vec<UIElement>,
}

pub struct DecisionLoop {
    registry: Arc<SessionRegistry>,
    perception: Arc<dyn Perception>,
    reasoner: Arc<dyn Reasoner>,
    dispatcher: Dispatcher,
    config: AgentConfig,
}

impl DecisionLoop {
    pub fn new(
        registry: Arc<SessionRegistry>,
        perception: Arc<dyn Perception>,
        reasoner: Arc<dyn Reasoner>,
        config: AgentConfig,
    ) -> Self {
        Self {
            registry,
            perception,
            reasoner,
            dispatcher: Dispatcher::from(&config),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run steps until the reasoner says `noop`, a gate or failure stops the
    /// run, `max_steps` is reached or `cancel` fires. Only an unknown session is
    /// reported as an error; everything else ends up in the trace.
    pub async fn run(
        &self,
        session_id: &SessionId,
        request: &LoopRequest,
        cancel: &CancellationToken,
    ) -> Result<LoopResponse, AgentError> {
        let session = self.registry.active(session_id)?;
        let _run = session.lock_run().await;

        let max_steps = request.max_steps.unwrap_or(self.config.max_steps);
        info!(
            session_id = %session_id,
            goal = %request.goal,
            max_steps,
            request_id = request.request_id.as_deref().unwrap_or(""),
            "Decision loop started"
        );

        let mut steps = Vec::new();
        let mut completed = false;
        let mut reason = None;
        for step in 1..=max_steps {
            if cancel.is_cancelled() {
                reason = Some("Cancelled".to_string());
                break;
            }
            match self.step(&session, request, step, &mut steps).await {
                StepOutcome::Continue => {}
                StepOutcome::Completed => {
                    completed = true;
                    break;
                }
                StepOutcome::Stop(why) => {
                    reason = Some(why);
                    break;
                }
            }
        }

        if !completed && reason.is_none() {
            reason = Some(if steps.is_empty() {
                "No steps executed".to_string()
            } else {
                format!("Reached max steps ({})", max_steps)
            });
        }

        info!(
            session_id = %session_id,
            completed,
            steps = steps.len(),
            reason = reason.as_deref().unwrap_or(""),
            "Decision loop finished"
        );
        Ok(LoopResponse {
            session_id: session_id.clone(),
            goal: request.goal.clone(),
            completed,
            steps,
            reason,
        })
    }

    async fn step(
        &self,
        session: &Session,
        request: &LoopRequest,
        step: u32,
        trace: &mut Vec<StepResult>,
    ) -> StepOutcome {
        let session_id = session.id();
        let filename = format!("loop_{}_{}.png", chrono::Utc::now().timestamp(), step);
        let observation = match self.observe(session_id, &filename).await {
            Ok(observation) => observation,
            Err(e) => {
                error!(session_id = %session_id, step, "Observation failed: {}", e);
                return StepOutcome::Stop(format!("Observation failed: {}", e));
            }
        };

        let history = session.history();
        let decision = match self.decide(&request.goal, &observation.elements, &history).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(session_id = %session_id, step, "Reasoner failed mid-loop: {}", e);
                return StepOutcome::Stop(format!("Reasoner error: {}", e));
            }
        };
        debug!(session_id = %session_id, step, action = %decision.kind(), "Step reasoned action");

        if decision.is_noop() {
            info!(session_id = %session_id, step, reason = %decision.reason, "Reasoner returned noop");
            trace.push(StepResult::not_executed(step, decision));
            return StepOutcome::Completed;
        }

        let threshold = self.config.confidence_threshold;
        if !request.force && request.stop_on_low_confidence && decision.confidence < threshold {
            warn!(
                session_id = %session_id,
                step,
                confidence = decision.confidence,
                threshold,
                "Low confidence action, stopping"
            );
            let why = format!("Low confidence ({:.2} < {:.2})", decision.confidence, threshold);
            trace.push(StepResult::not_executed(step, decision));
            return StepOutcome::Stop(why);
        }

        if session
            .recent_actions(self.config.duplicate_window)
            .contains(&decision)
        {
            warn!(session_id = %session_id, step, "Duplicate action, skipping execution");
            session.record(decision.clone());
            trace.push(StepResult::skipped_duplicate(step, decision));
            return StepOutcome::Continue;
        }

        let page = session.page();
        match self
            .dispatcher
            .dispatch(page.as_ref(), &decision.action, &observation.elements)
            .await
        {
            Ok(result) => {
                info!(
                    session_id = %session_id,
                    step,
                    primitive = %result.primitive,
                    duration_ms = result.duration_ms,
                    "Step executed"
                );
                session.record(decision.clone());
                trace.push(StepResult::executed(step, decision, result));
                StepOutcome::Continue
            }
            Err(e) => {
                error!(session_id = %session_id, step, "Execution error: {}", e);
                let why = format!("Execution error: {}", e);
                trace.push(StepResult::failed(step, decision, e));
                StepOutcome::Stop(why)
            }
        }
    }

    async fn observe(&self, session_id: &SessionId, filename: &str) -> Result<Observation, AgentError> {
        let screenshot = self.registry.snapshot(session_id, filename).await?;
        let elements = self.perception.analyze(&screenshot).await?;
        debug!(session_id = %session_id, elements = elements.len(), "Perception finished");
        Ok(Observation { elements })
    }

    /// Ask the reasoner and validate its answer. This is the only place raw
    /// decisions become [`ActionDecision`]s.
    async fn decide(
        &self,
        goal: &str,
        elements: &[UIElement],
        history: &[ExecutedAction],
    ) -> Result<ActionDecision, AgentError> {
        let raw = self.reasoner.decide(goal, elements, history).await?;
        Ok(ActionDecision::try_from(raw)?)
    }

    /// One perceive → decide → act round outside the loop. Resolution and
    /// execution failures are returned to the caller.
    pub async fn decide_and_act(
        &self,
        session_id: &SessionId,
        request: &DecideRequest,
    ) -> Result<DecideResponse, AgentError> {
        let session = self.registry.active(session_id)?;
        let _run = session.lock_run().await;

        let observation = self.observe(session_id, "latest.png").await?;
        let history = match &request.last_actions {
            Some(actions) => actions.clone(),
            None => session.history(),
        };
        let decision = self
            .decide(&request.goal, &observation.elements, &history)
            .await?;

        let mut response = DecideResponse {
            session_id: session_id.clone(),
            action: decision.clone(),
            status: None,
            execution_result: None,
            perception: Some(PerceptionOutput {
                elements: observation.elements.clone(),
            }),
        };

        let threshold = self.config.confidence_threshold;
        if !request.force && decision.confidence < threshold {
            warn!(
                session_id = %session_id,
                confidence = decision.confidence,
                threshold,
                "Action below confidence threshold, not executing"
            );
            response.status = Some("low_confidence".into());
            return Ok(response);
        }

        if decision.is_noop() {
            response.status = Some("noop".into());
            return Ok(response);
        }

        let page = session.page();
        let result = self
            .dispatcher
            .dispatch(page.as_ref(), &decision.action, &observation.elements)
            .await?;
        session.record(decision);
        info!(session_id = %session_id, primitive = %result.primitive, "Action executed");
        response.status = Some("executed".into());
        response.execution_result = Some(result);
        Ok(response)
    }
}
