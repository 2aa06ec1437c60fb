//! Composition root wiring the supervisor, the session registry and the
//! decision loop behind the request/response contracts.

use crate::agent::{AgentError, DecisionLoop};
use crate::backend::{BackendError, ContextOptions, EngineLauncher};
use crate::collaborators::{Perception, PerceptionError, Reasoner, ReasonerError};
use crate::config::VigilConfig;
use crate::dispatch::DispatchError;
use crate::metrics::EngineMetrics;
use crate::session::{CreateSession, SessionError, SessionRegistry};
use crate::supervisor::{Supervisor, SupervisorError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_common::protocol::{
    CloseSessionRequest, CloseSessionResponse, CreateSessionRequest, CreateSessionResponse,
    DecideRequest, DecideResponse, HealthResponse, LoopRequest, LoopResponse,
};
use vigil_common::{DecisionError, NavigationResult, SessionId, SessionInfo, TargetError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Target(TargetError),
    #[error("{0}")]
    UnsupportedMapping(String),
    #[error(transparent)]
    Decision(DecisionError),
    #[error("Action execution failed: {0}")]
    Execution(BackendError),
    #[error(transparent)]
    Perception(PerceptionError),
    #[error(transparent)]
    Reasoner(ReasonerError),
    #[error(transparent)]
    Session(SessionError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ServiceError {
    /// HTTP-style status for a transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Target(_)
            | ServiceError::UnsupportedMapping(_)
            | ServiceError::Decision(_) => 400,
            ServiceError::SessionNotFound(_) => 404,
            ServiceError::EngineUnavailable(_) => 503,
            ServiceError::Execution(_)
            | ServiceError::Perception(_)
            | ServiceError::Reasoner(_)
            | ServiceError::Session(_)
            | ServiceError::Metrics(_) => 500,
        }
    }
}

impl From<SupervisorError> for ServiceError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::Metrics(m) => ServiceError::Metrics(m),
            other => ServiceError::EngineUnavailable(other.to_string()),
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(id) => ServiceError::SessionNotFound(id),
            SessionError::EngineUnavailable(reason) => ServiceError::EngineUnavailable(reason),
            other => ServiceError::Session(other),
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Target(t) => ServiceError::Target(t),
            e @ DispatchError::UnsupportedMapping { .. } => {
                ServiceError::UnsupportedMapping(e.to_string())
            }
            DispatchError::Execution(b) => ServiceError::Execution(b),
        }
    }
}

impl From<AgentError> for ServiceError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Session(s) => s.into(),
            AgentError::Perception(p) => ServiceError::Perception(p),
            AgentError::Reasoner(r) => ServiceError::Reasoner(r),
            AgentError::Decision(DecisionError::Target(t)) => ServiceError::Target(t),
            AgentError::Decision(d) => ServiceError::Decision(d),
            AgentError::Dispatch(d) => d.into(),
        }
    }
}

pub struct AgentService {
    config: VigilConfig,
    supervisor: Arc<Supervisor>,
    registry: Arc<SessionRegistry>,
    agent: DecisionLoop,
}

impl AgentService {
    pub fn new(
        config: VigilConfig,
        launcher: Arc<dyn EngineLauncher>,
        perception: Arc<dyn Perception>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Result<Self, ServiceError> {
        let supervisor = Supervisor::new(
            launcher,
            config.health.clone(),
            ContextOptions::from(&config.browser),
        )?;
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&supervisor),
            config.sessions.artifacts_root.clone(),
        ));
        let agent = DecisionLoop::new(
            Arc::clone(&registry),
            perception,
            reasoner,
            config.agent.clone(),
        );
        Ok(Self {
            config,
            supervisor,
            registry,
            agent,
        })
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn start(&self) -> Result<(), ServiceError> {
        self.supervisor.start().await?;
        info!("Agent service started");
        Ok(())
    }

    /// Close every session (artifacts removed) and stop the engine.
    pub async fn shutdown(&self) {
        let closed = self.registry.close_all().await;
        info!(closed, "Closed sessions on shutdown");
        self.supervisor.stop().await;
    }

    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreateSessionResponse, ServiceError> {
        let context = ContextOptions {
            viewport: request.viewport,
            user_agent: request.user_agent,
            ..ContextOptions::default()
        };
        let session = self
            .registry
            .create(CreateSession {
                video: request.video,
                context,
                keep_artifacts: request.keep_artifacts,
            })
            .await?;
        Ok(CreateSessionResponse {
            session_id: session.id().clone(),
        })
    }

    pub async fn close_session(
        &self,
        session_id: &SessionId,
        request: CloseSessionRequest,
    ) -> Result<CloseSessionResponse, ServiceError> {
        let closed = self.registry.close(session_id, request.keep_artifacts).await;
        if !closed {
            return Err(ServiceError::SessionNotFound(session_id.clone()));
        }
        Ok(CloseSessionResponse {
            session_id: session_id.clone(),
            closed,
        })
    }

    pub async fn navigate(
        &self,
        session_id: &SessionId,
        url: &str,
    ) -> Result<NavigationResult, ServiceError> {
        let session = self.registry.active(session_id)?;
        let _run = session.lock_run().await;
        session
            .page()
            .navigate(url)
            .await
            .map_err(ServiceError::Execution)
    }

    pub async fn snapshot(
        &self,
        session_id: &SessionId,
        filename: &str,
    ) -> Result<PathBuf, ServiceError> {
        Ok(self.registry.snapshot(session_id, filename).await?)
    }

    pub async fn decide(
        &self,
        session_id: &SessionId,
        request: DecideRequest,
    ) -> Result<DecideResponse, ServiceError> {
        Ok(self.agent.decide_and_act(session_id, &request).await?)
    }

    pub async fn run_loop(
        &self,
        session_id: &SessionId,
        request: LoopRequest,
    ) -> Result<LoopResponse, ServiceError> {
        self.run_loop_until(session_id, request, &CancellationToken::new())
            .await
    }

    /// Like [`run_loop`](Self::run_loop), stopping early once `cancel` fires.
    pub async fn run_loop_until(
        &self,
        session_id: &SessionId,
        request: LoopRequest,
        cancel: &CancellationToken,
    ) -> Result<LoopResponse, ServiceError> {
        Ok(self.agent.run(session_id, &request, cancel).await?)
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            engine: self.supervisor.health(),
            active_sessions: self.registry.active_count(),
        }
    }

    pub fn metrics(&self) -> &EngineMetrics {
        self.supervisor.metrics()
    }

    /// Engine metrics in the Prometheus text format.
    pub fn render_metrics(&self) -> Result<String, ServiceError> {
        Ok(self.metrics().encode_text()?)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    pub async fn video_path(&self, session_id: &SessionId) -> Option<PathBuf> {
        self.registry.video_path(session_id).await
    }

    /// Apply the configured session TTL.
    pub async fn expire_sessions(&self) -> usize {
        self.registry.expire(self.config.sessions.ttl()).await
    }
}
