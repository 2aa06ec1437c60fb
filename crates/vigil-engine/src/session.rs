//! Registry of isolated browsing sessions sharing the supervised engine.

use crate::backend::{BackendError, BrowserContext, ContextOptions, Page};
use crate::supervisor::{Supervisor, SupervisorError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use vigil_common::{ActionDecision, ExecutedAction, SessionId, SessionInfo, SessionStatus};

const VIDEO_EXTENSIONS: &[&str] = &["webm", "mp4"];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found or not active: {0}")]
    NotFound(SessionId),
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl From<SupervisorError> for SessionError {
    fn from(e: SupervisorError) -> Self {
        SessionError::EngineUnavailable(e.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateSession {
    pub video: bool,
    pub context: ContextOptions,
    pub keep_artifacts: bool,
}

struct SessionState {
    status: SessionStatus,
    last_update: DateTime<Utc>,
    executed_actions: Vec<ExecutedAction>,
}

/// One isolated context with its single page.
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    artifacts_dir: PathBuf,
    video_enabled: bool,
    keep_artifacts_on_close: bool,
    context: Arc<dyn BrowserContext>,
    page: Arc<dyn Page>,
    state: RwLock<SessionState>,
    run_lock: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn page(&self) -> Arc<dyn Page> {
        Arc::clone(&self.page)
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn status(&self) -> SessionStatus {
        self.state.read().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.state.read();
        SessionInfo {
            id: self.id.clone(),
            status: state.status,
            created_at: self.created_at,
            last_update: state.last_update,
            artifacts_dir: self.artifacts_dir.clone(),
            video_enabled: self.video_enabled,
            keep_artifacts_on_close: self.keep_artifacts_on_close,
            executed_actions: state.executed_actions.len(),
        }
    }

    pub fn history(&self) -> Vec<ExecutedAction> {
        self.state.read().executed_actions.clone()
    }

    /// The last `n` decisions of the history, oldest first.
    pub fn recent_actions(&self, n: usize) -> Vec<ActionDecision> {
        let state = self.state.read();
        let start = state.executed_actions.len().saturating_sub(n);
        state.executed_actions[start..]
            .iter()
            .map(|entry| entry.action.clone())
            .collect()
    }

    /// Append to the history. Entries are never removed or rewritten.
    pub fn record(&self, action: ActionDecision) {
        let entry = ExecutedAction::now(action);
        let mut state = self.state.write();
        state.last_update = entry.ts;
        state.executed_actions.push(entry);
    }

    /// Serializes decision steps of this session.
    pub async fn lock_run(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.run_lock.lock().await
    }

    fn touch(&self) {
        self.state.write().last_update = Utc::now();
    }

    fn set_status(&self, status: SessionStatus) {
        let mut state = self.state.write();
        state.status = status;
        state.last_update = Utc::now();
    }

    fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }
}

pub struct SessionRegistry {
    supervisor: Arc<Supervisor>,
    artifacts_root: PathBuf,
    sessions: DashMap<SessionId, Arc<Session>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl SessionRegistry {
    pub fn new(supervisor: Arc<Supervisor>, artifacts_root: impl Into<PathBuf>) -> Self {
        Self {
            supervisor,
            artifacts_root: artifacts_root.into(),
            sessions: DashMap::new(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    pub async fn create(&self, request: CreateSession) -> Result<Arc<Session>, SessionError> {
        let _guard = self.write_lock.lock().await;
        self.supervisor.ensure_available()?;

        let id = loop {
            let candidate = SessionId::generate();
            if !self.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let artifacts_dir = self.artifacts_root.join(id.as_str());
        tokio::fs::create_dir_all(&artifacts_dir).await?;
        info!(session_id = %id, video = request.video, "Creating session");

        let (context, page) = match self.open(&request, &artifacts_dir).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(session_id = %id, "Session creation failed: {}", e);
                if let Err(rm) = tokio::fs::remove_dir_all(&artifacts_dir).await {
                    warn!(session_id = %id, "Failed to remove artifacts dir: {}", rm);
                }
                return Err(e);
            }
        };

        let now = Utc::now();
        let session = Arc::new(Session {
            id: id.clone(),
            created_at: now,
            artifacts_dir,
            video_enabled: request.video,
            keep_artifacts_on_close: request.keep_artifacts,
            context,
            page,
            state: RwLock::new(SessionState {
                status: SessionStatus::Active,
                last_update: now,
                executed_actions: Vec::new(),
            }),
            run_lock: tokio::sync::Mutex::new(()),
        });
        self.sessions.insert(id.clone(), Arc::clone(&session));
        info!(session_id = %id, "Session created");
        Ok(session)
    }

    async fn open(
        &self,
        request: &CreateSession,
        artifacts_dir: &Path,
    ) -> Result<(Arc<dyn BrowserContext>, Arc<dyn Page>), SessionError> {
        let mut options = request.context.clone();
        if request.video {
            options = options.with_record_video_dir(artifacts_dir);
        }
        let context = self.supervisor.new_context(options).await?;
        match context.new_page().await {
            Ok(page) => Ok((context, page)),
            Err(e) => {
                if let Err(close_err) = context.close().await {
                    warn!("Failed to close half-created context: {}", close_err);
                }
                Err(SessionError::Backend(e))
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// The session if it exists and is active.
    pub fn active(&self, id: &SessionId) -> Result<Arc<Session>, SessionError> {
        self.get(id)
            .filter(|session| session.is_active())
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_active())
            .count()
    }

    pub fn history(&self, id: &SessionId) -> Option<Vec<ExecutedAction>> {
        self.get(id).map(|session| session.history())
    }

    /// Write a PNG screenshot into the session's artifacts dir. Only the final
    /// component of `filename` is used.
    pub async fn snapshot(&self, id: &SessionId, filename: &str) -> Result<PathBuf, SessionError> {
        let _guard = self.write_lock.lock().await;
        let session = self.active(id)?;

        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "screenshot.png".into());
        let path = session.artifacts_dir.join(name);

        let bytes = session.page.screenshot().await?;
        tokio::fs::write(&path, bytes).await?;
        session.touch();
        Ok(path)
    }

    /// Close a session. `keep_artifacts` overrides the flag given at creation.
    /// Returns `false` for an unknown id.
    pub async fn close(&self, id: &SessionId, keep_artifacts: Option<bool>) -> bool {
        let _guard = self.write_lock.lock().await;
        self.close_locked(id, keep_artifacts).await
    }

    async fn close_locked(&self, id: &SessionId, keep_artifacts: Option<bool>) -> bool {
        let Some(session) = self.get(id) else {
            warn!(session_id = %id, "Session not found (maybe already closed)");
            return false;
        };
        let keep = keep_artifacts.unwrap_or(session.keep_artifacts_on_close);
        info!(session_id = %id, keep_artifacts = keep, "Closing session");

        if let Err(e) = session.page.close().await {
            warn!(session_id = %id, "Error closing page: {}", e);
        }
        if let Err(e) = session.context.close().await {
            warn!(session_id = %id, "Error closing context: {}", e);
        }
        session.set_status(SessionStatus::Closed);

        if !keep {
            if let Err(e) = remove_dir_if_exists(&session.artifacts_dir).await {
                // Left in the map so `expire` retries the removal.
                warn!(session_id = %id, "Error removing artifacts dir: {}", e);
                session.set_status(SessionStatus::Error);
                return true;
            }
        } else {
            info!(session_id = %id, dir = %session.artifacts_dir.display(), "Keeping session artifacts");
        }

        self.sessions.remove(id);
        true
    }

    /// Purge non-active sessions older than `ttl` and force-close active ones
    /// older than twice that. Returns the number removed.
    pub async fn expire(&self, ttl: Duration) -> usize {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let stale_active = ttl.saturating_mul(2);
        let candidates: Vec<Arc<Session>> =
            self.sessions.iter().map(|entry| Arc::clone(entry.value())).collect();

        let mut removed = 0;
        for session in candidates {
            let age = session.age(now);
            if session.is_active() {
                if age > stale_active {
                    warn!(session_id = %session.id, age_secs = age.as_secs(), "Active session too old, closing");
                    self.close_locked(&session.id, Some(false)).await;
                    self.sessions.remove(&session.id);
                    removed += 1;
                }
            } else if age > ttl {
                if let Err(e) = remove_dir_if_exists(&session.artifacts_dir).await {
                    warn!(session_id = %session.id, "Error removing artifacts dir: {}", e);
                }
                self.sessions.remove(&session.id);
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Removed expired sessions");
        }
        removed
    }

    /// Close every session and delete its artifacts.
    pub async fn close_all(&self) -> usize {
        let _guard = self.write_lock.lock().await;
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            if self.close_locked(&id, Some(false)).await {
                closed += 1;
            }
        }
        closed
    }

    /// First recorded video file of a session that asked for recording.
    pub async fn video_path(&self, id: &SessionId) -> Option<PathBuf> {
        let session = self.get(id)?;
        if !session.video_enabled {
            return None;
        }
        let mut entries = tokio::fs::read_dir(&session.artifacts_dir).await.ok()?;
        let mut videos = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_video = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    VIDEO_EXTENSIONS
                        .iter()
                        .any(|video| ext.eq_ignore_ascii_case(video))
                });
            if is_video {
                videos.push(path);
            }
        }
        videos.sort();
        videos.into_iter().next()
    }
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
