//! Ownership of the single engine process: launch, health probing, crash
//! restart and the context factory every session goes through.

use crate::backend::{BackendError, BrowserContext, ContextOptions, Engine, EngineLauncher};
use crate::config::{BrowserConfig, HealthConfig};
use crate::metrics::EngineMetrics;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_common::{EngineHealth, SupervisorState};

pub const PROBE_URL: &str = "data:text/plain,ok";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to start engine: {0}")]
    EngineStart(#[source] BackendError),
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl From<&BrowserConfig> for ContextOptions {
    fn from(config: &BrowserConfig) -> Self {
        ContextOptions {
            viewport: Some(config.viewport),
            user_agent: config.user_agent.clone(),
            ignore_https_errors: Some(config.ignore_https_errors),
            record_video_dir: None,
        }
    }
}

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Supervisor {
    launcher: Arc<dyn EngineLauncher>,
    config: HealthConfig,
    defaults: ContextOptions,
    engine: RwLock<Option<Arc<dyn Engine>>>,
    health: Mutex<EngineHealth>,
    metrics: EngineMetrics,
    restart_lock: tokio::sync::Mutex<()>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl Supervisor {
    pub fn new(
        launcher: Arc<dyn EngineLauncher>,
        config: HealthConfig,
        defaults: ContextOptions,
    ) -> Result<Arc<Self>, SupervisorError> {
        let health = EngineHealth::new(config.backoff_base());
        let metrics = EngineMetrics::new()?;
        metrics.set_up(false);
        Ok(Arc::new(Self {
            launcher,
            config,
            defaults,
            engine: RwLock::new(None),
            health: Mutex::new(health),
            metrics,
            restart_lock: tokio::sync::Mutex::new(()),
            monitor: Mutex::new(None),
        }))
    }

    /// Launch the engine if it is not running and spawn the monitor task.
    pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
        self.launch_if_needed().await?;
        self.spawn_monitor();
        Ok(())
    }

    /// Launch the engine without starting the monitor.
    pub async fn launch_if_needed(&self) -> Result<(), SupervisorError> {
        let _guard = self.restart_lock.lock().await;
        if self.engine.read().await.is_some() {
            return Ok(());
        }

        self.set_state(SupervisorState::Starting);
        info!("Launching engine");
        match self.launcher.launch().await {
            Ok(engine) => {
                *self.engine.write().await = Some(engine);
                self.mark_running();
                info!("Engine running");
                Ok(())
            }
            Err(e) => {
                self.mark_stopped();
                error!("Engine launch failed: {}", e);
                Err(SupervisorError::EngineStart(e))
            }
        }
    }

    fn spawn_monitor(self: &Arc<Self>) {
        let mut slot = self.monitor.lock();
        if slot.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).monitor_loop(cancel.clone()));
        *slot = Some(MonitorHandle { cancel, task });
    }

    async fn monitor_loop(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.config.probe_interval();
        let base = self.config.backoff_base();
        let max = self.config.backoff_max();
        let mut backoff = base;

        debug!(interval_ms = interval.as_millis() as u64, "Health monitor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let this = Arc::clone(&self);
            let mut probe = tokio::spawn(async move { this.probe_now().await });
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    probe.abort();
                    break;
                }
                joined = &mut probe => joined,
            };

            match joined {
                Ok(true) => backoff = base,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        backoff_ms = backoff.as_millis() as u64,
                        "Health probe task failed: {}", e
                    );
                    let wait = backoff;
                    backoff = next_backoff(backoff, max);
                    self.health.lock().current_backoff = backoff;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
        debug!("Health monitor stopped");
    }

    /// Run one health probe and restart the engine if it fails.
    /// Returns whether the probe was healthy.
    pub async fn probe_now(&self) -> bool {
        match self.probe().await {
            Ok(()) => {
                let mut health = self.health.lock();
                health.up = true;
                health.state = SupervisorState::Running;
                health.current_backoff = self.config.backoff_base();
                self.metrics.set_up(true);
                true
            }
            Err(e) => {
                warn!("Health probe failed: {}", e);
                self.restart().await;
                false
            }
        }
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let engine = self.current_engine().await.ok_or(BackendError::NotReady)?;
        let timeout = self.config.probe_timeout();

        let run = async {
            let context = engine.new_context(&self.defaults).await?;
            let result = async {
                let page = context.new_page().await?;
                let nav = page.navigate(PROBE_URL).await;
                if let Err(e) = page.close().await {
                    debug!("Failed to close probe page: {}", e);
                }
                nav.map(|_| ())
            }
            .await;
            if let Err(e) = context.close().await {
                debug!("Failed to close probe context: {}", e);
            }
            result
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(format!(
                "health probe exceeded {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Close the current process (if any) and launch a new one. A failed
    /// relaunch leaves the supervisor stopped until the next probe.
    async fn restart(&self) {
        let _guard = self.restart_lock.lock().await;
        let restart_count = {
            let mut health = self.health.lock();
            health.up = false;
            health.state = SupervisorState::Restarting;
            health.restart_count += 1;
            let now = Utc::now();
            let ts = match health.last_restart_ts {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            health.last_restart_ts = Some(ts);
            self.metrics.set_up(false);
            self.metrics.record_restart(ts);
            health.restart_count
        };
        warn!(restart_count, "Restarting engine");

        let previous = self.engine.write().await.take();
        if let Some(engine) = previous {
            if let Err(e) = engine.close().await {
                warn!("Error closing engine before restart: {}", e);
            }
        }

        self.set_state(SupervisorState::Starting);
        match self.launcher.launch().await {
            Ok(engine) => {
                *self.engine.write().await = Some(engine);
                self.mark_running();
                info!(restart_count, "Engine restarted");
            }
            Err(e) => {
                self.mark_stopped();
                error!(restart_count, "Engine restart failed: {}", e);
            }
        }
    }

    /// Cancel the monitor, wait a bounded time for it, then close the engine.
    pub async fn stop(&self) {
        let monitor = self.monitor.lock().take();
        if let Some(MonitorHandle { cancel, mut task }) = monitor {
            cancel.cancel();
            let stop_timeout = self.config.stop_timeout();
            if tokio::time::timeout(stop_timeout, &mut task).await.is_err() {
                warn!(
                    "Health monitor did not stop within {}ms, aborting",
                    stop_timeout.as_millis()
                );
                task.abort();
            }
        }

        let _guard = self.restart_lock.lock().await;
        let engine = self.engine.write().await.take();
        if let Some(engine) = engine {
            if let Err(e) = engine.close().await {
                warn!("Error closing engine: {}", e);
            }
        }
        self.mark_stopped();
        info!("Engine stopped");
    }

    /// Create an isolated context. The configured defaults fill any option
    /// the caller left unset.
    pub async fn new_context(
        &self,
        options: ContextOptions,
    ) -> Result<Arc<dyn BrowserContext>, SupervisorError> {
        let engine = self
            .current_engine()
            .await
            .ok_or_else(|| SupervisorError::EngineUnavailable("engine is not running".into()))?;
        let options = options.merged_with(&self.defaults);
        engine
            .new_context(&options)
            .await
            .map_err(|e| SupervisorError::EngineUnavailable(e.to_string()))
    }

    pub fn health(&self) -> EngineHealth {
        self.health.lock().clone()
    }

    pub fn is_available(&self) -> bool {
        self.health.lock().up
    }

    pub fn ensure_available(&self) -> Result<(), SupervisorError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(SupervisorError::EngineUnavailable(
                "engine is down or restarting".into(),
            ))
        }
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    async fn current_engine(&self) -> Option<Arc<dyn Engine>> {
        self.engine.read().await.clone()
    }

    fn set_state(&self, state: SupervisorState) {
        self.health.lock().state = state;
    }

    fn mark_running(&self) {
        let mut health = self.health.lock();
        health.up = true;
        health.state = SupervisorState::Running;
        self.metrics.set_up(true);
    }

    fn mark_stopped(&self) {
        let mut health = self.health.lock();
        health.up = false;
        health.state = SupervisorState::Stopped;
        self.metrics.set_up(false);
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
