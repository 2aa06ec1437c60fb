use crate::page::CdpPage;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vigil_engine::backend::{
    BackendError, BrowserContext, ContextOptions, Engine, EngineLauncher, Page,
};
use vigil_engine::config::BrowserConfig;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches a fresh Chromium process per call, configured from
/// [`BrowserConfig`].
#[derive(Debug, Clone)]
pub struct CdpLauncher {
    config: BrowserConfig,
}

impl CdpLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLauncher for CdpLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, BackendError> {
        let engine = CdpEngine::launch(&self.config).await?;
        Ok(Arc::new(engine))
    }
}

/// State shared between the engine and the contexts it hands out.
struct BrowserHandle {
    /// `None` once the engine is closed.
    browser: RwLock<Option<Browser>>,
    navigation_timeout: Duration,
}

pub struct CdpEngine {
    handle: Arc<BrowserHandle>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    user_data_dir: PathBuf,
    cleanup_user_data_dir: bool,
}

impl CdpEngine {
    pub async fn launch(config: &BrowserConfig) -> Result<Self, BackendError> {
        let (user_data_dir, cleanup_user_data_dir) = resolve_user_data_dir(config)?;

        let mut builder = ChromeConfig::builder()
            .no_sandbox()
            .user_data_dir(&user_data_dir)
            .window_size(config.viewport.width, config.viewport.height)
            .request_timeout(config.navigation_timeout())
            .args(config.launch_args());

        if config.headless {
            info!("Launching browser in headless mode");
        } else {
            info!("Launching browser in visible mode");
            builder = builder.with_head();
        }

        if let Some(executable) = &config.executable {
            info!("Using custom Chrome binary: {}", executable.display());
            builder = builder.chrome_executable(executable);
        }

        let launched = match builder.build() {
            Ok(chrome_config) => Browser::launch(chrome_config)
                .await
                .map_err(|e| BackendError::Other(format!("Failed to launch browser: {}", e))),
            Err(e) => Err(BackendError::Other(format!(
                "Failed to build browser config: {}",
                e
            ))),
        };
        let (browser, mut handler) = match launched {
            Ok(pair) => pair,
            Err(e) => {
                if cleanup_user_data_dir {
                    remove_profile(&user_data_dir);
                }
                return Err(e);
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser handler error (ignoring): {}", e);
                }
            }
            info!("Browser handler task ended");
        });

        Ok(Self {
            handle: Arc::new(BrowserHandle {
                browser: RwLock::new(Some(browser)),
                navigation_timeout: config.navigation_timeout(),
            }),
            handler_task: Mutex::new(Some(handler_task)),
            user_data_dir,
            cleanup_user_data_dir,
        })
    }
}

#[async_trait]
impl Engine for CdpEngine {
    async fn new_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Arc<dyn BrowserContext>, BackendError> {
        if let Some(dir) = &options.record_video_dir {
            warn!(
                dir = %dir.display(),
                "Video recording is not available over CDP, the session will have no video"
            );
        }

        let guard = self.handle.browser.read().await;
        let browser = guard.as_ref().ok_or(BackendError::NotReady)?;
        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| BackendError::Other(format!("Failed to create browser context: {}", e)))?;
        let id = created.result.browser_context_id.clone();
        debug!(context = ?id, "Created browser context");

        Ok(Arc::new(CdpContext {
            handle: Arc::clone(&self.handle),
            id,
            options: options.clone(),
        }))
    }

    async fn close(&self) -> Result<(), BackendError> {
        let mut result = Ok(());

        if let Some(mut browser) = self.handle.browser.write().await.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, browser.close()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    result = Err(BackendError::Other(format!("Error closing browser: {}", e)));
                }
                Err(_) => {
                    result = Err(BackendError::Timeout("browser close".into()));
                }
            }
            if let Err(e) = browser.kill().await.transpose() {
                debug!("Browser process already gone: {}", e);
            }
        }

        if let Some(mut task) = self.handler_task.lock().await.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!("Browser handler did not stop in time, aborting it");
                task.abort();
            }
        }

        if self.cleanup_user_data_dir {
            remove_profile(&self.user_data_dir);
        }
        result
    }
}

/// One `Target.createBrowserContext` context; pages opened here share its
/// cookies and storage and nothing else.
pub struct CdpContext {
    handle: Arc<BrowserHandle>,
    id: BrowserContextId,
    options: ContextOptions,
}

impl CdpContext {
    pub fn id(&self) -> &BrowserContextId {
        &self.id
    }
}

#[async_trait]
impl BrowserContext for CdpContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>, BackendError> {
        let page = {
            let guard = self.handle.browser.read().await;
            let browser = guard.as_ref().ok_or(BackendError::NotReady)?;
            let params = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(self.id.clone())
                .build()
                .map_err(BackendError::Other)?;
            browser
                .new_page(params)
                .await
                .map_err(|e| BackendError::Other(format!("Failed to create page: {}", e)))?
        };

        let page = CdpPage::new(page, self.handle.navigation_timeout);
        if let Err(e) = page.apply_overrides(&self.options).await {
            if let Err(close_err) = page.close().await {
                debug!("Failed to close page after override error: {}", close_err);
            }
            return Err(e);
        }
        page.auto_accept_dialogs().await;
        Ok(Arc::new(page))
    }

    async fn close(&self) -> Result<(), BackendError> {
        let guard = self.handle.browser.read().await;
        // Closing the engine already tore the context down.
        let Some(browser) = guard.as_ref() else {
            return Ok(());
        };
        browser
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .map_err(|e| BackendError::Other(format!("Failed to dispose browser context: {}", e)))?;
        debug!(context = ?self.id, "Disposed browser context");
        Ok(())
    }
}

fn resolve_user_data_dir(config: &BrowserConfig) -> Result<(PathBuf, bool), BackendError> {
    if let Some(dir) = &config.user_data_dir {
        std::fs::create_dir_all(dir)?;
        info!("Using configured user data dir: {}", dir.display());
        return Ok((dir.clone(), false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BackendError::Other(format!("System clock error: {}", e)))?
        .as_nanos();
    let unique = format!("vigil-chromium-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    info!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}

fn remove_profile(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        debug!("Failed to clean up user-data-dir {}: {}", dir.display(), e);
    }
}
