//! Seams to the browsing engine.
//!
//! The supervisor launches one [`Engine`] through an [`EngineLauncher`], every
//! session owns one [`BrowserContext`] with a single [`Page`], and the
//! dispatcher drives pages through their primitives.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
pub use vigil_common::BackendError;
use vigil_common::{NavigationResult, Point, Viewport};

/// Per-context overrides. Fields left as `None` fall back to the engine
/// defaults supplied by the supervisor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOptions {
    pub viewport: Option<Viewport>,
    pub user_agent: Option<String>,
    pub ignore_https_errors: Option<bool>,
    pub record_video_dir: Option<PathBuf>,
}

impl ContextOptions {
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_record_video_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_video_dir = Some(dir.into());
        self
    }

    /// Fill every unset field from `defaults`.
    pub fn merged_with(mut self, defaults: &ContextOptions) -> Self {
        if self.viewport.is_none() {
            self.viewport = defaults.viewport;
        }
        if self.user_agent.is_none() {
            self.user_agent = defaults.user_agent.clone();
        }
        if self.ignore_https_errors.is_none() {
            self.ignore_https_errors = defaults.ignore_https_errors;
        }
        if self.record_video_dir.is_none() {
            self.record_video_dir = defaults.record_video_dir.clone();
        }
        self
    }
}

#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Start a fresh engine process.
    async fn launch(&self) -> Result<Arc<dyn Engine>, BackendError>;
}

/// A running engine process.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn new_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Arc<dyn BrowserContext>, BackendError>;

    /// Shut the process down and release its resources.
    async fn close(&self) -> Result<(), BackendError>;
}

/// An isolated browsing context (separate cookies, storage and cache).
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn Page>, BackendError>;

    async fn close(&self) -> Result<(), BackendError>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<NavigationResult, BackendError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, BackendError>;

    async fn click_at(&self, point: Point) -> Result<(), BackendError>;

    async fn click_selector(&self, selector: &str) -> Result<(), BackendError>;

    /// Focus whatever sits at `point`, then insert `text`.
    async fn type_at(&self, point: Point, text: &str) -> Result<(), BackendError>;

    async fn type_selector(&self, selector: &str, text: &str) -> Result<(), BackendError>;

    async fn hover(&self, point: Point) -> Result<(), BackendError>;

    async fn scroll(&self, dx: i64, dy: i64) -> Result<(), BackendError>;

    async fn press_key(&self, key: &str) -> Result<(), BackendError>;

    async fn close(&self) -> Result<(), BackendError>;
}
