//! In-memory engine for tests. Every object shares one [`MockControls`], so a
//! test can flip failure switches and inspect recorded calls while the
//! supervisor and registry run against it.

use crate::backend::{BackendError, BrowserContext, ContextOptions, Engine, EngineLauncher, Page};
use crate::config::VigilConfig;
use crate::supervisor::PROBE_URL;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use vigil_common::{NavigationResult, Point};

/// Smallest byte prefix a PNG reader recognises.
pub const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    Navigate(String),
    Screenshot,
    ClickAt(Point),
    ClickSelector(String),
    TypeAt(Point, String),
    TypeSelector(String, String),
    Hover(Point),
    Scroll(i64, i64),
    PressKey(String),
    Close,
}

#[derive(Debug, Default)]
pub struct MockControls {
    pub fail_launch: AtomicBool,
    /// Navigations to the health-probe URL fail.
    pub fail_probe: AtomicBool,
    /// `new_context` panics, as a broken engine binding would.
    pub panic_on_context: AtomicBool,
    pub fail_new_context: AtomicBool,
    pub fail_new_page: AtomicBool,
    pub fail_screenshot: AtomicBool,
    pub fail_primitives: AtomicBool,
    pub fail_page_close: AtomicBool,
    pub launches: AtomicUsize,
    pub engines_closed: AtomicUsize,
    pub contexts_created: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub calls: Mutex<Vec<PageCall>>,
    pub context_options: Mutex<Vec<ContextOptions>>,
}

impl MockControls {
    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Page calls except screenshots and closes.
    pub fn actions(&self) -> Vec<PageCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| !matches!(call, PageCall::Screenshot | PageCall::Close))
            .cloned()
            .collect()
    }

    fn record(&self, call: PageCall) {
        self.calls.lock().push(call);
    }

    fn check(&self, flag: &AtomicBool, primitive: &str) -> Result<(), BackendError> {
        if flag.load(Ordering::SeqCst) {
            Err(BackendError::primitive(primitive, "mock failure"))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockLauncher {
    pub controls: Arc<MockControls>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EngineLauncher for MockLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, BackendError> {
        self.controls.check(&self.controls.fail_launch, "launch")?;
        self.controls.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockEngine {
            controls: Arc::clone(&self.controls),
        }))
    }
}

pub struct MockEngine {
    controls: Arc<MockControls>,
}

#[async_trait]
impl Engine for MockEngine {
    async fn new_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Arc<dyn BrowserContext>, BackendError> {
        if self.controls.panic_on_context.load(Ordering::SeqCst) {
            panic!("mock engine panicked while creating a context");
        }
        self.controls
            .check(&self.controls.fail_new_context, "new_context")?;
        self.controls.contexts_created.fetch_add(1, Ordering::SeqCst);
        self.controls.context_options.lock().push(options.clone());
        Ok(Arc::new(MockContext {
            controls: Arc::clone(&self.controls),
        }))
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.controls.engines_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockContext {
    controls: Arc<MockControls>,
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>, BackendError> {
        self.controls.check(&self.controls.fail_new_page, "new_page")?;
        Ok(Arc::new(MockPage {
            controls: Arc::clone(&self.controls),
        }))
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.controls.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockPage {
    controls: Arc<MockControls>,
}

impl MockPage {
    fn primitive(&self, name: &str, call: PageCall) -> Result<(), BackendError> {
        self.controls.check(&self.controls.fail_primitives, name)?;
        self.controls.record(call);
        Ok(())
    }
}

#[async_trait]
impl Page for MockPage {
    async fn navigate(&self, url: &str) -> Result<NavigationResult, BackendError> {
        if url == PROBE_URL {
            if self.controls.fail_probe.load(Ordering::SeqCst) {
                return Err(BackendError::Navigation("mock probe failure".into()));
            }
        } else {
            self.primitive("navigate", PageCall::Navigate(url.to_string()))?;
        }
        Ok(NavigationResult {
            url: url.to_string(),
            title: "Mock Page".to_string(),
            status: 200,
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BackendError> {
        self.controls
            .check(&self.controls.fail_screenshot, "screenshot")?;
        self.controls.record(PageCall::Screenshot);
        Ok(PNG_SIGNATURE.to_vec())
    }

    async fn click_at(&self, point: Point) -> Result<(), BackendError> {
        self.primitive("click_at", PageCall::ClickAt(point))
    }

    async fn click_selector(&self, selector: &str) -> Result<(), BackendError> {
        self.primitive("click_selector", PageCall::ClickSelector(selector.to_string()))
    }

    async fn type_at(&self, point: Point, text: &str) -> Result<(), BackendError> {
        self.primitive("type_at", PageCall::TypeAt(point, text.to_string()))
    }

    async fn type_selector(&self, selector: &str, text: &str) -> Result<(), BackendError> {
        self.primitive(
            "type_selector",
            PageCall::TypeSelector(selector.to_string(), text.to_string()),
        )
    }

    async fn hover(&self, point: Point) -> Result<(), BackendError> {
        self.primitive("hover", PageCall::Hover(point))
    }

    async fn scroll(&self, dx: i64, dy: i64) -> Result<(), BackendError> {
        self.primitive("scroll", PageCall::Scroll(dx, dy))
    }

    async fn press_key(&self, key: &str) -> Result<(), BackendError> {
        self.primitive("press_key", PageCall::PressKey(key.to_string()))
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.controls
            .check(&self.controls.fail_page_close, "close")?;
        self.controls.record(PageCall::Close);
        Ok(())
    }
}

/// Defaults with artifacts under `root` and a monitor that effectively never
/// fires on its own.
pub fn test_config(root: &Path) -> VigilConfig {
    let mut config = VigilConfig::default();
    config.sessions.artifacts_root = root.to_path_buf();
    config.health.probe_interval_ms = 3_600_000;
    config.health.stop_timeout_ms = 500;
    config
}
