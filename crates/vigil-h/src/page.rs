use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vigil_common::{NavigationResult, Point};
use vigil_engine::backend::{BackendError, ContextOptions, Page};

/// A single tab driven through raw input events.
pub struct CdpPage {
    page: chromiumoxide::Page,
    navigation_timeout: Duration,
}

impl CdpPage {
    pub fn new(page: chromiumoxide::Page, navigation_timeout: Duration) -> Self {
        Self {
            page,
            navigation_timeout,
        }
    }

    pub(crate) async fn apply_overrides(&self, options: &ContextOptions) -> Result<(), BackendError> {
        if let Some(viewport) = options.viewport {
            let params = SetDeviceMetricsOverrideParams::builder()
                .width(viewport.width as i64)
                .height(viewport.height as i64)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(BackendError::Other)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| BackendError::Other(format!("Failed to set viewport: {}", e)))?;
        }

        if let Some(user_agent) = &options.user_agent {
            self.page
                .execute(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(|e| BackendError::Other(format!("Failed to set user agent: {}", e)))?;
        }

        if options.ignore_https_errors == Some(true) {
            self.page
                .execute(SetIgnoreCertificateErrorsParams::new(true))
                .await
                .map_err(|e| {
                    BackendError::Other(format!("Failed to ignore certificate errors: {}", e))
                })?;
        }
        Ok(())
    }

    /// Accept alert/confirm/prompt dialogs as they open, so a stray dialog
    /// never blocks screenshots or input.
    pub(crate) async fn auto_accept_dialogs(&self) {
        let mut dialogs = match self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to subscribe to dialog events: {}", e);
                return;
            }
        };

        let page = self.page.clone();
        tokio::spawn(async move {
            while let Some(event) = dialogs.next().await {
                info!("Accepting JavaScript dialog: {} ({:?})", event.message, event.r#type);
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                    error!("Failed to accept dialog: {}", e);
                }
            }
        });
    }

    async fn navigation_result(&self) -> Result<NavigationResult, BackendError> {
        let title = self
            .page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = self
            .page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult {
            url,
            title,
            status: 200,
        })
    }

    async fn mouse(
        &self,
        primitive: &str,
        kind: DispatchMouseEventType,
        point: Point,
    ) -> Result<(), BackendError> {
        let pressing = !matches!(kind, DispatchMouseEventType::MouseMoved);
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(point.x as f64)
            .y(point.y as f64);
        if pressing {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder
            .build()
            .map_err(|e| BackendError::primitive(primitive, e))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| BackendError::primitive(primitive, e))?;
        Ok(())
    }

    async fn key(&self, kind: DispatchKeyEventType, key: &str) -> Result<(), BackendError> {
        let params = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key(key)
            .build()
            .map_err(|e| BackendError::primitive("press_key", e))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| BackendError::primitive("press_key", e))?;
        Ok(())
    }

    async fn find(&self, selector: &str) -> Result<chromiumoxide::Element, BackendError> {
        self.page.find_element(selector).await.map_err(|e| {
            debug!("Selector '{}' did not match: {}", selector, e);
            BackendError::ElementNotFound {
                selector: selector.to_string(),
            }
        })
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn navigate(&self, url: &str) -> Result<NavigationResult, BackendError> {
        debug!("Navigating to: {}", url);
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => self.navigation_result().await,
            Ok(Err(e)) => Err(BackendError::Navigation(e.to_string())),
            Err(_) => Err(BackendError::Timeout(format!(
                "navigation to {} after {}ms",
                url,
                self.navigation_timeout.as_millis()
            ))),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BackendError> {
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| BackendError::primitive("screenshot", e))
    }

    async fn click_at(&self, point: Point) -> Result<(), BackendError> {
        self.mouse("click_at", DispatchMouseEventType::MouseMoved, point)
            .await?;
        self.mouse("click_at", DispatchMouseEventType::MousePressed, point)
            .await?;
        self.mouse("click_at", DispatchMouseEventType::MouseReleased, point)
            .await
    }

    async fn click_selector(&self, selector: &str) -> Result<(), BackendError> {
        let element = self.find(selector).await?;
        element
            .click()
            .await
            .map_err(|e| BackendError::primitive("click_selector", e))?;
        Ok(())
    }

    async fn type_at(&self, point: Point, text: &str) -> Result<(), BackendError> {
        self.click_at(point).await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(|e| BackendError::primitive("type_at", e))?;
        Ok(())
    }

    async fn type_selector(&self, selector: &str, text: &str) -> Result<(), BackendError> {
        let element = self.find(selector).await?;
        element
            .click()
            .await
            .map_err(|e| BackendError::primitive("type_selector", e))?;
        element
            .type_str(text)
            .await
            .map_err(|e| BackendError::primitive("type_selector", e))?;
        Ok(())
    }

    async fn hover(&self, point: Point) -> Result<(), BackendError> {
        self.mouse("hover", DispatchMouseEventType::MouseMoved, point)
            .await
    }

    async fn scroll(&self, dx: i64, dy: i64) -> Result<(), BackendError> {
        self.page
            .evaluate(format!("window.scrollBy({}, {})", dx, dy))
            .await
            .map_err(|e| BackendError::primitive("scroll", e))?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), BackendError> {
        self.key(DispatchKeyEventType::KeyDown, key).await?;
        self.key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BackendError::primitive("close", e))
    }
}
