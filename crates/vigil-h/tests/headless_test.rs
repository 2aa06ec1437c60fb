use serial_test::serial;
use std::sync::Arc;
use vigil_common::Point;
use vigil_common::protocol::{CreateSessionRequest, LoopRequest};
use vigil_engine::AgentService;
use vigil_engine::backend::{ContextOptions, Engine, EngineLauncher};
use vigil_engine::config::{BrowserConfig, VigilConfig};
use vigil_engine::scripted::{ScriptedReasoner, StaticPerception};
use vigil_h::CdpLauncher;

const PAGE: &str = "data:text/html,<html><head><title>Test Page</title></head><body>\
<input id='q' style='position:absolute;left:10px;top:10px;width:200px;height:30px'>\
<button id='btn' onclick=\"document.title='clicked'\">Click Me</button>\
<div style='height:4000px'></div></body></html>";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .ok();
}

async fn launch() -> Option<Arc<dyn Engine>> {
    match CdpLauncher::new(BrowserConfig::default()).launch().await {
        Ok(engine) => Some(engine),
        Err(e) => {
            eprintln!("Failed to launch browser (is Chromium installed?): {}", e);
            None
        }
    }
}

#[tokio::test]
#[serial]
async fn test_page_primitives() {
    init_tracing();
    let Some(engine) = launch().await else {
        return;
    };

    let context = engine
        .new_context(&ContextOptions::default().with_viewport(vigil_common::Viewport {
            width: 1024,
            height: 768,
        }))
        .await
        .expect("context");
    let page = context.new_page().await.expect("page");

    let nav = page.navigate(PAGE).await.expect("Navigation failed");
    assert_eq!(nav.title, "Test Page");

    let png = page.screenshot().await.expect("screenshot");
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

    page.type_at(Point::new(50, 25), "hello").await.expect("type_at");
    page.click_selector("#btn").await.expect("click_selector");
    page.press_key("Enter").await.expect("press_key");
    page.scroll(0, 500).await.expect("scroll");
    page.hover(Point::new(5, 5)).await.expect("hover");

    let missing = page.click_selector("#does-not-exist").await;
    assert!(missing.is_err());

    page.close().await.expect("page close");
    context.close().await.expect("context close");
    engine.close().await.expect("engine close");
}

#[tokio::test]
#[serial]
async fn test_contexts_are_isolated() {
    init_tracing();
    let Some(engine) = launch().await else {
        return;
    };

    let a = engine.new_context(&ContextOptions::default()).await.unwrap();
    let b = engine.new_context(&ContextOptions::default()).await.unwrap();
    let page_a = a.new_page().await.unwrap();
    let page_b = b.new_page().await.unwrap();

    page_a.navigate(PAGE).await.unwrap();
    page_a.click_selector("#btn").await.unwrap();
    let nav_b = page_b.navigate("data:text/html,<title>Other</title>").await.unwrap();
    assert_eq!(nav_b.title, "Other");

    a.close().await.unwrap();
    b.close().await.unwrap();
    engine.close().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_loop_against_real_browser() {
    init_tracing();
    let root = tempfile::TempDir::new().unwrap();
    let mut config = VigilConfig::default();
    config.sessions.artifacts_root = root.path().to_path_buf();
    config.health.probe_interval_ms = 3_600_000;

    let reasoner = ScriptedReasoner::from_str(
        r##"
- action: type
  target: {by: coords, value: "50,25"}
  value: hello
  confidence: 0.9
- action: click
  target: {by: selector, value: "#btn"}
  confidence: 0.9
- action: noop
  confidence: 1.0
  reason: done
"##,
    )
    .unwrap();
    let service = AgentService::new(
        config.clone(),
        Arc::new(CdpLauncher::new(config.browser.clone())),
        Arc::new(StaticPerception::new(Vec::new())),
        Arc::new(reasoner),
    )
    .unwrap();
    if let Err(e) = service.start().await {
        eprintln!("Failed to launch browser (is Chromium installed?): {}", e);
        return;
    }

    let session_id = service
        .create_session(CreateSessionRequest::default())
        .await
        .unwrap()
        .session_id;
    service.navigate(&session_id, PAGE).await.unwrap();

    let resp = service
        .run_loop(&session_id, LoopRequest::new("click the button"))
        .await
        .unwrap();
    assert!(resp.completed, "loop stopped early: {:?}", resp.reason);
    assert_eq!(resp.steps.len(), 3);
    assert!(resp.steps[0].executed);
    assert!(resp.steps[1].executed);

    assert!(service.supervisor().probe_now().await);
    service.shutdown().await;
}
