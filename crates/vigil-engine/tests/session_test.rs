use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vigil_common::{Action, ActionDecision, SessionId, SessionStatus};
use vigil_engine::backend::ContextOptions;
use vigil_engine::config::{BrowserConfig, HealthConfig};
use vigil_engine::session::{CreateSession, SessionError, SessionRegistry};
use vigil_engine::supervisor::Supervisor;
use vigil_engine::testing::{MockControls, MockLauncher, PNG_SIGNATURE, PageCall};

struct Harness {
    _root: TempDir,
    supervisor: Arc<Supervisor>,
    registry: SessionRegistry,
    controls: Arc<MockControls>,
}

async fn harness() -> Harness {
    let root = TempDir::new().unwrap();
    let launcher = MockLauncher::new();
    let controls = Arc::clone(&launcher.controls);
    let supervisor = Supervisor::new(
        Arc::new(launcher),
        HealthConfig {
            probe_interval_ms: 3_600_000,
            ..HealthConfig::default()
        },
        ContextOptions::from(&BrowserConfig::default()),
    )
    .unwrap();
    supervisor.start().await.unwrap();
    let registry = SessionRegistry::new(Arc::clone(&supervisor), root.path());
    Harness {
        _root: root,
        supervisor,
        registry,
        controls,
    }
}

fn dir_count(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_create_allocates_artifacts_dir() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();

    assert!(session.artifacts_dir().is_dir());
    assert_eq!(
        session.artifacts_dir(),
        h.registry.artifacts_root().join(session.id().as_str())
    );
    assert_eq!(session.status(), SessionStatus::Active);
    assert_eq!(session.id().as_str().len(), 32);
    assert_eq!(h.registry.list().len(), 1);
    assert_eq!(h.registry.active_count(), 1);
}

#[tokio::test]
async fn test_session_ids_are_unique() {
    let h = harness().await;
    let mut ids = std::collections::HashSet::new();
    for _ in 0..20 {
        let s = h.registry.create(CreateSession::default()).await.unwrap();
        assert!(ids.insert(s.id().clone()));
    }
}

#[tokio::test]
async fn test_create_requires_available_engine() {
    let h = harness().await;
    h.supervisor.stop().await;

    let err = h
        .registry
        .create(CreateSession::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::EngineUnavailable(_)));
    assert_eq!(dir_count(h.registry.artifacts_root()), 0);
    assert!(h.registry.list().is_empty());
}

#[tokio::test]
async fn test_failed_page_cleans_up() {
    let h = harness().await;
    MockControls::set(&h.controls.fail_new_page, true);

    let err = h
        .registry
        .create(CreateSession::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::Backend(_)));
    assert_eq!(dir_count(h.registry.artifacts_root()), 0);
    // The half-created context was closed.
    assert_eq!(MockControls::count(&h.controls.contexts_closed), 1);
    assert!(h.registry.list().is_empty());
}

#[tokio::test]
async fn test_video_sets_record_dir() {
    let h = harness().await;
    let session = h
        .registry
        .create(CreateSession {
            video: true,
            ..CreateSession::default()
        })
        .await
        .unwrap();

    let options = h.controls.context_options.lock().last().cloned().unwrap();
    assert_eq!(
        options.record_video_dir.as_deref(),
        Some(session.artifacts_dir())
    );

    assert_eq!(h.registry.video_path(session.id()).await, None);
    std::fs::write(session.artifacts_dir().join("notes.txt"), b"x").unwrap();
    std::fs::write(session.artifacts_dir().join("page-1.webm"), b"x").unwrap();
    assert_eq!(
        h.registry.video_path(session.id()).await,
        Some(session.artifacts_dir().join("page-1.webm"))
    );
}

#[tokio::test]
async fn test_video_extension_ignores_case() {
    let h = harness().await;
    let session = h
        .registry
        .create(CreateSession {
            video: true,
            ..CreateSession::default()
        })
        .await
        .unwrap();
    std::fs::write(session.artifacts_dir().join("Capture.WEBM"), b"x").unwrap();
    assert_eq!(
        h.registry.video_path(session.id()).await,
        Some(session.artifacts_dir().join("Capture.WEBM"))
    );
}

#[tokio::test]
async fn test_video_path_requires_recording() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    std::fs::write(session.artifacts_dir().join("clip.mp4"), b"x").unwrap();
    assert_eq!(h.registry.video_path(session.id()).await, None);
}

#[tokio::test]
async fn test_snapshot_writes_png() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    let before = session.info().last_update;

    let path = h
        .registry
        .snapshot(session.id(), "../../escape/shot.png")
        .await
        .unwrap();
    assert_eq!(path, session.artifacts_dir().join("shot.png"));
    assert_eq!(std::fs::read(&path).unwrap(), PNG_SIGNATURE);
    assert!(session.info().last_update >= before);
}

#[tokio::test]
async fn test_snapshot_unknown_session() {
    let h = harness().await;
    let err = h
        .registry
        .snapshot(&SessionId::from("nope"), "x.png")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test]
async fn test_close_removes_artifacts_by_default() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    let dir = session.artifacts_dir().to_path_buf();

    assert!(h.registry.close(session.id(), Some(false)).await);
    assert!(!dir.exists());
    assert!(h.registry.get(session.id()).is_none());
    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(h.controls.calls.lock().contains(&PageCall::Close));
}

#[tokio::test]
async fn test_close_keep_preserves_artifacts() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    let dir = session.artifacts_dir().to_path_buf();

    assert!(h.registry.close(session.id(), Some(true)).await);
    assert!(dir.is_dir());
    assert!(h.registry.get(session.id()).is_none());
}

#[tokio::test]
async fn test_close_uses_stored_keep_flag() {
    let h = harness().await;
    let kept = h
        .registry
        .create(CreateSession {
            keep_artifacts: true,
            ..CreateSession::default()
        })
        .await
        .unwrap();
    let dir = kept.artifacts_dir().to_path_buf();
    assert!(h.registry.close(kept.id(), None).await);
    assert!(dir.is_dir());

    // An explicit argument overrides the stored flag.
    let kept = h
        .registry
        .create(CreateSession {
            keep_artifacts: true,
            ..CreateSession::default()
        })
        .await
        .unwrap();
    let dir = kept.artifacts_dir().to_path_buf();
    assert!(h.registry.close(kept.id(), Some(false)).await);
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_close_unknown_returns_false() {
    let h = harness().await;
    assert!(!h.registry.close(&SessionId::from("missing"), None).await);
}

#[tokio::test]
async fn test_close_tolerates_page_close_failure() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    MockControls::set(&h.controls.fail_page_close, true);

    assert!(h.registry.close(session.id(), None).await);
    assert_eq!(MockControls::count(&h.controls.contexts_closed), 1);
    assert!(h.registry.get(session.id()).is_none());
}

#[tokio::test]
async fn test_expire_force_closes_old_active_sessions() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    let dir = session.artifacts_dir().to_path_buf();

    assert_eq!(h.registry.expire(Duration::from_secs(3600)).await, 0);
    assert!(h.registry.get(session.id()).is_some());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.registry.expire(Duration::from_millis(5)).await, 1);
    assert!(h.registry.get(session.id()).is_none());
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_failed_artifact_removal_leaves_error_session_for_expire() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    let dir = session.artifacts_dir().to_path_buf();

    // A plain file where the directory was makes the removal fail.
    std::fs::remove_dir_all(&dir).unwrap();
    std::fs::write(&dir, b"not a directory").unwrap();

    assert!(h.registry.close(session.id(), None).await);
    let kept = h.registry.get(session.id()).expect("session stays registered");
    assert_eq!(kept.status(), SessionStatus::Error);
    assert!(!kept.is_active());
    assert_eq!(h.registry.active_count(), 0);
    assert!(h.registry.active(session.id()).is_err());

    // Still younger than the TTL.
    assert_eq!(h.registry.expire(Duration::from_secs(3600)).await, 0);
    assert!(h.registry.get(session.id()).is_some());

    // Once the path is a directory again, expiry removes it and the entry.
    std::fs::remove_file(&dir).unwrap();
    std::fs::create_dir_all(dir.join("nested")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.registry.expire(Duration::from_millis(5)).await, 1);
    assert!(h.registry.get(session.id()).is_none());
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_expire_purges_stale_entry_even_if_removal_fails() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    let dir = session.artifacts_dir().to_path_buf();
    std::fs::remove_dir_all(&dir).unwrap();
    std::fs::write(&dir, b"x").unwrap();
    assert!(h.registry.close(session.id(), Some(false)).await);
    assert_eq!(h.registry.list().len(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.registry.expire(Duration::from_millis(5)).await, 1);
    assert!(h.registry.list().is_empty());
    // Closing again reports an unknown session.
    assert!(!h.registry.close(session.id(), None).await);
}

#[tokio::test]
async fn test_history_is_append_only() {
    let h = harness().await;
    let session = h.registry.create(CreateSession::default()).await.unwrap();
    let scroll = ActionDecision::new(Action::Scroll { target: None }, 0.9, "look");

    session.record(scroll.clone());
    session.record(scroll.clone());
    let history = h.registry.history(session.id()).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].ts <= history[1].ts);
    assert_eq!(session.recent_actions(5), vec![scroll.clone(), scroll]);
    assert_eq!(session.info().executed_actions, 2);
}

#[tokio::test]
async fn test_close_all() {
    let h = harness().await;
    let a = h.registry.create(CreateSession::default()).await.unwrap();
    let b = h
        .registry
        .create(CreateSession {
            keep_artifacts: true,
            ..CreateSession::default()
        })
        .await
        .unwrap();

    assert_eq!(h.registry.close_all().await, 2);
    assert!(h.registry.list().is_empty());
    assert!(!a.artifacts_dir().exists());
    assert!(!b.artifacts_dir().exists());
}
