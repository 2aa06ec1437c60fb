use serial_test::serial;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use vigil_engine::config::{ConfigError, ConfigLoader, VigilConfig};

#[test]
fn test_default_values() {
    let config = VigilConfig::default();
    assert!(config.browser.headless);
    assert_eq!(config.browser.viewport.width, 1440);
    assert_eq!(config.browser.viewport.height, 900);
    assert_eq!(config.health.probe_interval_ms, 10000);
    assert_eq!(config.health.probe_timeout_ms, 10000);
    assert_eq!(config.health.backoff_base_ms, 2000);
    assert_eq!(config.health.backoff_max_ms, 60000);
    assert_eq!(config.health.stop_timeout_ms, 5000);
    assert_eq!(config.sessions.ttl_secs, 3600);
    assert_eq!(config.agent.confidence_threshold, 0.4);
    assert_eq!(config.agent.max_steps, 8);
    assert_eq!(config.agent.duplicate_window, 5);
    assert_eq!(config.agent.default_scroll_px, 500);
    assert_eq!(config.agent.default_key, "Enter");
    assert!(ConfigLoader::validate(&config).is_ok());
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
browser:
  headless: false
  viewport:
    width: 1280
    height: 720
  extra_args:
    - "--lang=en-US"
agent:
  max_steps: 3
"#
    )
    .unwrap();

    let config = ConfigLoader::load_from(file.path())
        .await
        .expect("Failed to load config from file");

    assert!(!config.browser.headless);
    assert_eq!(config.browser.viewport.width, 1280);
    assert_eq!(config.agent.max_steps, 3);
    // Untouched fields keep their defaults.
    assert_eq!(config.agent.confidence_threshold, 0.4);
    assert_eq!(config.health.backoff_base_ms, 2000);
    assert!(
        config
            .browser
            .launch_args()
            .contains(&"--lang=en-US".to_string())
    );
}

#[tokio::test]
async fn test_load_from_nonexistent_file() {
    let result =
        ConfigLoader::load_from(std::path::Path::new("/nonexistent/path/vigil.yaml")).await;
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[tokio::test]
async fn test_load_invalid_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "agent: [this is: not a map").unwrap();
    let result = ConfigLoader::load_from(file.path()).await;
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_launch_args() {
    let mut config = VigilConfig::default();
    let args = config.browser.launch_args();
    assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
    assert!(args.contains(&"--disable-web-security".to_string()));

    config.browser.disable_security = false;
    config.browser.user_agent = Some("VigilBot/1.0".into());
    let args = config.browser.launch_args();
    assert!(!args.contains(&"--disable-web-security".to_string()));
    assert!(args.contains(&"--user-agent=VigilBot/1.0".to_string()));
}

#[test]
fn test_overrides_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("VIGIL_HEADLESS", "false"),
        ("VIGIL_VIEWPORT_W", "800"),
        ("VIGIL_HEALTH_PROBE_INTERVAL_MS", "250"),
        ("VIGIL_CONFIDENCE_THRESHOLD", "0.75"),
        ("VIGIL_MAX_STEPS", "12"),
        ("VIGIL_ARTIFACTS_ROOT", "/var/tmp/vigil"),
        ("CHROME_BIN", "/opt/chrome/chrome"),
    ]
    .into_iter()
    .collect();

    let mut config = VigilConfig::default();
    ConfigLoader::apply_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string())).unwrap();

    assert!(!config.browser.headless);
    assert_eq!(config.browser.viewport.width, 800);
    assert_eq!(config.browser.viewport.height, 900);
    assert_eq!(config.health.probe_interval_ms, 250);
    assert_eq!(config.agent.confidence_threshold, 0.75);
    assert_eq!(config.agent.max_steps, 12);
    assert_eq!(config.sessions.artifacts_root, PathBuf::from("/var/tmp/vigil"));
    assert_eq!(
        config.browser.executable,
        Some(PathBuf::from("/opt/chrome/chrome"))
    );
}

#[test]
fn test_unparsable_override_is_an_error() {
    let mut config = VigilConfig::default();
    let err = ConfigLoader::apply_overrides(&mut config, |k| {
        (k == "VIGIL_MAX_STEPS").then(|| "lots".to_string())
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "VIGIL_MAX_STEPS"));
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = VigilConfig::default();
    config.agent.confidence_threshold = 1.5;
    assert!(matches!(
        ConfigLoader::validate(&config),
        Err(ConfigError::Invalid(_))
    ));

    let mut config = VigilConfig::default();
    config.agent.max_steps = 0;
    assert!(ConfigLoader::validate(&config).is_err());

    let mut config = VigilConfig::default();
    config.browser.viewport.height = 0;
    assert!(ConfigLoader::validate(&config).is_err());

    let mut config = VigilConfig::default();
    config.health.backoff_base_ms = 120_000;
    assert!(ConfigLoader::validate(&config).is_err());

    // Zero intervals would run the health monitor back to back.
    for field in ["probe_interval_ms", "probe_timeout_ms", "backoff_base_ms"] {
        let mut config = VigilConfig::default();
        match field {
            "probe_interval_ms" => config.health.probe_interval_ms = 0,
            "probe_timeout_ms" => config.health.probe_timeout_ms = 0,
            _ => config.health.backoff_base_ms = 0,
        }
        match ConfigLoader::validate(&config) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains(field), "{msg}"),
            other => panic!("{field}: expected Invalid, got {other:?}"),
        }
    }
}

#[test]
fn test_zero_probe_interval_from_env_fails_validation() {
    let mut config = VigilConfig::default();
    ConfigLoader::apply_overrides(&mut config, |var| {
        (var == "VIGIL_HEALTH_PROBE_INTERVAL_MS").then(|| "0".to_string())
    })
    .unwrap();
    assert_eq!(config.health.probe_interval_ms, 0);
    assert!(ConfigLoader::validate(&config).is_err());
}

#[test]
#[serial]
fn test_apply_env_reads_process_environment() {
    // SAFETY: serialized with the other environment tests.
    unsafe {
        std::env::set_var("VIGIL_HEADLESS", "0");
        std::env::set_var("VIGIL_RESTART_BACKOFF_MAX_MS", "90000");
    }

    let mut config = VigilConfig::default();
    let result = ConfigLoader::apply_env(&mut config);

    unsafe {
        std::env::remove_var("VIGIL_HEADLESS");
        std::env::remove_var("VIGIL_RESTART_BACKOFF_MAX_MS");
    }

    result.unwrap();
    assert!(!config.browser.headless);
    assert_eq!(config.health.backoff_max_ms, 90000);
}

#[tokio::test]
#[serial]
async fn test_load_applies_env_then_validates() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "agent:\n  max_steps: 4").unwrap();

    unsafe {
        std::env::set_var("VIGIL_CONFIDENCE_THRESHOLD", "2.0");
    }
    let result = ConfigLoader::load(Some(file.path())).await;
    unsafe {
        std::env::remove_var("VIGIL_CONFIDENCE_THRESHOLD");
    }

    assert!(matches!(result, Err(ConfigError::Invalid(_))));

    let config = ConfigLoader::load(Some(file.path())).await.unwrap();
    assert_eq!(config.agent.max_steps, 4);
}
