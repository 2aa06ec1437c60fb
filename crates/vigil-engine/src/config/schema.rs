use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vigil_common::Viewport;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_ignore_https_errors")]
    pub ignore_https_errors: bool,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            executable: None,
            viewport: Viewport::default(),
            user_data_dir: None,
            user_agent: None,
            disable_security: default_disable_security(),
            extra_args: Vec::new(),
            ignore_https_errors: default_ignore_https_errors(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
        }
    }
}

const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-background-timer-throttling",
    "--disable-popup-blocking",
    "--disable-renderer-backgrounding",
    "--disable-background-networking",
    "--disable-backgrounding-occluded-windows",
    "--disable-ipc-flooding-protection",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-hang-monitor",
    "--disable-prompt-on-repost",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

const INSECURE_ARGS: &[&str] = &[
    "--disable-web-security",
    "--disable-site-isolation-trials",
    "--ignore-certificate-errors",
    "--disable-features=IsolateOrigins,site-per-process",
];

impl BrowserConfig {
    /// Command-line flags handed to the engine process at launch.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = STEALTH_ARGS.iter().map(|a| a.to_string()).collect();
        if self.disable_security {
            args.extend(INSECURE_ARGS.iter().map(|a| a.to_string()));
        }
        if let Some(ua) = &self.user_agent {
            args.push(format!("--user-agent={}", ua));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

fn default_headless() -> bool {
    true
}

fn default_disable_security() -> bool {
    true
}

fn default_ignore_https_errors() -> bool {
    true
}

fn default_navigation_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

fn default_probe_interval_ms() -> u64 {
    10000
}

fn default_probe_timeout_ms() -> u64 {
    10000
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_max_ms() -> u64 {
    60000
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            artifacts_root: default_artifacts_root(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl SessionsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_artifacts_root() -> PathBuf {
    std::env::temp_dir().join("vigil-artifacts")
}

fn default_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window: usize,
    #[serde(default = "default_scroll_px")]
    pub default_scroll_px: i64,
    #[serde(default = "default_key")]
    pub default_key: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_steps: default_max_steps(),
            duplicate_window: default_duplicate_window(),
            default_scroll_px: default_scroll_px(),
            default_key: default_key(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.4
}

fn default_max_steps() -> u32 {
    8
}

fn default_duplicate_window() -> usize {
    5
}

fn default_scroll_px() -> i64 {
    500
}

fn default_key() -> String {
    "Enter".to_string()
}
