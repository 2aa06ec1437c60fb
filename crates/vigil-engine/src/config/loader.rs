use super::schema::VigilConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {var}: '{value}'")]
    Env { var: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./vigil.yaml
    /// 2. ~/.vigil/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<VigilConfig, ConfigError> {
        let local_config = PathBuf::from("./vigil.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".vigil").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(VigilConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<VigilConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: VigilConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the default locations, then overlay the
    /// environment and validate.
    pub async fn load(path: Option<&Path>) -> Result<VigilConfig, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path).await?,
            None => Self::load_default().await?,
        };
        Self::apply_env(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Overlay `VIGIL_*` (and `CHROME_BIN`) environment variables.
    pub fn apply_env(config: &mut VigilConfig) -> Result<(), ConfigError> {
        Self::apply_overrides(config, |var| std::env::var(var).ok())
    }

    pub fn apply_overrides<F>(config: &mut VigilConfig, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_flag(&lookup, "VIGIL_HEADLESS")? {
            config.browser.headless = v;
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_VIEWPORT_W")? {
            config.browser.viewport.width = v;
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_VIEWPORT_H")? {
            config.browser.viewport.height = v;
        }
        if let Some(v) = lookup("CHROME_BIN").filter(|v| !v.is_empty()) {
            config.browser.executable = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("VIGIL_USER_DATA_DIR").filter(|v| !v.is_empty()) {
            config.browser.user_data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_HEALTH_PROBE_INTERVAL_MS")? {
            config.health.probe_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_HEALTH_PROBE_TIMEOUT_MS")? {
            config.health.probe_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_RESTART_BACKOFF_BASE_MS")? {
            config.health.backoff_base_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_RESTART_BACKOFF_MAX_MS")? {
            config.health.backoff_max_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_CONFIDENCE_THRESHOLD")? {
            config.agent.confidence_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "VIGIL_MAX_STEPS")? {
            config.agent.max_steps = v;
        }
        if let Some(v) = lookup("VIGIL_ARTIFACTS_ROOT").filter(|v| !v.is_empty()) {
            config.sessions.artifacts_root = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(config: &VigilConfig) -> Result<(), ConfigError> {
        let threshold = config.agent.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "agent.confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if config.agent.max_steps == 0 {
            return Err(ConfigError::Invalid("agent.max_steps must be at least 1".into()));
        }
        let viewport = config.browser.viewport;
        if viewport.width == 0 || viewport.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "browser.viewport must be non-empty, got {}x{}",
                viewport.width, viewport.height
            )));
        }
        let health = &config.health;
        for (name, value) in [
            ("health.probe_interval_ms", health.probe_interval_ms),
            ("health.probe_timeout_ms", health.probe_timeout_ms),
            ("health.backoff_base_ms", health.backoff_base_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be at least 1", name)));
            }
        }
        if health.backoff_base_ms > health.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "health.backoff_base_ms exceeds health.backoff_max_ms".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<T>().map(Some).map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: raw.clone(),
    })
}

fn parse_flag<F>(lookup: &F, var: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Env {
            var: var.to_string(),
            value: raw.clone(),
        }),
    }
}
