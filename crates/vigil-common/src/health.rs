use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Restarting,
}

/// Health of the single engine process, as tracked by its supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineHealth {
    pub up: bool,
    pub state: SupervisorState,
    pub restart_count: u64,
    pub last_restart_ts: Option<DateTime<Utc>>,
    #[serde(rename = "current_backoff_ms", with = "duration_ms")]
    pub current_backoff: Duration,
}

impl EngineHealth {
    pub fn new(base_backoff: Duration) -> Self {
        Self {
            up: false,
            state: SupervisorState::Stopped,
            restart_count: 0,
            last_restart_ts: None,
            current_backoff: base_backoff,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
