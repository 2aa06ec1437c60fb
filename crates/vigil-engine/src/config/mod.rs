pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{AgentConfig, BrowserConfig, HealthConfig, SessionsConfig, VigilConfig};
