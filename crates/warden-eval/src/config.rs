//! Runtime configuration.
//!
//! Every field has a default, so a configuration file only needs the values
//! it changes:
//!
//! ```json
//! { "max_stack_height": 128, "http_timeout_ms": 2000 }
//! ```

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type requested when fetching modules.
pub const MODULE_CONTENT_TYPE: &str = "application/warden";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Call depth limit used when the context sets no `stack` permission.
    pub max_stack_height: usize,
    /// Number of fetched module texts kept in memory.
    pub import_cache_capacity: usize,
    pub http_timeout_ms: u64,
    pub import_content_type: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_stack_height: 64,
            import_cache_capacity: 32,
            http_timeout_ms: 10_000,
            import_content_type: MODULE_CONTENT_TYPE.to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "max_stack_height": 8 }"#).unwrap();
        assert_eq!(config.max_stack_height, 8);
        assert_eq!(config.import_cache_capacity, 32);
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.import_content_type, MODULE_CONTENT_TYPE);
    }

    #[test]
    fn invalid_config() {
        assert!(matches!(
            RuntimeConfig::from_json(r#"{ "max_stack_height": "deep" }"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_file("/nonexistent/warden.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
