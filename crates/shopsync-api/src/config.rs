use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;

use shopsync_core::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Engine(#[from] shopsync_core::Error),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Static bearer token guarding `/v1`; open when unset.
    pub api_token: Option<String>,
    pub engine: EngineConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("engine", &self.engine)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "SHOPSYNC_API_BIND_ADDR", "127.0.0.1:8080");
        if !bind_addr.contains(':') {
            return Err(ConfigError::Invalid(
                "SHOPSYNC_API_BIND_ADDR must be host:port".to_string(),
            ));
        }

        let api_token = optional_trimmed(&lookup, "SHOPSYNC_API_TOKEN");
        if api_token.as_ref().is_some_and(|token| token.len() < 16) {
            return Err(ConfigError::Invalid(
                "SHOPSYNC_API_TOKEN must be at least 16 characters".to_string(),
            ));
        }

        let base = match optional_trimmed(&lookup, "SHOPSYNC_CONFIG") {
            Some(path) => EngineConfig::from_file(Path::new(&path))?,
            None => EngineConfig::default(),
        };
        let engine = base.with_overrides(&lookup)?;

        Ok(Self {
            bind_addr,
            api_token,
            engine,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;

    fn config_from(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_defaults_without_environment() {
        let config = config_from(&HashMap::new()).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert!(config.api_token.is_none());
        assert_eq!(config.engine.db_path, PathBuf::from("shopsync.db"));
    }

    #[test]
    fn config_applies_engine_overrides() {
        let mut map = HashMap::new();
        map.insert("SHOPSYNC_DB_PATH", "/var/lib/shopsync/jobs.db");
        map.insert("SHOPSYNC_MAX_ATTEMPTS", "5");

        let config = config_from(&map).unwrap();
        assert_eq!(config.engine.db_path, PathBuf::from("/var/lib/shopsync/jobs.db"));
        assert_eq!(config.engine.max_attempts, 5);
    }

    #[test]
    fn config_rejects_short_token() {
        let mut map = HashMap::new();
        map.insert("SHOPSYNC_API_TOKEN", "short");
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("SHOPSYNC_API_TOKEN"));
    }

    #[test]
    fn config_surfaces_engine_range_errors() {
        let mut map = HashMap::new();
        map.insert("SHOPSYNC_WORKERS", "0");
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("workers must be in [1, 64]"));
    }

    #[test]
    fn config_redacts_token_in_debug() {
        let mut map = HashMap::new();
        map.insert("SHOPSYNC_API_TOKEN", "sensitive-api-token-value");

        let debug_output = format!("{:?}", config_from(&map).unwrap());
        assert!(!debug_output.contains("sensitive-api-token-value"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
