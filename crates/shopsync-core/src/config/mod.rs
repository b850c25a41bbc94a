//! Engine configuration.
//!
//! Values come from an optional JSON file and are then overridden by
//! `SHOPSYNC_*` environment variables. Every value is range-checked before
//! the engine sees it.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::jobs::{RetryPolicy, WorkerConfig};
use crate::util::normalize_text_option;

const DEFAULT_DB_FILE: &str = "shopsync.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub job_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_multiplier: f64,
    pub workers: usize,
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            job_timeout_secs: 300,
            max_attempts: 3,
            retry_base_ms: 1_000,
            retry_max_ms: 60_000,
            retry_multiplier: 2.0,
            workers: 2,
            poll_interval_ms: 1_000,
        }
    }
}

impl EngineConfig {
    /// Load the file at `path` (or defaults) and apply the process
    /// environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let values: HashMap<String, String> = env::vars().collect();
        base.with_overrides(|name| values.get(name).cloned())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|error| {
            Error::Config(format!("invalid config file {}: {error}", path.display()))
        })
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(db_path) = optional_trimmed(&lookup, "SHOPSYNC_DB_PATH") {
            self.db_path = PathBuf::from(db_path);
        }
        self.job_timeout_secs =
            override_or(&lookup, "SHOPSYNC_JOB_TIMEOUT_SECS", self.job_timeout_secs)?;
        self.max_attempts = override_or(&lookup, "SHOPSYNC_MAX_ATTEMPTS", self.max_attempts)?;
        self.retry_base_ms = override_or(&lookup, "SHOPSYNC_RETRY_BASE_MS", self.retry_base_ms)?;
        self.retry_max_ms = override_or(&lookup, "SHOPSYNC_RETRY_MAX_MS", self.retry_max_ms)?;
        self.retry_multiplier =
            override_or(&lookup, "SHOPSYNC_RETRY_MULTIPLIER", self.retry_multiplier)?;
        self.workers = override_or(&lookup, "SHOPSYNC_WORKERS", self.workers)?;
        self.poll_interval_ms =
            override_or(&lookup, "SHOPSYNC_POLL_INTERVAL_MS", self.poll_interval_ms)?;

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::Config("db_path must not be empty".to_string()));
        }
        if !(10..=86_400).contains(&self.job_timeout_secs) {
            return Err(Error::Config(
                "job_timeout_secs must be in [10, 86400]".to_string(),
            ));
        }
        if !(1..=20).contains(&self.max_attempts) {
            return Err(Error::Config("max_attempts must be in [1, 20]".to_string()));
        }
        if self.retry_base_ms > 600_000 {
            return Err(Error::Config(
                "retry_base_ms must be in [0, 600000]".to_string(),
            ));
        }
        if self.retry_max_ms < self.retry_base_ms || self.retry_max_ms > 3_600_000 {
            return Err(Error::Config(
                "retry_max_ms must be >= retry_base_ms and <= 3600000".to_string(),
            ));
        }
        if !(1.0..=10.0).contains(&self.retry_multiplier) {
            return Err(Error::Config(
                "retry_multiplier must be in [1.0, 10.0]".to_string(),
            ));
        }
        if !(1..=64).contains(&self.workers) {
            return Err(Error::Config("workers must be in [1, 64]".to_string()));
        }
        if !(10..=60_000).contains(&self.poll_interval_ms) {
            return Err(Error::Config(
                "poll_interval_ms must be in [10, 60000]".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_ms),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_millis(self.retry_max_ms),
        }
    }

    pub const fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            workers: self.workers,
            job_timeout: self.job_timeout(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

fn optional_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

fn override_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    current: T,
) -> Result<T> {
    match optional_trimmed(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw:?}"))),
        None => Ok(current),
    }
}
