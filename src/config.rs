use anyhow::Context;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

use crate::domain::catalog::RoleNames;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    pub storage: StorageConfig,
    #[serde(default)]
    pub roles: RoleNames,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    pub in_memory: bool,
    pub path: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Database {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Where content-addressed music files are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub threads: usize,
    /// How long an uploader blocks on a job before getting "accepted".
    pub wait_timeout_secs: u64,
    /// Attempts per ingestion when the transaction keeps conflicting.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl WorkerConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            wait_timeout_secs: 15,
            max_attempts: 5,
            retry_backoff_ms: 25,
        }
    }
}
