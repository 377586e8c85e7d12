use serde::Deserialize;
use std::time::Duration;

use crate::services::executor::{ExecutorConfig, DEFAULT_QUEUE_CAPACITY};

/// How capture directories are listed.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnumeratorKind {
    Native,
    Find,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string for the execution results database
    pub database_url: String,

    /// Base URL of the verification host (e.g., "http://host:6109")
    pub verification_url: String,

    /// Device ids served by the verification host, comma-separated
    pub device_ids: Vec<String>,

    /// Descriptive model of the devices above
    #[serde(default)]
    pub device_model: Option<String>,

    /// Prometheus listener address
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Deadline for listing one capture directory
    #[serde(default = "default_enumeration_timeout_ms")]
    pub enumeration_timeout_ms: u64,

    #[serde(default = "default_enumerator")]
    pub enumerator: EnumeratorKind,

    /// GNU find binary used by the `find` enumerator (e.g., "gfind")
    #[serde(default = "default_find_program")]
    pub find_program: String,
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_stop_timeout_secs() -> u64 {
    5
}

fn default_enumeration_timeout_ms() -> u64 {
    10_000
}

fn default_enumerator() -> EnumeratorKind {
    EnumeratorKind::Native
}

fn default_find_program() -> String {
    "find".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            queue_capacity: self.queue_capacity,
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
        }
    }

    pub fn enumeration_timeout(&self) -> Duration {
        Duration::from_millis(self.enumeration_timeout_ms)
    }
}
