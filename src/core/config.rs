use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::storage::journal::SyncMode;

/// Which storage engine a database is opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Relational,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub storage_path: PathBuf,
    pub in_memory: bool,

    // Connection pool (relational backend)
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,                // 0 = wait forever
    pub execute_timeout_ms: u64,                // 0 = no statement deadline
    pub busy_timeout_ms: u64,                   // SQLite busy handler

    // Operator translation
    pub like_falls_back_to_equal: bool,

    // Document journal
    pub journal_sync: SyncMode,

    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendKind::Relational,
            storage_path: PathBuf::from("./data"),
            in_memory: false,

            max_connections: num_cpus::get().max(1),
            acquire_timeout_ms: 30_000,
            execute_timeout_ms: 0,
            busy_timeout_ms: 5_000,

            like_falls_back_to_equal: false,

            journal_sync: SyncMode::Batch,

            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn in_memory(backend: BackendKind) -> Self {
        Config {
            backend,
            in_memory: true,
            ..Config::default()
        }
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        millis(self.acquire_timeout_ms)
    }

    pub fn execute_timeout(&self) -> Option<Duration> {
        millis(self.execute_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
