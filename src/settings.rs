use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_DEVICE_NAME: &str = "XIAOMG25_BLE";

const ENV_PERSIST_DATA: &str = "POSTURA_PERSIST_DATA";
const ENV_DB_PATH: &str = "POSTURA_DB_PATH";
const ENV_DEVICE_NAME: &str = "POSTURA_DEVICE_NAME";

/// Backoff and cadence of the connection loop, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkTiming {
    /// Wait between scans while the peer is absent.
    pub scan_retry_ms: u64,
    /// Wait after a disconnect or a failed connect/subscribe.
    pub reconnect_delay_ms: u64,
    /// Cadence of the synthetic generator.
    pub synthetic_interval_ms: u64,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            scan_retry_ms: 2_000,
            reconnect_delay_ms: 1_000,
            synthetic_interval_ms: 200,
        }
    }
}

impl LinkTiming {
    pub fn scan_retry(&self) -> Duration {
        Duration::from_millis(self.scan_retry_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn synthetic_interval(&self) -> Duration {
        Duration::from_millis(self.synthetic_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Durable SQLite storage when true, in-memory log otherwise.
    pub persist_data: bool,
    pub db_path: PathBuf,
    pub device_name: String,
    pub counter_retention_days: u32,
    pub listener_capacity: usize,
    /// `None` keeps every sample in memory-only mode.
    pub memory_log_capacity: Option<usize>,
    pub link: LinkTiming,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            persist_data: true,
            db_path: PathBuf::from("postura.sqlite3"),
            device_name: DEFAULT_DEVICE_NAME.into(),
            counter_retention_days: 30,
            listener_capacity: 100,
            memory_log_capacity: Some(100_000),
            link: LinkTiming::default(),
        }
    }
}

impl EngineSettings {
    /// Reads the JSON file when given and present, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings in {}", path.display()))?
            }
            _ => Self::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PERSIST_DATA) {
            self.persist_data = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_DEVICE_NAME).filter(|v| !v.is_empty()) {
            self.device_name = value;
        }
    }
}
