//! Application configuration.
//!
//! Values come from built-in defaults, then an optional JSON file, then CLI
//! flags, in that order of precedence.

use arbitrage_core::{Exchange, FeeTable};
use arbitrage_engine::{validate_fee_table, ConfigError, DetectorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("Polling interval must be at least 100ms, got {0}ms")]
    InvalidInterval(u64),
    #[error("No exchanges enabled")]
    NoExchanges,
    #[error("Retention must be 1 to {max} days, got {0}", max = MAX_RETENTION_DAYS)]
    InvalidRetention(i64),
}

/// Upper bound for `storage.retention_days` (about 100 years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detector configuration.
    pub detector: DetectorSettings,
    /// Quote polling configuration.
    pub polling: PollingSettings,
    /// Fee schedules per exchange.
    pub fees: FeeTable,
    /// History storage configuration.
    pub storage: StorageSettings,
    /// WebSocket / HTTP server port.
    pub ws_port: u16,
    /// Logging level.
    pub log_level: String,
    /// Use the simulated quote source instead of live tickers.
    pub demo: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            polling: PollingSettings::default(),
            fees: FeeTable::japan_defaults(),
            storage: StorageSettings::default(),
            ws_port: 9001,
            log_level: "info".to_string(),
            demo: false,
        }
    }
}

/// Detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Minimum gross spread in percent.
    pub threshold_pct: f64,
    /// BTC quantity used for fee evaluation.
    pub reference_quantity: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        let defaults = DetectorConfig::default();
        Self {
            threshold_pct: defaults.threshold_pct,
            reference_quantity: defaults.reference_quantity,
        }
    }
}

impl From<&DetectorSettings> for DetectorConfig {
    fn from(settings: &DetectorSettings) -> Self {
        DetectorConfig {
            threshold_pct: settings.threshold_pct,
            reference_quantity: settings.reference_quantity,
        }
    }
}

/// Quote polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Cycle interval in milliseconds.
    pub interval_ms: u64,
    /// Per-request ticker timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Exchanges to poll.
    pub exchanges: Vec<Exchange>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            request_timeout_ms: 3_000,
            exchanges: Exchange::all().to_vec(),
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// History storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite connection URL.
    pub database_url: String,
    /// Days of history kept by the daily cleanup.
    pub retention_days: i64,
    /// Cycles buffered between the detector and the persistence worker.
    pub queue_capacity: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://btcjpy_arb.db".to_string(),
            retention_days: 30,
            queue_capacity: arbitrage_storage::PERSISTENCE_QUEUE_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigLoadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from `path`, or return defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        (&self.detector).into()
    }

    /// Check everything that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.detector_config().validate()?;
        validate_fee_table(&self.fees)?;
        if self.polling.interval_ms < 100 {
            return Err(ConfigLoadError::InvalidInterval(self.polling.interval_ms));
        }
        if !self.demo && self.polling.exchanges.is_empty() {
            return Err(ConfigLoadError::NoExchanges);
        }
        let retention = self.storage.retention_days;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention) {
            return Err(ConfigLoadError::InvalidRetention(retention));
        }
        Ok(())
    }
}
