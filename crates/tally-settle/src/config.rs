//! # Settlement Configuration
//!
//! Configuration for the settlement worker.
//!
//! ## Configuration Priority
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority (Highest First)               │
//! │                                                                         │
//! │  1. Environment Variables                                              │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                              │
//! │     TALLY_SETTLE_SUCCESS_RATE=0.9                                      │
//! │     TALLY_SETTLE_DELAY_MS=250                                          │
//! │     TALLY_SETTLE_POLL_SECS=30                                          │
//! │     TALLY_SETTLE_QUEUE=256                                             │
//! │                          ▼                                              │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/settlement.toml (or an explicit path)              │
//! │                          ▼                                              │
//! │  3. Default Values                                                     │
//! │     Hardcoded fallbacks below                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SettleError, SettleResult};

// =============================================================================
// Database Section
// =============================================================================

/// Where the worker finds the payments table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tally.db")
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
        }
    }
}

// =============================================================================
// Settlement Section
// =============================================================================

/// Worker behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSettings {
    /// Capacity of the job queue. `submit` waits when it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Interval between scans for payments left in PROCESSING (seconds).
    #[serde(default = "default_recovery_poll")]
    pub recovery_poll_secs: u64,

    /// Latency of the simulated gateway (milliseconds).
    #[serde(default = "default_simulated_delay")]
    pub simulated_delay_ms: u64,

    /// Probability that the simulated gateway approves, in [0, 1].
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    /// Attempts at committing an outcome before giving up on it.
    /// The recovery tick picks the payment up again later.
    #[serde(default = "default_commit_max_retries")]
    pub commit_max_retries: u32,

    /// First wait between commit attempts (milliseconds).
    #[serde(default = "default_commit_initial_backoff")]
    pub commit_initial_backoff_ms: u64,

    /// Longest wait between commit attempts (milliseconds).
    #[serde(default = "default_commit_max_backoff")]
    pub commit_max_backoff_ms: u64,
}

fn default_queue_capacity() -> usize {
    256
}
fn default_recovery_poll() -> u64 {
    30
}
fn default_simulated_delay() -> u64 {
    1000
}
fn default_success_rate() -> f64 {
    0.9
}
fn default_commit_max_retries() -> u32 {
    5
}
fn default_commit_initial_backoff() -> u64 {
    50
}
fn default_commit_max_backoff() -> u64 {
    2000
}

impl Default for SettlementSettings {
    fn default() -> Self {
        SettlementSettings {
            queue_capacity: default_queue_capacity(),
            recovery_poll_secs: default_recovery_poll(),
            simulated_delay_ms: default_simulated_delay(),
            success_rate: default_success_rate(),
            commit_max_retries: default_commit_max_retries(),
            commit_initial_backoff_ms: default_commit_initial_backoff(),
            commit_max_backoff_ms: default_commit_max_backoff(),
        }
    }
}

// =============================================================================
// Main Settlement Configuration
// =============================================================================

/// Complete settlement configuration.
///
/// ## Example Config File
/// ```toml
/// [database]
/// path = "/var/lib/tally/tally.db"
///
/// [settlement]
/// queue_capacity = 256
/// recovery_poll_secs = 30
/// simulated_delay_ms = 1000
/// success_rate = 0.9
/// commit_max_retries = 5
/// commit_initial_backoff_ms = 50
/// commit_max_backoff_ms = 2000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub settlement: SettlementSettings,
}

impl SettlementConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (settlement.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SettleResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading settlement config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load settlement config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file as pretty TOML.
    pub fn save(&self, config_path: Option<PathBuf>) -> SettleResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SettleError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Settlement config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SettleResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(SettleError::InvalidConfig(
                "database.path must not be empty".into(),
            ));
        }

        let rate = self.settlement.success_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(SettleError::InvalidConfig(format!(
                "success_rate must be between 0 and 1, got: {}",
                rate
            )));
        }

        if self.settlement.queue_capacity == 0 {
            return Err(SettleError::InvalidConfig(
                "queue_capacity must be greater than 0".into(),
            ));
        }

        if self.settlement.recovery_poll_secs == 0 {
            return Err(SettleError::InvalidConfig(
                "recovery_poll_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(rate) = std::env::var("TALLY_SETTLE_SUCCESS_RATE") {
            match rate.parse::<f64>() {
                Ok(r) => self.settlement.success_rate = r,
                Err(_) => warn!(value = %rate, "Ignoring unparsable TALLY_SETTLE_SUCCESS_RATE"),
            }
        }

        if let Ok(delay) = std::env::var("TALLY_SETTLE_DELAY_MS") {
            if let Ok(d) = delay.parse::<u64>() {
                self.settlement.simulated_delay_ms = d;
            }
        }

        if let Ok(poll) = std::env::var("TALLY_SETTLE_POLL_SECS") {
            if let Ok(p) = poll.parse::<u64>() {
                debug!(secs = p, "Overriding recovery poll from environment");
                self.settlement.recovery_poll_secs = p;
            }
        }

        if let Ok(queue) = std::env::var("TALLY_SETTLE_QUEUE") {
            if let Ok(q) = queue.parse::<usize>() {
                self.settlement.queue_capacity = q;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("settlement.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.settlement.recovery_poll_secs)
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.settlement.simulated_delay_ms)
    }

    pub fn commit_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.settlement.commit_initial_backoff_ms)
    }

    pub fn commit_max_backoff(&self) -> Duration {
        Duration::from_millis(self.settlement.commit_max_backoff_ms)
    }
}
