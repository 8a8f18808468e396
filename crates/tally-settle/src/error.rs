//! # Settlement Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Settlement Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Database     │  │     Worker              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Database       │  │  ChannelClosed          │ │
//! │  │  ConfigLoad/Save│  │  (DbError)      │  │  Timeout                │ │
//! │  │  Io, TomlDe/Ser │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_db::DbError;
use thiserror::Error;

/// Result type alias for settlement operations.
pub type SettleResult<T> = Result<T, SettleError>;

/// Settlement error type.
#[derive(Debug, Error)]
pub enum SettleError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid settlement configuration.
    #[error("Invalid settlement configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Filesystem error while reading or writing config.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`crate::SettlementConfig`].
    #[error("Invalid config file: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// A repository call failed. Domain rejections (invalid transition,
    /// validation) arrive here unchanged inside the `DbError`.
    #[error(transparent)]
    Database(#[from] DbError),

    // =========================================================================
    // Worker Errors
    // =========================================================================
    /// The worker is gone; the job was not queued.
    #[error("Settlement channel closed: {0}")]
    ChannelClosed(String),

    /// Payment still PROCESSING when the wait elapsed.
    #[error("Payment {payment_id} still processing after {waited_ms} ms")]
    Timeout { payment_id: i64, waited_ms: u64 },
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SettleError {
    /// Returns true if the same call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            SettleError::Database(e) => e.is_transient(),
            SettleError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SettleError::InvalidConfig(_)
                | SettleError::ConfigLoadFailed(_)
                | SettleError::ConfigSaveFailed(_)
                | SettleError::TomlDe(_)
                | SettleError::TomlSer(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SettleError::Timeout { payment_id: 1, waited_ms: 100 }.is_retryable());
        assert!(SettleError::Database(DbError::PoolExhausted).is_retryable());

        assert!(!SettleError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SettleError::ChannelClosed("gone".into()).is_retryable());
        assert!(!SettleError::Database(DbError::not_found("Payment", 9)).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SettleError::Timeout { payment_id: 42, waited_ms: 250 };
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("250"));
        assert!(SettleError::InvalidConfig("x".into()).is_config_error());
    }
}
