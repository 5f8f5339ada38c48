//! Custom error types for the application.
//!
//! This module defines the primary error type, `ThermoError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of errors that can occur,
//! from configuration and I/O issues to calibration problems.
//!
//! ## Error Taxonomy
//!
//! The variants fall into three classes with different propagation rules:
//!
//! - **Synchronous caller errors** (`Connection`, `AlreadyRunning`,
//!   `NotConnected`, `ShutdownTimeout`, `CalibrationValidation`,
//!   `Persistence`): returned directly from the operation that caused them.
//! - **Logic-bug class** (`ChannelNotFound`): an unknown channel key was
//!   referenced. Unlike the recoverable classes this indicates a programming
//!   or configuration error and should fail loudly.
//! - **Asynchronous link events** are *not* errors in this enum: a malformed
//!   wire line or a mid-connection I/O failure is reported as a
//!   [`LinkEvent`](crate::core::LinkEvent) on the event channel so the
//!   consumer decides presentation. Nothing throws across the worker
//!   boundary.
//!
//! By using `#[from]`, `ThermoError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the application with
//! the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ThermoError>;

#[derive(Error, Debug)]
pub enum ThermoError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open serial connection: {0}")]
    Connection(String),

    #[error("Serial link is already running; stop it before starting again")]
    AlreadyRunning,

    #[error("Serial link is not connected")]
    NotConnected,

    #[error("Reader thread did not exit within the shutdown timeout")]
    ShutdownTimeout,

    #[error("Unknown channel: {0}")]
    ChannelNotFound(String),

    #[error("Calibration validation error: {0}")]
    CalibrationValidation(String),

    #[error("Calibration store error: {0}")]
    Persistence(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThermoError::ChannelNotFound("t9".to_string());
        assert_eq!(err.to_string(), "Unknown channel: t9");
    }

    #[test]
    fn test_calibration_validation_display() {
        let err = ThermoError::CalibrationValidation("degenerate two-point range".into());
        assert!(err.to_string().contains("degenerate"));
    }
}
