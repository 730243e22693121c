//! Error types for GhostScale

use crate::amf::Status;
use thiserror::Error;

/// Result type alias for GhostScale operations
pub type Result<T> = std::result::Result<T, Error>;

/// GhostScale error type
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid dimension expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("Failed to parse config file: {0}")]
    ConfigFile(#[from] toml::de::Error),

    // Resource errors
    #[error("Resource allocation failed: {0}")]
    ResourceExhausted(String),

    // Interop errors
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // Operation errors
    #[error("{op} failed with error {status}")]
    OperationFailed { op: &'static str, status: Status },

    #[error("Scaler not configured")]
    NotConfigured,

    #[error("Stage closed")]
    StageClosed,

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a native status code returned by a vendor call
    pub fn op(op: &'static str, status: Status) -> Self {
        Error::OperationFailed { op, status }
    }

    /// Check if this error is a setup-time configuration problem
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::InvalidExpression { .. }
                | Error::UnsupportedDevice(_)
                | Error::ConfigFile(_)
        )
    }

    /// Check if the stream can continue after this error.
    ///
    /// Only per-frame operation failures leave the stage usable; the failed
    /// frame itself is dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OperationFailed { .. })
    }

    /// Native status code, if the error came from the accelerator
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::OperationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
