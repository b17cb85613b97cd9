use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    /// Network-level failure: connect error, timeout, non-2xx HTTP status.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The API answered, but with something other than `"success"`.
    #[error("API failure (status {status_code}): {message}")]
    ApiFailure { status_code: i64, message: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unsupported intent for {device}: {reason}")]
    UnsupportedIntent { device: String, reason: String },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl BridgeError {
    /// Classify this error for the shadow's `last_error` slot.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::TransportFailure(_) | BridgeError::IoError(_) => ErrorKind::Transport,
            BridgeError::ApiFailure { .. } | BridgeError::SerdeJsonError(_) => ErrorKind::Api,
            BridgeError::ConfigurationError(_)
            | BridgeError::UnknownDevice(_)
            | BridgeError::UnsupportedIntent { .. } => ErrorKind::Configuration,
        }
    }
}

/// Failure category surfaced to the device facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
pub enum ErrorKind {
    Transport,
    Api,
    Configuration,
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BridgeError::TransportFailure("timeout".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            BridgeError::ApiFailure {
                status_code: 190,
                message: "device internal error".into()
            }
            .kind(),
            ErrorKind::Api
        );
        assert_eq!(
            BridgeError::ConfigurationError("bad".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_api_failure_display() {
        let err = BridgeError::ApiFailure {
            status_code: 161,
            message: "device offline".into(),
        };
        assert_eq!(err.to_string(), "API failure (status 161): device offline");
    }
}
