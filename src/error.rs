// src/error.rs
//! Error types for the run tracker

use crate::run::RunRecord;
use crate::tracking::{Command, TrackingState};

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Cannot {command} while {state}")]
    InvalidTransition {
        command: Command,
        state: TrackingState,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Route encoding error: {0}")]
    Route(String),

    /// The run was finalized but could not be persisted. The record is
    /// returned so the caller can retry the insert.
    #[error("Failed to save run: {reason}")]
    SaveFailed {
        record: Box<RunRecord>,
        reason: String,
    },

    #[error("Tracking service has shut down")]
    ServiceClosed,

    #[error("Error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for TrackerError {
    fn from(error: anyhow::Error) -> Self {
        TrackerError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = TrackerError::InvalidTransition {
            command: Command::Pause,
            state: TrackingState::Idle,
        };
        assert_eq!(err.to_string(), "Cannot pause while idle");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: TrackerError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, TrackerError::Other(ref msg) if msg == "boom"));
    }
}
