//! Host boundary errors.

use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong between us and the imaging host.
///
/// Script failures are not errors: they come back as
/// [`ExecutionOutcome::Failure`](crate::ExecutionOutcome::Failure).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to start host command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Host did not finish starting within {0:?}")]
    StartupTimeout(Duration),

    #[error("Host I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed bridge message: {0}")]
    Protocol(String),

    /// Error reported by the host itself, passed through unchanged.
    #[error("{0}")]
    Remote(String),

    #[error("Host closed the connection")]
    Closed,

    #[error("Host has not been initialized")]
    NotInitialized,

    #[error("Sandbox failure: {0}")]
    Sandbox(String),
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::Protocol(err.to_string())
    }
}
