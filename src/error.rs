// src/error.rs
// Standardized error types for runcell

use thiserror::Error;

/// Main error type for the runcell library
#[derive(Error, Debug)]
pub enum RuncellError {
    #[error("no session with id {0}")]
    SessionNotFound(String),

    #[error("session {0} has no active input wait")]
    NotWaitingForInput(String),

    #[error("session {0} stdin is no longer available")]
    StdinUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Result using RuncellError
pub type Result<T> = std::result::Result<T, RuncellError>;

impl From<RuncellError> for String {
    fn from(err: RuncellError) -> Self {
        err.to_string()
    }
}
