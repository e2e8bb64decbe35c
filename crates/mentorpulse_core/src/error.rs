//! crates/mentorpulse_core/src/error.rs
//!
//! The error taxonomy surfaced by the chat and session engines.

use crate::lifecycle::SessionStatus;
use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or missing input. Never worth retrying.
    #[error("{0}")]
    Validation(String),

    /// The actor is authenticated but not allowed to do this.
    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    /// A uniqueness or state race; the caller should re-fetch and retry once.
    #[error("{0}")]
    Conflict(String),

    #[error("Cannot move a session from '{from}' to '{to}'")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// The persistence layer failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) => EngineError::NotFound(msg),
            PortError::Conflict(msg) => EngineError::Conflict(msg),
            PortError::Unauthorized => EngineError::Authorization("Unauthorized".to_string()),
            PortError::Unexpected(msg) => EngineError::Store(msg),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
