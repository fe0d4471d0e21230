// Central Error Type for the Bridge

use thiserror::Error;

use crate::domain::SessionId;

/// Bridge-level error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Target missing, not executable, or refused by the OS at spawn time.
    /// Nothing is running when this is returned.
    #[error("Invocation error: {0}")]
    Invocation(#[from] crate::port::InvocationError),

    /// The session's process has already terminated
    #[error("Session {0} is not running")]
    NotRunning(SessionId),

    #[error("Session {0} is still running; terminate it first")]
    AlreadyRunning(SessionId),

    #[error("Output of session {0} was already taken")]
    OutputTaken(SessionId),

    #[error("Standard input of session {0} was closed")]
    InputClosed(SessionId),

    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Errors the presentation layer should show as a warning and otherwise ignore
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            BridgeError::NotRunning(_) | BridgeError::InputClosed(_)
        )
    }
}

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
