//! Errors returned by collaborators

use std::time::Duration;
use thiserror::Error;

/// Collaborator errors
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CollaboratorError {
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}
