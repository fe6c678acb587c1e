use thiserror::Error;

/// Errors that can occur while provisioning, watching or persisting a dashboard.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Transient remote failure while polling; the watch loop retries these.
    #[error("Retryable remote failure: {0}")]
    Retryable(String),

    #[error("Internal failure: {0}")]
    Internal(String),

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl WatchError {
    /// Whether the watch loop may absorb this error and try again on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WatchError::Retryable(_))
    }
}
