use thiserror::Error;

/// Failures returned by registry operations. None of them are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Malformed or missing field; the caller has to fix the request
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// Identity, name or address/port collision
    #[error("conflict: {reason}")]
    Conflict {
        reason: String,
        /// Seconds until the colliding entry lapses on its own
        retry_after_secs: Option<u64>,
    },

    #[error("no such server: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("could not allocate a unique server id after {0} attempts")]
    IdSpaceExhausted(usize),

    /// The registry thread has stopped
    #[error("registry is not running")]
    Unavailable,
}

impl RegistryError {
    pub fn conflict(reason: impl Into<String>) -> Self {
        RegistryError::Conflict {
            reason: reason.into(),
            retry_after_secs: None,
        }
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
