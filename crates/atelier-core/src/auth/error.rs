use thiserror::Error;

use crate::api::ApiError;

/// Failures of a credential storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Credential storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored credential could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential store lock poisoned")]
    Poisoned,
}

/// Outcome of a failed refresh exchange.
///
/// Cloneable because every caller joined to a single in-flight refresh
/// receives the same value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Refresh token rejected by server (status {status})")]
    Rejected { status: u16 },

    #[error("Refresh request got no response: {0}")]
    Transient(String),

    #[error("Unexpected refresh response status {0}")]
    UnexpectedStatus(u16),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist refreshed credential: {0}")]
    Storage(String),
}

impl RefreshError {
    /// Whether the session survived this failure and a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RefreshError::Transient(_)
                | RefreshError::UnexpectedStatus(_)
                | RefreshError::InvalidResponse(_)
        )
    }
}

impl From<StoreError> for RefreshError {
    fn from(err: StoreError) -> Self {
        RefreshError::Storage(err.to_string())
    }
}

/// Errors from session lifecycle operations (login, initialize, logout).
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Session validation failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
