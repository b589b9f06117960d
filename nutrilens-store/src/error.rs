//! Store error types.

use nutrilens_core::{CoreError, ErrorKind, Failure};
use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The credential value was rejected before it was persisted.
    #[error("Invalid credential: {0}")]
    InvalidCredential(#[source] CoreError),

    /// Access to the system keychain was denied.
    #[error("Access denied to keychain")]
    KeychainAccessDenied,

    /// Keychain unavailable or failed.
    #[error("Keychain error: {0}")]
    Keychain(String),

    /// Sealing or opening an encrypted blob failed.
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// A persisted file is not in the expected format.
    #[error("Corrupt data in {path}: {reason}")]
    Corrupt {
        /// File that failed to load.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A lock guarding store state was poisoned.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Maps this error onto the shared failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidCredential(_) | StoreError::Config(_) => ErrorKind::Validation,
            _ => ErrorKind::Storage,
        }
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Keychain(_))
    }
}

impl From<keyring::Error> for StoreError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoStorageAccess(_) => StoreError::KeychainAccessDenied,
            keyring::Error::Ambiguous(_) => {
                StoreError::Keychain("Ambiguous credential entry".to_string())
            }
            keyring::Error::PlatformFailure(e) => StoreError::Keychain(e.to_string()),
            _ => StoreError::Keychain(err.to_string()),
        }
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        Failure::from_error(err.kind(), err)
    }
}
