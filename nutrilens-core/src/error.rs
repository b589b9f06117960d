//! Core error types for `NutriLens`.

use thiserror::Error;

use crate::outcome::{ErrorKind, Failure};

/// Core error type for `NutriLens` domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A credential value was empty or whitespace-only.
    #[error("Credential must not be empty or whitespace")]
    BlankCredential,

    /// A meal payload had nothing to analyze.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Invalid data from the upstream API response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns the failure kind this error maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::BlankCredential | CoreError::InvalidPayload(_) => ErrorKind::Validation,
            CoreError::InvalidData(_) | CoreError::Serialization(_) => ErrorKind::InvalidResponse,
        }
    }
}

impl From<CoreError> for Failure {
    fn from(err: CoreError) -> Self {
        Failure::from_error(err.kind(), err)
    }
}
