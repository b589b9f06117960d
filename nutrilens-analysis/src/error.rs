//! Analysis errors.

use std::path::PathBuf;

use nutrilens_core::{ErrorKind, Failure};
use nutrilens_fetch::{AuthError, HttpError};
use nutrilens_jobs::JobError;
use nutrilens_store::StoreError;
use thiserror::Error;

/// Errors raised while preparing an analysis, before any job exists.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The photo file could not be read.
    #[error("Cannot read photo {path}: {source}")]
    Photo {
        /// Photo path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The photo is not a supported image type.
    #[error("Unsupported photo type: {0}")]
    UnsupportedPhoto(String),

    /// Settings or credential storage problem.
    #[error(transparent)]
    Config(#[from] StoreError),

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] HttpError),

    /// The request authenticator could not be built.
    #[error("Authenticator setup failed: {0}")]
    Auth(#[from] AuthError),

    /// The job queue could not be opened.
    #[error(transparent)]
    Jobs(#[from] JobError),
}

impl AnalysisError {
    /// Maps the error to the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Photo { .. }
            | AnalysisError::UnsupportedPhoto(_)
            | AnalysisError::Auth(_) => ErrorKind::Validation,
            AnalysisError::Config(err) => err.kind(),
            AnalysisError::Client(_) => ErrorKind::ClientError,
            AnalysisError::Jobs(err) => err.kind(),
        }
    }
}

impl From<AnalysisError> for Failure {
    fn from(err: AnalysisError) -> Self {
        Failure::from_error(err.kind(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_errors_are_validation() {
        let err = AnalysisError::UnsupportedPhoto("gif".to_string());
        assert_eq!(err.kind(), ErrorKind::Validation);

        let failure = Failure::from(AnalysisError::Photo {
            path: PathBuf::from("/missing.jpg"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(failure.kind(), ErrorKind::Validation);
        assert!(failure.message().contains("/missing.jpg"));
    }

    #[test]
    fn test_wrapped_errors_keep_their_kind() {
        let err = AnalysisError::from(StoreError::Config("bad endpoint".to_string()));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = AnalysisError::from(StoreError::LockPoisoned);
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
