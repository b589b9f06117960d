//! Job queue error types.

use nutrilens_core::{CoreError, ErrorKind, Failure};
use nutrilens_store::StoreError;
use thiserror::Error;

use crate::job::JobId;

/// Errors returned by the job queue itself.
///
/// Failures of an analysis attempt are not `JobError`s; they are recorded
/// on the job and delivered as [`Failure`]s.
#[derive(Debug, Error)]
pub enum JobError {
    /// The payload has nothing to analyze.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[source] CoreError),

    /// No record exists for the id.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// A driver for the id is already running in this process.
    #[error("Job already active: {0}")]
    AlreadyActive(JobId),

    /// Another process took over the job's lease.
    #[error("Lost the lease on job {0}")]
    LeaseLost(JobId),

    /// The retry policy cannot be used.
    #[error("Invalid queue configuration: {0}")]
    Config(String),

    /// The worker pool was closed.
    #[error("Job queue is shut down")]
    ShutDown,

    /// A job record could not be read or written.
    #[error("Job storage error: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    /// Maps this error onto the shared failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::InvalidPayload(_) | JobError::Config(_) | JobError::NotFound(_) => {
                ErrorKind::Validation
            }
            JobError::AlreadyActive(_)
            | JobError::LeaseLost(_)
            | JobError::ShutDown
            | JobError::Store(_) => ErrorKind::Storage,
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Store(StoreError::Serialization(err))
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Store(StoreError::Io(err))
    }
}

impl From<JobError> for Failure {
    fn from(err: JobError) -> Self {
        Failure::from_error(err.kind(), err)
    }
}
