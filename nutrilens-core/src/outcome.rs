//! The success/failure envelope returned by every fallible operation.
//!
//! An [`Outcome`] is produced at the lowest layer that can tell success from
//! failure and is forwarded unchanged through repositories and use cases up
//! to the presentation layer. Intermediate layers may add context to a
//! [`Failure`], but its [`ErrorKind`] never changes on the way up.
//!
//! There is intentionally no `unwrap_or_default`: an error is never coerced
//! into an empty value.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ============================================================================
// Error Kind
// ============================================================================

/// Closed taxonomy of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No API credential is configured.
    CredentialMissing,
    /// Bad input (e.g. blank credential).
    Validation,
    /// The upstream API rejected the request (4xx).
    ClientError,
    /// The upstream API failed (5xx).
    ServerError,
    /// No response was received.
    NetworkError,
    /// The caller cancelled the job.
    Cancelled,
    /// A 2xx response carried a body that could not be understood.
    InvalidResponse,
    /// Local storage (credential or job records) is unavailable.
    Storage,
}

impl ErrorKind {
    /// Returns true for transient kinds that the job queue retries.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ServerError | ErrorKind::NetworkError)
    }

    /// Stable identifier used in traces and persisted records.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CredentialMissing => "credential_missing",
            ErrorKind::Validation => "validation",
            ErrorKind::ClientError => "client_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::Storage => "storage",
        }
    }

    /// The message shown to the user for this kind of failure.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::CredentialMissing => {
                "No analysis API key is configured. Open Settings and enter your API key to enable meal analysis."
            }
            ErrorKind::Validation => "The value you entered is not valid. Please check it and try again.",
            ErrorKind::ClientError => {
                "The analysis service rejected this request. Check your API key and the meal details."
            }
            ErrorKind::ServerError | ErrorKind::NetworkError => {
                "The analysis service is unavailable right now. Please try again later."
            }
            ErrorKind::Cancelled => "The analysis was cancelled.",
            ErrorKind::InvalidResponse => {
                "The analysis service returned a response that could not be read. Please try again later."
            }
            ErrorKind::Storage => "Local storage is unavailable. Restart the app and try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Failure
// ============================================================================

/// Shared handle to the error that originally caused a failure.
pub type Cause = Arc<dyn StdError + Send + Sync>;

/// The error side of an [`Outcome`].
///
/// Two failures are equal when their kind and message are equal; the cause,
/// status and attempt count are diagnostics and do not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    kind: ErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
    #[serde(skip)]
    cause: Option<Cause>,
}

impl Failure {
    /// Creates a failure without an underlying cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            attempts: None,
            cause: None,
        }
    }

    /// Creates a failure from an error, keeping it as the cause.
    pub fn from_error<E>(kind: ErrorKind, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            message: error.to_string(),
            status: None,
            attempts: None,
            cause: Some(Arc::new(error)),
        }
    }

    /// Shorthand for a cancellation failure.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Job was cancelled")
    }

    /// Attaches the HTTP status that produced this failure.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Records how many attempts were made before this failure became final.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Wraps this failure with a context message.
    ///
    /// The kind, status and attempt count are carried over; the previous
    /// failure becomes the cause.
    #[must_use]
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
            status: self.status,
            attempts: self.attempts,
            cause: Some(Arc::new(self)),
        }
    }

    /// The kind of failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Diagnostic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Number of attempts made, when the failure came from the job queue.
    pub fn attempts(&self) -> Option<u32> {
        self.attempts
    }

    /// The originating error, if it is still available.
    ///
    /// Causes are not persisted, so a failure reloaded from disk has none.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// User-facing text for this failure.
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    /// Returns true if the job queue may retry after this failure.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl PartialEq for Failure {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl Eq for Failure {}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Discriminated success/failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The operation produced a value.
    Success(T),
    /// The operation failed.
    Error(Failure),
}

impl<T> Outcome<T> {
    /// Wraps a value.
    pub fn success(value: T) -> Self {
        Outcome::Success(value)
    }

    /// Wraps a failure.
    pub fn failure(failure: Failure) -> Self {
        Outcome::Error(failure)
    }

    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns true for `Error`.
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    /// Borrows the value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    /// Borrows the failure, if any.
    pub fn failure_ref(&self) -> Option<&Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Error(failure) => Some(failure),
        }
    }

    /// The failure kind, if this is an `Error`.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.failure_ref().map(Failure::kind)
    }

    /// Maps the success value, leaving failures untouched.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Error(failure) => Outcome::Error(failure),
        }
    }

    /// Chains another fallible step on success.
    pub fn and_then<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Outcome<U>,
    {
        match self {
            Outcome::Success(value) => f(value),
            Outcome::Error(failure) => Outcome::Error(failure),
        }
    }

    /// Adds context to a failure without changing its kind.
    #[must_use]
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::Error(failure) => Outcome::Error(failure.with_context(context)),
        }
    }

    /// Converts into a standard `Result` for use with `?`.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(failure) => Err(failure),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<Failure>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Error(err.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
