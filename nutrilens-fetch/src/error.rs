//! Fetch error types.

use nutrilens_core::{ErrorKind, Failure};
use thiserror::Error;

/// Longest response body excerpt kept in an error message.
const BODY_EXCERPT_LEN: usize = 200;

// ============================================================================
// Transport Error
// ============================================================================

/// Classified outcome of a failed pipeline execution.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No credential is configured; nothing was sent.
    #[error("No API credential configured")]
    CredentialMissing,

    /// The stored credential cannot be used as a header value.
    #[error("Stored credential is not a valid header value")]
    InvalidCredential,

    /// The credential store could not be read; nothing was sent.
    #[error("Credential storage unavailable: {0}")]
    CredentialUnavailable(String),

    /// The request was rejected (4xx), or blocked before it was sent.
    #[error("Request rejected{}: {message}", status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    ClientError {
        /// HTTP status, absent when the request was blocked locally.
        status: Option<u16>,
        /// Response excerpt or local reason.
        message: String,
    },

    /// The upstream API failed (5xx).
    #[error("Server error with status {status}: {message}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Response excerpt.
        message: String,
    },

    /// No response was received.
    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Maps this error onto the shared failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::CredentialMissing => ErrorKind::CredentialMissing,
            TransportError::InvalidCredential => ErrorKind::Validation,
            TransportError::CredentialUnavailable(_) => ErrorKind::Storage,
            TransportError::ClientError { .. } => ErrorKind::ClientError,
            TransportError::ServerError { .. } => ErrorKind::ServerError,
            TransportError::Network(_) => ErrorKind::NetworkError,
        }
    }

    /// Returns true for errors the job queue may retry.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::ClientError { status, .. } => *status,
            TransportError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds a message from a response body, truncated for logs.
    pub(crate) fn body_excerpt(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        let mut excerpt: String = text.chars().take(BODY_EXCERPT_LEN).collect();
        if text.chars().count() > BODY_EXCERPT_LEN {
            excerpt.push('…');
        }
        if excerpt.is_empty() {
            excerpt.push_str("<empty body>");
        }
        excerpt
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        let status = err.status();
        let failure = Failure::from_error(err.kind(), err);
        match status {
            Some(status) => failure.with_status(status),
            None => failure,
        }
    }
}

// ============================================================================
// Auth Error
// ============================================================================

/// Errors raised while authenticating a request, always before any I/O.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential is configured.
    #[error("No API credential configured")]
    CredentialMissing,

    /// The credential contains characters not allowed in a header.
    #[error("Stored credential is not a valid header value")]
    InvalidCredential,

    /// The configured auth header name is not a valid header name.
    #[error("Invalid auth header name: {0}")]
    InvalidHeaderName(String),

    /// The credential store failed.
    #[error("Credential storage unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for TransportError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::CredentialMissing => TransportError::CredentialMissing,
            AuthError::InvalidCredential => TransportError::InvalidCredential,
            AuthError::InvalidHeaderName(name) => TransportError::ClientError {
                status: None,
                message: format!("invalid auth header name {name}"),
            },
            AuthError::Unavailable(reason) => TransportError::CredentialUnavailable(reason),
        }
    }
}

// ============================================================================
// HTTP Error
// ============================================================================

/// Errors from the network transport itself.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Connection could not be established or was dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Timeout.
    #[error("Request timed out")]
    Timeout,
}

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        let message = err.to_string();
        match err {
            // Blocked before sending: retrying the same request cannot help.
            HttpError::DomainNotAllowed(_) | HttpError::InvalidUrl(_) => {
                TransportError::ClientError { status: None, message }
            }
            HttpError::Request(ref e) if e.is_builder() => {
                TransportError::ClientError { status: None, message }
            }
            HttpError::Request(_) | HttpError::Connection(_) | HttpError::Timeout => {
                TransportError::Network(message)
            }
        }
    }
}
