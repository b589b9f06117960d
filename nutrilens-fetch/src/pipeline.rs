//! Transport pipeline: authenticate, send, classify.
//!
//! The stages run in a fixed order:
//!
//! 1. [`RequestAuthenticator::build`] - fails closed without a credential
//! 2. [`Transport::send`] - the only network I/O
//! 3. [`classify`] - maps the response onto [`TransportError`]
//!
//! The pipeline never retries. Retry policy belongs to the job queue.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::auth::RequestAuthenticator;
use crate::error::TransportError;
use crate::request::OutboundRequest;
use crate::transport::{RawResponse, Transport};

// ============================================================================
// Response
// ============================================================================

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: Vec<u8>,
}

impl Response {
    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Maps a raw response onto the success/failure taxonomy.
///
/// # Errors
///
/// - 4xx and any non-2xx status outside 5xx → [`TransportError::ClientError`]
/// - 5xx → [`TransportError::ServerError`]
pub fn classify(raw: RawResponse) -> Result<Response, TransportError> {
    let RawResponse { status, body } = raw;
    match status {
        200..=299 => Ok(Response { status, body }),
        500..=599 => Err(TransportError::ServerError {
            status,
            message: TransportError::body_excerpt(&body),
        }),
        // 4xx, plus anything unexpected (1xx, unfollowed 3xx).
        _ => Err(TransportError::ClientError {
            status: Some(status),
            message: TransportError::body_excerpt(&body),
        }),
    }
}

// ============================================================================
// Transport Pipeline
// ============================================================================

/// Authenticates, sends and classifies one request.
#[derive(Clone)]
pub struct TransportPipeline {
    authenticator: RequestAuthenticator,
    transport: Arc<dyn Transport>,
}

impl TransportPipeline {
    /// Creates a pipeline.
    pub fn new(authenticator: RequestAuthenticator, transport: Arc<dyn Transport>) -> Self {
        Self {
            authenticator,
            transport,
        }
    }

    /// Executes `request` once.
    ///
    /// The credential is read on every call, so a rotated key applies to the
    /// next execution but never to a request that is already in flight.
    ///
    /// # Errors
    ///
    /// Returns the classified [`TransportError`]. Credential errors are
    /// returned before the transport is touched.
    #[instrument(skip(self, request), fields(url = %request.url()))]
    pub async fn execute(&self, request: &OutboundRequest) -> Result<Response, TransportError> {
        let start = Instant::now();

        let authenticated = match self.authenticator.build(request) {
            Ok(authenticated) => authenticated,
            Err(err) => {
                let err = TransportError::from(err);
                warn!(outcome = %err.kind(), "Request not sent");
                return Err(err);
            }
        };

        let result = match self.transport.send(&authenticated).await {
            Ok(raw) => classify(raw),
            Err(err) => Err(TransportError::from(err)),
        };

        let duration = start.elapsed();
        match &result {
            Ok(response) => {
                info!(status = response.status(), duration = ?duration, outcome = "success", "Request completed");
            }
            Err(err) => {
                warn!(
                    status = ?err.status(),
                    duration = ?duration,
                    outcome = %err.kind(),
                    error = %err,
                    "Request failed"
                );
            }
        }
        result
    }
}

impl std::fmt::Debug for TransportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPipeline")
            .field("authenticator", &self.authenticator)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
