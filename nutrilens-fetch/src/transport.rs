//! The network transport seam.
//!
//! The pipeline talks to the network only through [`Transport`], which
//! accepts nothing but an [`AuthenticatedRequest`]. Production code uses
//! [`crate::host::http::HttpTransport`]; tests plug in doubles that count
//! invocations.

use async_trait::async_trait;

use crate::error::HttpError;
use crate::request::AuthenticatedRequest;

/// A response as received, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends authenticated requests over the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns whatever response came back.
    ///
    /// Returns `Err` only when no response was received or the request was
    /// blocked locally; non-2xx statuses are `Ok`.
    async fn send(&self, request: &AuthenticatedRequest) -> Result<RawResponse, HttpError>;
}
