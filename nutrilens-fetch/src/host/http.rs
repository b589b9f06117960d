//! HTTP transport with tracing and domain allowlist.
//!
//! Wraps a `reqwest::Client` and adds:
//! - Request/response tracing (target and status only)
//! - Domain allowlist checked before any I/O
//! - A fixed user agent and timeout
//! - No redirect following: the auth header must only reach the requested host

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client};
use tracing::{debug, instrument};
use url::Url;

use crate::error::HttpError;
use crate::request::AuthenticatedRequest;
use crate::transport::{RawResponse, Transport};

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent string for NutriLens.
const USER_AGENT: &str = concat!("NutriLens/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// HTTP Transport
// ============================================================================

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: Client,
    allowed_domains: Option<Vec<String>>,
}

impl HttpTransport {
    /// Creates a transport with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            // A 3xx is returned as-is and classified as a client error.
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            inner: client,
            allowed_domains: None,
        })
    }

    /// Restricts requests to the given domains and their subdomains.
    #[must_use]
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    /// Checks if a URL's domain is allowed.
    fn is_domain_allowed(&self, url: &Url) -> Result<(), HttpError> {
        let Some(ref allowed) = self.allowed_domains else {
            return Ok(()); // No restrictions
        };

        let host = url
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?;

        let allowed = allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));

        if allowed {
            Ok(())
        } else {
            Err(HttpError::DomainNotAllowed(host.to_string()))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %request.url(), method = %request.method()))]
    async fn send(&self, request: &AuthenticatedRequest) -> Result<RawResponse, HttpError> {
        self.is_domain_allowed(request.url())?;
        debug!(body_len = request.body().len(), "Sending request");

        let response = self
            .inner
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .body(request.body().to_vec())
            .send()
            .await
            .map_err(|e| if e.is_timeout() { HttpError::Timeout } else { HttpError::Request(e) })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!(status, body_len = body.len(), "Response received");

        Ok(RawResponse { status, body })
    }
}

// ============================================================================
// Tests
// ============================================================================
