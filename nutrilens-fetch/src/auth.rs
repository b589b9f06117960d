//! Request authentication.
//!
//! [`RequestAuthenticator::build`] reads the credential, fails closed when it
//! is missing, and otherwise derives a new request carrying exactly two extra
//! headers: the upstream auth header and `Content-Type: application/json`.
//!
//! The auth header value is marked sensitive, so `HeaderMap`'s `Debug` output
//! prints `Sensitive` instead of the key. Traces only ever carry the target.

use std::sync::Arc;

use nutrilens_core::Credential;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, instrument, warn};

use crate::error::AuthError;
use crate::request::{AuthenticatedRequest, ContentKind, OutboundRequest};

/// Header the upstream API reads the key from.
pub const DEFAULT_AUTH_HEADER: &str = "api-key";

// ============================================================================
// Credential Source
// ============================================================================

/// Read access to the configured credential.
///
/// Implemented by the credential store. Reads are expected to be fast local
/// lookups and are not cancellation points.
pub trait CredentialSource: Send + Sync {
    /// Returns the current credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unavailable`] if the backing storage fails.
    fn credential(&self) -> Result<Option<Credential>, AuthError>;
}

// ============================================================================
// Request Authenticator
// ============================================================================

/// Produces [`AuthenticatedRequest`]s from plain requests.
#[derive(Clone)]
pub struct RequestAuthenticator {
    source: Arc<dyn CredentialSource>,
    header: HeaderName,
}

impl RequestAuthenticator {
    /// Creates an authenticator using the [`DEFAULT_AUTH_HEADER`].
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            header: HeaderName::from_static(DEFAULT_AUTH_HEADER),
        }
    }

    /// Creates an authenticator with a custom auth header name.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidHeaderName`] if `name` is not a valid header name.
    pub fn with_header_name(source: Arc<dyn CredentialSource>, name: &str) -> Result<Self, AuthError> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AuthError::InvalidHeaderName(name.to_string()))?;
        Ok(Self { source, header })
    }

    /// Name of the auth header.
    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }

    /// Authenticates `base`, returning a new request.
    ///
    /// All headers and the body of `base` are kept; the auth header and the
    /// content type are overlaid.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialMissing`] when no credential is
    /// configured, before anything touches the network.
    #[instrument(skip(self, base), fields(url = %base.url(), method = %base.method()))]
    pub fn build(&self, base: &OutboundRequest) -> Result<AuthenticatedRequest, AuthError> {
        let Some(credential) = self.source.credential()? else {
            warn!("No credential configured, refusing to build request");
            return Err(AuthError::CredentialMissing);
        };

        let mut auth_value =
            HeaderValue::from_str(credential.expose()).map_err(|_| AuthError::InvalidCredential)?;
        auth_value.set_sensitive(true);

        let mut headers = base.headers().clone();
        headers.insert(self.header.clone(), auth_value);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(ContentKind::Json.mime_type()),
        );

        debug!(header_count = headers.len(), "Request authenticated");
        Ok(AuthenticatedRequest::new(base.clone().replace_headers(headers)))
    }
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ACCEPT;
    use reqwest::Method;
    use url::Url;

    struct FixedSource(Option<&'static str>);

    impl CredentialSource for FixedSource {
        fn credential(&self) -> Result<Option<Credential>, AuthError> {
            Ok(self.0.map(|raw| Credential::new(raw).unwrap()))
        }
    }

    struct BrokenSource;

    impl CredentialSource for BrokenSource {
        fn credential(&self) -> Result<Option<Credential>, AuthError> {
            Err(AuthError::Unavailable("keychain locked".to_string()))
        }
    }

    fn base() -> OutboundRequest {
        OutboundRequest::post_json(
            Url::parse("https://api.example.com/v1/analyze").unwrap(),
            &serde_json::json!({"description": "grilled chicken, 200g"}),
        )
        .unwrap()
        .with_header(ACCEPT, HeaderValue::from_static("application/json"))
        .with_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("r-1"),
        )
    }

    #[test]
    fn test_missing_credential_fails_closed() {
        let auth = RequestAuthenticator::new(Arc::new(FixedSource(None)));
        assert!(matches!(auth.build(&base()), Err(AuthError::CredentialMissing)));
    }

    #[test]
    fn test_storage_failure_is_reported() {
        let auth = RequestAuthenticator::new(Arc::new(BrokenSource));
        assert!(matches!(auth.build(&base()), Err(AuthError::Unavailable(_))));
    }

    #[test]
    fn test_overlays_auth_and_content_type_only() {
        let auth = RequestAuthenticator::new(Arc::new(FixedSource(Some("abc123"))));
        let base = base();
        let signed = auth.build(&base).unwrap();
        let request = signed.request();

        assert_eq!(request.header("api-key"), Some("abc123"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.header("x-request-id"), Some("r-1"));
        assert_eq!(request.headers().len(), base.headers().len() + 2);
        assert_eq!(request.body(), base.body());
        assert_eq!(request.url(), base.url());
        assert_eq!(request.method(), base.method());
    }

    #[test]
    fn test_auth_header_overrides_existing_value() {
        let auth = RequestAuthenticator::new(Arc::new(FixedSource(Some("abc123"))));
        let base = base().with_header(
            HeaderName::from_static("api-key"),
            HeaderValue::from_static("stale"),
        );

        let signed = auth.build(&base).unwrap();
        assert_eq!(signed.request().header("API-KEY"), Some("abc123"));
    }

    #[test]
    fn test_auth_value_is_hidden_from_debug_output() {
        let auth = RequestAuthenticator::new(Arc::new(FixedSource(Some("sk-top-secret"))));
        let signed = auth.build(&base()).unwrap();

        assert!(!format!("{signed:?}").contains("sk-top-secret"));
        assert!(!format!("{:?}", signed.headers()).contains("sk-top-secret"));
    }

    #[test]
    fn test_custom_header_name() {
        let auth =
            RequestAuthenticator::with_header_name(Arc::new(FixedSource(Some("k"))), "X-Api-Key")
                .unwrap();
        let signed = auth.build(&OutboundRequest::new(
            Method::POST,
            Url::parse("https://api.example.com").unwrap(),
        ))
        .unwrap();

        assert_eq!(signed.request().header("x-api-key"), Some("k"));
        assert!(RequestAuthenticator::with_header_name(Arc::new(FixedSource(None)), "bad header").is_err());
    }

    #[test]
    fn test_credential_with_newline_is_rejected() {
        let auth = RequestAuthenticator::new(Arc::new(FixedSource(Some("abc\n123"))));
        assert!(matches!(auth.build(&base()), Err(AuthError::InvalidCredential)));
    }
}
