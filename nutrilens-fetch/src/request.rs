//! Outbound request types.
//!
//! [`OutboundRequest`] is immutable: every `with_*` method consumes the
//! request and returns a derived one. [`AuthenticatedRequest`] can only be
//! produced by [`crate::auth::RequestAuthenticator`], and it is the only type
//! [`crate::transport::Transport`] accepts.

use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use url::Url;

// ============================================================================
// Content Kind
// ============================================================================

/// Declared kind of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    /// JSON document.
    #[default]
    Json,
    /// Plain UTF-8 text.
    Text,
    /// Opaque bytes.
    Binary,
}

impl ContentKind {
    /// MIME type for this kind.
    pub fn mime_type(self) -> &'static str {
        match self {
            ContentKind::Json => "application/json",
            ContentKind::Text => "text/plain; charset=utf-8",
            ContentKind::Binary => "application/octet-stream",
        }
    }
}

// ============================================================================
// Outbound Request
// ============================================================================

/// A request before authentication.
///
/// Header names are case-insensitive; setting a header that already exists
/// replaces its value.
#[derive(Clone, PartialEq)]
pub struct OutboundRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    content_kind: ContentKind,
}

impl OutboundRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Vec::new(),
            content_kind: ContentKind::default(),
        }
    }

    /// Creates a JSON POST request.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn post_json<T: Serialize + ?Sized>(url: Url, body: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(body)?;
        Ok(Self::new(Method::POST, url).with_body(bytes, ContentKind::Json))
    }

    /// Returns a copy with `name` set to `value` (last write wins).
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns a copy with the given body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>, content_kind: ContentKind) -> Self {
        self.body = body;
        self.content_kind = content_kind;
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// All headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single header as text, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Declared body kind.
    pub fn content_kind(&self) -> ContentKind {
        self.content_kind
    }

    pub(crate) fn replace_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

// Bodies can carry photos; print only their size.
impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body_len", &self.body.len())
            .field("content_kind", &self.content_kind)
            .finish()
    }
}

// ============================================================================
// Authenticated Request
// ============================================================================

/// A request that carries the auth header and a content-type header.
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    inner: OutboundRequest,
}

impl AuthenticatedRequest {
    pub(crate) fn new(inner: OutboundRequest) -> Self {
        Self { inner }
    }

    /// The underlying request.
    pub fn request(&self) -> &OutboundRequest {
        &self.inner
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    /// All headers, including the auth header.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Body bytes.
    pub fn body(&self) -> &[u8] {
        self.inner.body()
    }
}
