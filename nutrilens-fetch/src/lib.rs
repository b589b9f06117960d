// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # NutriLens Fetch
//!
//! The authenticated HTTP boundary between NutriLens and the upstream
//! inference API.
//!
//! ## Requests
//!
//! - [`request::OutboundRequest`] - Immutable request description
//! - [`auth::RequestAuthenticator`] - Produces [`request::AuthenticatedRequest`]s,
//!   failing closed when no credential is configured
//!
//! ## Transport Pipeline
//!
//! - [`transport::Transport`] - The network seam; only accepts authenticated requests
//! - [`host::http::HttpTransport`] - `reqwest` implementation with domain allowlist
//! - [`pipeline::TransportPipeline`] - Authenticate, send, classify
//!
//! ## Retry Policy
//!
//! - [`retry::RetryStrategy`] - Exponential backoff with jitter, used by the job queue
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nutrilens_fetch::{HttpTransport, OutboundRequest, RequestAuthenticator, TransportPipeline};
//!
//! let authenticator = RequestAuthenticator::new(credential_store.clone());
//! let pipeline = TransportPipeline::new(authenticator, Arc::new(HttpTransport::new()?));
//!
//! let request = OutboundRequest::post_json(endpoint, &body)?;
//! match pipeline.execute(&request).await {
//!     Ok(response) => println!("status {}", response.status()),
//!     Err(err) if err.is_retryable() => println!("transient: {err}"),
//!     Err(err) => println!("terminal: {err}"),
//! }
//! ```

pub mod auth;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod transport;

// Errors
pub use error::{AuthError, HttpError, TransportError};

// Requests
pub use auth::{CredentialSource, RequestAuthenticator, DEFAULT_AUTH_HEADER};
pub use request::{AuthenticatedRequest, ContentKind, OutboundRequest};

// Transport & pipeline
pub use host::http::HttpTransport;
pub use pipeline::{classify, Response, TransportPipeline};
pub use transport::{RawResponse, Transport};

// Retry
pub use retry::{RetryConfigError, RetryStrategy};

// Re-exported so callers can build requests without depending on reqwest directly.
pub use reqwest::header::{HeaderName, HeaderValue};
pub use reqwest::Method;
pub use url::Url;
