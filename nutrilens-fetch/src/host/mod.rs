//! Host APIs used by the transport pipeline.
//!
//! - [`http`] - HTTP transport with tracing and domain allowlist

pub mod http;

pub use http::HttpTransport;
