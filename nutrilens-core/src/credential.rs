//! The upstream API credential.
//!
//! A [`Credential`] never exposes its value through `Debug`, `Display` or
//! serialization. The only way to read it is [`Credential::expose`], which
//! the request authenticator calls when it builds the auth header.

use std::fmt;

use zeroize::Zeroize;

use crate::error::CoreError;

/// An API secret that is known to be non-blank.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
}

impl Credential {
    /// Validates and wraps a raw secret.
    ///
    /// The value is stored as given; only blank values are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BlankCredential`] for empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let mut secret = raw.into();
        if secret.trim().is_empty() {
            secret.zeroize();
            return Err(CoreError::BlankCredential);
        }
        Ok(Self { secret })
    }

    /// Returns the secret for transmission.
    ///
    /// Only call this when writing the auth header.
    #[inline]
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Length of the secret (safe to log).
    #[inline]
    pub fn len(&self) -> usize {
        self.secret.len()
    }

    /// Always false: blank credentials cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}
