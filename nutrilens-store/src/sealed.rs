//! Passphrase-sealed credential file.
//!
//! For hosts without a usable keychain (headless Linux, containers). The key
//! is encrypted with ChaCha20-Poly1305 under a key derived from a passphrase
//! with PBKDF2-HMAC-SHA256. Every write draws a fresh salt and nonce.
//!
//! File layout:
//!
//! ```text
//! "NLK1" | salt (16) | nonce (12) | ciphertext + tag (16)
//! ```
//!
//! The magic is also bound as associated data, so a blob cannot be replayed
//! under a different format version.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use nutrilens_core::Credential;
use ring::aead::{Aad, CHACHA20_POLY1305, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;
use zeroize::Zeroizing;

use crate::credential_store::SecretBackend;
use crate::error::StoreError;
use crate::persistence::write_atomic_blocking;

const MAGIC: &[u8; 4] = b"NLK1";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// [`SecretBackend`] that keeps the key in an encrypted file.
pub struct SealedFileBackend {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl SealedFileBackend {
    /// Creates a backend sealing to `path` with `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an empty passphrase.
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Result<Self, StoreError> {
        let passphrase = Zeroizing::new(passphrase.into());
        if passphrase.is_empty() {
            return Err(StoreError::Config("passphrase must not be empty".to_string()));
        }
        Ok(Self {
            path: path.into(),
            passphrase,
            iterations: NonZeroU32::new(DEFAULT_ITERATIONS).unwrap_or(NonZeroU32::MIN),
            rng: SystemRandom::new(),
        })
    }

    /// Overrides the PBKDF2 iteration count.
    #[must_use]
    pub fn with_iterations(mut self, iterations: NonZeroU32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Location of the sealed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn derive_key(&self, salt: &[u8]) -> Result<LessSafeKey, StoreError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            salt,
            self.passphrase.as_bytes(),
            &mut key[..],
        );
        let unbound = UnboundKey::new(&CHACHA20_POLY1305, &key[..])
            .map_err(|_| StoreError::Crypto("invalid key length".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut salt)
            .and_then(|()| self.rng.fill(&mut nonce))
            .map_err(|_| StoreError::Crypto("random source unavailable".to_string()))?;

        let key = self.derive_key(&salt)?;
        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(MAGIC),
            &mut in_out,
        )
        .map_err(|_| StoreError::Crypto("seal failed".to_string()))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + in_out.len());
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&in_out);
        Ok(blob)
    }

    fn open(&self, blob: &[u8]) -> Result<Credential, StoreError> {
        if blob.len() < HEADER_LEN + TAG_LEN || !blob.starts_with(MAGIC) {
            return Err(StoreError::Corrupt {
                path: self.path.display().to_string(),
                reason: "not a sealed credential file".to_string(),
            });
        }

        let (salt, rest) = blob[MAGIC.len()..].split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt)?;
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| StoreError::Crypto("bad nonce".to_string()))?;

        let mut in_out = Zeroizing::new(sealed.to_vec());
        let plaintext = key
            .open_in_place(nonce, Aad::from(MAGIC), &mut in_out[..])
            .map_err(|_| {
                StoreError::Crypto("wrong passphrase or tampered credential file".to_string())
            })?;

        let text = std::str::from_utf8(plaintext).map_err(|_| StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason: "credential is not UTF-8".to_string(),
        })?;
        Credential::new(text).map_err(StoreError::InvalidCredential)
    }
}

impl SecretBackend for SealedFileBackend {
    fn name(&self) -> &'static str {
        "sealed_file"
    }

    fn load(&self) -> Result<Option<Credential>, StoreError> {
        let blob = match std::fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let credential = self.open(&blob)?;
        debug!(path = %self.path.display(), "Credential unsealed");
        Ok(Some(credential))
    }

    fn store(&self, credential: &Credential) -> Result<(), StoreError> {
        let blob = self.seal(credential.expose().as_bytes())?;
        write_atomic_blocking(&self.path, &blob)?;
        debug!(path = %self.path.display(), "Credential sealed");
        Ok(())
    }

    fn erase(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for SealedFileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedFileBackend")
            .field("path", &self.path)
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend(dir: &TempDir, passphrase: &str) -> SealedFileBackend {
        SealedFileBackend::new(dir.path().join("credential.sealed"), passphrase)
            .unwrap()
            .with_iterations(NonZeroU32::new(1_000).unwrap())
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, "correct horse");

        assert!(backend.load().unwrap().is_none());
        backend.store(&Credential::new("abc123").unwrap()).unwrap();
        assert_eq!(backend.load().unwrap().unwrap().expose(), "abc123");
    }

    #[test]
    fn test_file_does_not_contain_plaintext() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, "correct horse");
        backend.store(&Credential::new("sk-plaintext-marker").unwrap()).unwrap();

        let blob = std::fs::read(backend.path()).unwrap();
        assert!(blob.starts_with(MAGIC));
        assert!(!blob.windows(19).any(|w| w == b"sk-plaintext-marker"));
    }

    #[test]
    fn test_each_write_uses_fresh_salt_and_nonce() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, "correct horse");
        let credential = Credential::new("abc123").unwrap();

        backend.store(&credential).unwrap();
        let first = std::fs::read(backend.path()).unwrap();
        backend.store(&credential).unwrap();
        let second = std::fs::read(backend.path()).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_passphrase_is_crypto_error() {
        let dir = TempDir::new().unwrap();
        backend(&dir, "correct horse")
            .store(&Credential::new("abc123").unwrap())
            .unwrap();

        let err = backend(&dir, "battery staple").load().unwrap_err();
        assert!(matches!(err, StoreError::Crypto(_)));
    }

    #[test]
    fn test_tampered_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, "correct horse");
        backend.store(&Credential::new("abc123").unwrap()).unwrap();

        let mut blob = std::fs::read(backend.path()).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        std::fs::write(backend.path(), &blob).unwrap();
        assert!(matches!(backend.load(), Err(StoreError::Crypto(_))));

        std::fs::write(backend.path(), b"garbage").unwrap();
        assert!(matches!(backend.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_erase_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, "correct horse");
        backend.store(&Credential::new("abc123").unwrap()).unwrap();

        backend.erase().unwrap();
        backend.erase().unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(
            SealedFileBackend::new("/tmp/never-written", ""),
            Err(StoreError::Config(_))
        ));
    }
}
