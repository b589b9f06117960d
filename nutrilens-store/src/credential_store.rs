//! Credential store.
//!
//! [`CredentialStore`] is the only component that reads or writes the
//! upstream API key. The value lives in a [`SecretBackend`] that encrypts at
//! rest; the store adds validation and a small in-memory cache so repeated
//! request builds do not hit the keychain every time.
//!
//! Reads are shared and writes are exclusive: a `set` or `clear` never
//! changes a request that was already authenticated, only the ones built
//! after it.

use std::sync::{PoisonError, RwLock};

use nutrilens_core::Credential;
use nutrilens_fetch::{AuthError, CredentialSource};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::keychain::KeychainBackend;
use crate::sealed::SealedFileBackend;
use crate::settings::{CredentialBackendKind, Settings};

// ============================================================================
// Backend Trait
// ============================================================================

/// Encrypted-at-rest storage for a single secret.
pub trait SecretBackend: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Reads the stored secret, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage is unavailable or unreadable.
    fn load(&self) -> Result<Option<Credential>, StoreError>;

    /// Replaces the stored secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret could not be persisted.
    fn store(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Removes the stored secret. Removing a missing secret succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage rejects the removal.
    fn erase(&self) -> Result<(), StoreError>;
}

/// Process-local backend that never touches disk.
///
/// Nothing is persisted, so nothing is ever stored in plaintext. Used by
/// tests and by hosts that inject the key at startup.
#[derive(Default)]
pub struct MemoryBackend {
    secret: RwLock<Option<Credential>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .secret
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    fn store(&self, credential: &Credential) -> Result<(), StoreError> {
        *self.secret.write().map_err(|_| StoreError::LockPoisoned)? = Some(credential.clone());
        Ok(())
    }

    fn erase(&self) -> Result<(), StoreError> {
        *self.secret.write().map_err(|_| StoreError::LockPoisoned)? = None;
        Ok(())
    }
}

// ============================================================================
// Credential Store
// ============================================================================

#[derive(Clone)]
enum Cached {
    Unknown,
    Absent,
    Present(Credential),
}

impl Cached {
    fn to_option(&self) -> Option<Option<Credential>> {
        match self {
            Cached::Unknown => None,
            Cached::Absent => Some(None),
            Cached::Present(credential) => Some(Some(credential.clone())),
        }
    }
}

/// Validated access to the stored API key.
pub struct CredentialStore {
    backend: Box<dyn SecretBackend>,
    cache: RwLock<Cached>,
}

impl CredentialStore {
    /// Creates a store over `backend`.
    pub fn new(backend: impl SecretBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            cache: RwLock::new(Cached::Unknown),
        }
    }

    /// Creates a store with an in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Creates the store configured in `settings`.
    ///
    /// `passphrase` is required by the sealed-file backend and ignored by
    /// the keychain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the sealed-file backend is selected
    /// without a passphrase.
    pub fn from_settings(settings: &Settings, passphrase: Option<String>) -> Result<Self, StoreError> {
        match settings.credential_backend {
            CredentialBackendKind::Keychain => Ok(Self::new(KeychainBackend::new())),
            CredentialBackendKind::SealedFile => {
                let passphrase = passphrase.ok_or_else(|| {
                    StoreError::Config(
                        "the sealed_file credential backend needs a passphrase".to_string(),
                    )
                })?;
                let backend = SealedFileBackend::new(settings.sealed_credential_path(), passphrase)?;
                Ok(Self::new(backend))
            }
        }
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Returns the credential, or `None` if it is missing or unreadable.
    ///
    /// Storage failures are logged. Use [`try_get`](Self::try_get) to see them.
    pub fn get(&self) -> Option<Credential> {
        match self.try_get() {
            Ok(credential) => credential,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Failed to read credential");
                None
            }
        }
    }

    /// Returns the credential, reporting storage failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn try_get(&self) -> Result<Option<Credential>, StoreError> {
        {
            let cache = self.cache.read().map_err(|_| StoreError::LockPoisoned)?;
            if let Some(hit) = cache.to_option() {
                return Ok(hit);
            }
        }

        let mut cache = self.cache.write().map_err(|_| StoreError::LockPoisoned)?;
        // Another reader may have filled it while we waited.
        if let Some(hit) = cache.to_option() {
            return Ok(hit);
        }

        let loaded = self.backend.load()?;
        debug!(
            backend = self.backend.name(),
            present = loaded.is_some(),
            "Credential loaded"
        );
        *cache = match &loaded {
            Some(credential) => Cached::Present(credential.clone()),
            None => Cached::Absent,
        };
        Ok(loaded)
    }

    /// Validates and stores a new credential.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCredential`] for blank input, leaving any
    /// previously stored value untouched, or a backend error.
    pub fn set(&self, raw: &str) -> Result<(), StoreError> {
        let credential = Credential::new(raw).map_err(StoreError::InvalidCredential)?;

        let mut cache = self.cache.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Err(e) = self.backend.store(&credential) {
            // The backend may be half-written; force a re-read next time.
            *cache = Cached::Unknown;
            return Err(e);
        }
        *cache = Cached::Present(credential);

        info!(backend = self.backend.name(), "Credential updated");
        Ok(())
    }

    /// Removes the stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to erase the value.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Err(e) = self.backend.erase() {
            *cache = Cached::Unknown;
            return Err(e);
        }
        *cache = Cached::Absent;

        info!(backend = self.backend.name(), "Credential cleared");
        Ok(())
    }

    /// Returns true if a credential is stored and readable.
    pub fn is_configured(&self) -> bool {
        self.get().is_some()
    }

    /// Drops the cached value so the next read goes to the backend.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Cached::Unknown;
    }
}

impl CredentialSource for CredentialStore {
    fn credential(&self) -> Result<Option<Credential>, AuthError> {
        self.try_get().map_err(|e| AuthError::Unavailable(e.to_string()))
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        loads: AtomicUsize,
        fail_writes: bool,
    }

    impl SecretBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn load(&self) -> Result<Option<Credential>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load()
        }

        fn store(&self, credential: &Credential) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Keychain("locked".to_string()));
            }
            self.inner.store(credential)
        }

        fn erase(&self) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Keychain("locked".to_string()));
            }
            self.inner.erase()
        }
    }

    struct UnreadableBackend;

    impl SecretBackend for UnreadableBackend {
        fn name(&self) -> &'static str {
            "unreadable"
        }

        fn load(&self) -> Result<Option<Credential>, StoreError> {
            Err(StoreError::KeychainAccessDenied)
        }

        fn store(&self, _credential: &Credential) -> Result<(), StoreError> {
            Err(StoreError::KeychainAccessDenied)
        }

        fn erase(&self) -> Result<(), StoreError> {
            Err(StoreError::KeychainAccessDenied)
        }
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let store = CredentialStore::in_memory();
        for value in ["abc123", "  padded key  ", "sk-ünïcödé"] {
            store.set(value).unwrap();
            assert_eq!(store.get().unwrap().expose(), value);
        }
    }

    #[test]
    fn test_blank_set_keeps_previous_value() {
        let store = CredentialStore::in_memory();
        store.set("abc123").unwrap();

        for blank in ["", " ", "\t\n"] {
            let err = store.set(blank).unwrap_err();
            assert!(matches!(err, StoreError::InvalidCredential(_)));
        }

        store.invalidate();
        assert_eq!(store.get().unwrap().expose(), "abc123");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = CredentialStore::in_memory();
        store.set("abc123").unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(!store.is_configured());
    }

    struct Shared(Arc<CountingBackend>);

    impl SecretBackend for Shared {
        fn name(&self) -> &'static str {
            "shared"
        }

        fn load(&self) -> Result<Option<Credential>, StoreError> {
            self.0.load()
        }

        fn store(&self, credential: &Credential) -> Result<(), StoreError> {
            self.0.store(credential)
        }

        fn erase(&self) -> Result<(), StoreError> {
            self.0.erase()
        }
    }

    #[test]
    fn test_reads_are_cached() {
        let counting = Arc::new(CountingBackend::default());
        counting
            .inner
            .store(&Credential::new("abc123").unwrap())
            .unwrap();
        let store = CredentialStore::new(Shared(counting.clone()));

        for _ in 0..5 {
            assert_eq!(store.get().unwrap().expose(), "abc123");
        }
        store.set("rotated").unwrap();
        assert_eq!(store.get().unwrap().expose(), "rotated");
        assert_eq!(counting.loads.load(Ordering::SeqCst), 1);

        store.invalidate();
        store.get();
        assert_eq!(counting.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_write_is_reported() {
        let store = CredentialStore::new(CountingBackend {
            fail_writes: true,
            ..CountingBackend::default()
        });
        assert!(matches!(store.set("abc123"), Err(StoreError::Keychain(_))));
        assert!(store.clear().is_err());
        assert!(store.get().is_none());
    }

    #[test]
    fn test_unreadable_backend() {
        let store = CredentialStore::new(UnreadableBackend);
        assert!(store.get().is_none());
        assert!(matches!(store.try_get(), Err(StoreError::KeychainAccessDenied)));
        assert!(matches!(store.credential(), Err(AuthError::Unavailable(_))));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let store = CredentialStore::in_memory();
        store.set("sk-top-secret").unwrap();
        assert!(!format!("{store:?}").contains("sk-top-secret"));
    }

    #[test]
    fn test_sealed_backend_requires_passphrase() {
        let settings = Settings {
            credential_backend: CredentialBackendKind::SealedFile,
            ..Settings::default()
        };
        assert!(matches!(
            CredentialStore::from_settings(&settings, None),
            Err(StoreError::Config(_))
        ));
    }
}
