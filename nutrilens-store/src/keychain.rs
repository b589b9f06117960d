//! API key storage in the system keychain.
//!
//! Uses the platform's secure credential storage:
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)

use keyring::Entry;
use nutrilens_core::Credential;
use tracing::debug;

use crate::credential_store::SecretBackend;
use crate::error::StoreError;

/// Keychain service name.
pub const SERVICE: &str = "nutrilens";

/// Keychain account name.
pub const ACCOUNT: &str = "api_key";

/// [`SecretBackend`] backed by the OS keychain.
#[derive(Debug, Clone)]
pub struct KeychainBackend {
    service: String,
    account: String,
}

impl KeychainBackend {
    /// Creates a backend for the default service and account.
    pub fn new() -> Self {
        Self::with_entry(SERVICE, ACCOUNT)
    }

    /// Creates a backend for a custom service and account.
    pub fn with_entry(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, &self.account)?)
    }
}

impl Default for KeychainBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretBackend for KeychainBackend {
    fn name(&self) -> &'static str {
        "keychain"
    }

    fn load(&self) -> Result<Option<Credential>, StoreError> {
        match self.entry()?.get_password() {
            // A blank entry was written by something else; treat it as unset.
            Ok(password) => Ok(Credential::new(password).ok()),
            Err(keyring::Error::NoEntry) => {
                debug!(service = %self.service, "No keychain entry");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, credential: &Credential) -> Result<(), StoreError> {
        self.entry()?.set_password(credential.expose())?;
        debug!(service = %self.service, "Credential stored in keychain");
        Ok(())
    }

    fn erase(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                debug!(service = %self.service, "Credential deleted from keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entry() {
        let backend = KeychainBackend::default();
        assert_eq!(backend.service, SERVICE);
        assert_eq!(backend.account, ACCOUNT);
        assert_eq!(backend.name(), "keychain");
    }
}
