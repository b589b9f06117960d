// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # NutriLens Store
//!
//! Local durable state for NutriLens.
//!
//! This crate provides:
//!
//! - **CredentialStore**: the API key, encrypted at rest in the OS keychain or
//!   a passphrase-sealed file
//! - **Settings**: user configuration with persistence
//! - **Persistence**: atomic, owner-only file I/O helpers
//!
//! ## Usage
//!
//! ```ignore
//! use nutrilens_store::{CredentialStore, Settings};
//!
//! let settings = Settings::load_default().await;
//! let store = CredentialStore::from_settings(&settings, None)?;
//!
//! store.set("abc123")?;
//! assert!(store.is_configured());
//! ```

pub mod credential_store;
pub mod error;
pub mod keychain;
pub mod persistence;
pub mod sealed;
pub mod settings;

pub use credential_store::{CredentialStore, MemoryBackend, SecretBackend};
pub use error::StoreError;
pub use keychain::KeychainBackend;
pub use persistence::{
    default_config_dir, default_data_dir, default_settings_path, ensure_dir, load_json,
    load_json_or_default, save_json, write_atomic,
};
pub use sealed::SealedFileBackend;
pub use settings::{CredentialBackendKind, RetrySettings, Settings};
#[cfg(test)]
mod persistence_tests;
