//! Per-invocation state shared by commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use nutrilens_analysis::{AnalysisService, ManageCredential};
use nutrilens_core::Failure;
use nutrilens_store::{default_settings_path, CredentialStore, Settings};
use tracing::debug;

use crate::Cli;

/// Environment variable holding the sealed-file passphrase.
pub const PASSPHRASE_ENV: &str = "NUTRILENS_PASSPHRASE";

/// Settings path for this invocation.
pub fn settings_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(default_settings_path)
}

/// Loads settings for this invocation.
pub async fn load_settings(cli: &Cli) -> Settings {
    Settings::load(&settings_path(cli)).await
}

/// Opens the credential store selected in `settings`.
pub fn credential_store(settings: &Settings) -> Result<Arc<CredentialStore>> {
    let passphrase = std::env::var(PASSPHRASE_ENV).ok().filter(|p| !p.is_empty());
    let store = CredentialStore::from_settings(settings, passphrase).map_err(Failure::from)?;
    debug!(backend = store.backend_name(), "Credential store opened");
    Ok(Arc::new(store))
}

/// The credential use case.
pub fn manage_credential(settings: &Settings) -> Result<ManageCredential> {
    Ok(ManageCredential::new(credential_store(settings)?))
}

/// The full analysis pipeline.
pub async fn analysis_service(settings: &Settings) -> Result<AnalysisService> {
    let credentials = credential_store(settings)?;
    let service = AnalysisService::open(settings, credentials)
        .await
        .map_err(Failure::from)
        .context("Failed to start the analysis pipeline")?;
    Ok(service)
}
