//! User settings.
//!
//! Stored as JSON in the platform config directory. Every field has a
//! default, so partial files and older files keep loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nutrilens_fetch::{DEFAULT_AUTH_HEADER, RetryStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::error::StoreError;
use crate::persistence::{default_data_dir, default_settings_path, load_json, save_json};

/// Default upstream inference endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.nutrilens.app/v1/meals/analyze";

// ============================================================================
// Settings Types
// ============================================================================

/// Where the API key is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackendKind {
    /// OS keychain.
    #[default]
    Keychain,
    /// Passphrase-sealed file in the data directory.
    SealedFile,
}

impl std::fmt::Display for CredentialBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialBackendKind::Keychain => write!(f, "keychain"),
            CredentialBackendKind::SealedFile => write!(f, "sealed_file"),
        }
    }
}

/// Retry and backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts per job, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor between delays.
    pub multiplier: f64,
    /// Cap on the nominal delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Random extra as a fraction of the nominal delay.
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: 0.25,
        }
    }
}

impl RetrySettings {
    /// Builds the backoff policy.
    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy::new(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_multiplier(self.multiplier)
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upstream inference endpoint.
    pub endpoint: String,

    /// Header carrying the API key.
    pub auth_header: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Hosts the transport may contact (empty = any).
    pub allowed_domains: Vec<String>,

    /// Retry policy for analysis jobs.
    pub retry: RetrySettings,

    /// Maximum number of jobs running at once.
    pub workers: usize,

    /// Credential storage backend.
    pub credential_backend: CredentialBackendKind,

    /// Override for the data directory (jobs, sealed credential).
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            timeout_secs: 30,
            allowed_domains: Vec::new(),
            retry: RetrySettings::default(),
            workers: 4,
            credential_backend: CredentialBackendKind::default(),
            data_dir: None,
        }
    }
}

impl Settings {
    /// Loads settings from the default path.
    pub async fn load_default() -> Self {
        Self::load(&default_settings_path()).await
    }

    /// Loads settings from `path`, falling back to defaults.
    ///
    /// A missing file is normal on first run; a malformed one is logged.
    pub async fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            return Self::default();
        }

        info!(path = %path.display(), "Loading settings");
        load_json(path).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load settings, using defaults");
            Self::default()
        })
    }

    /// Saves settings to `path`.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        save_json(path, self).await?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Checks the settings for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] describing the first problem.
    pub fn validate(&self) -> Result<(), StoreError> {
        self.endpoint_url()?;
        if self.workers == 0 {
            return Err(StoreError::Config("workers must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(StoreError::Config("timeout_secs must be at least 1".to_string()));
        }
        if self.auth_header.trim().is_empty() {
            return Err(StoreError::Config("auth_header must not be empty".to_string()));
        }
        self.retry
            .strategy()
            .validate()
            .map_err(|e| StoreError::Config(format!("retry: {e}")))
    }

    /// Parsed endpoint URL.
    ///
    /// # Errors
    ///
    /// Plain `http` is accepted only for loopback hosts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the endpoint is not an https URL.
    pub fn endpoint_url(&self) -> Result<Url, StoreError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| StoreError::Config(format!("endpoint '{}': {e}", self.endpoint)))?;
        match url.scheme() {
            "https" => Ok(url),
            "http" if is_loopback(&url) => Ok(url),
            "http" => Err(StoreError::Config(format!(
                "endpoint must use https unless it is a loopback address, got '{}'",
                self.endpoint
            ))),
            other => Err(StoreError::Config(format!(
                "endpoint scheme must be https, got '{other}'"
            ))),
        }
    }

    /// Backoff policy for analysis jobs.
    pub fn retry_strategy(&self) -> RetryStrategy {
        self.retry.strategy()
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Directory holding job records.
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir().join("jobs")
    }

    /// Location of the sealed credential file.
    pub fn sealed_credential_path(&self) -> PathBuf {
        self.data_dir().join("credential.sealed")
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        None => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.auth_header, "api-key");
        assert_eq!(settings.retry_strategy().max_attempts, 3);
        assert_eq!(settings.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"workers": 2, "retry": {"max_attempts": 5}}"#).unwrap();
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay_ms, 1_000);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            Settings { workers: 0, ..Settings::default() },
            Settings { endpoint: "not a url".to_string(), ..Settings::default() },
            Settings { endpoint: "ftp://example.com".to_string(), ..Settings::default() },
            Settings {
                retry: RetrySettings { max_attempts: 0, ..RetrySettings::default() },
                ..Settings::default()
            },
            Settings {
                retry: RetrySettings { multiplier: 1.1, ..RetrySettings::default() },
                ..Settings::default()
            },
        ];
        for settings in bad {
            assert!(
                matches!(settings.validate(), Err(StoreError::Config(_))),
                "{settings:?}"
            );
        }
    }

    #[test]
    fn test_plain_http_only_for_loopback() {
        let with_endpoint = |endpoint: &str| Settings {
            endpoint: endpoint.to_string(),
            ..Settings::default()
        };

        assert!(with_endpoint("http://127.0.0.1:8080/v1/analyze").validate().is_ok());
        assert!(with_endpoint("http://localhost:8080/v1/analyze").validate().is_ok());
        assert!(with_endpoint("http://[::1]:8080/v1/analyze").validate().is_ok());
        assert!(matches!(
            with_endpoint("http://api.nutrilens.app/v1/meals/analyze").endpoint_url(),
            Err(StoreError::Config(_))
        ));
        assert!(with_endpoint("https://api.nutrilens.app/v1/meals/analyze").endpoint_url().is_ok());
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let settings = Settings {
            data_dir: Some(PathBuf::from("/var/lib/nutrilens")),
            ..Settings::default()
        };
        assert_eq!(settings.jobs_dir(), PathBuf::from("/var/lib/nutrilens/jobs"));
        assert_eq!(
            settings.sealed_credential_path(),
            PathBuf::from("/var/lib/nutrilens/credential.sealed")
        );
    }

    #[test]
    fn test_backend_kind_wire_format() {
        let json = serde_json::to_string(&CredentialBackendKind::SealedFile).unwrap();
        assert_eq!(json, "\"sealed_file\"");
    }
}
