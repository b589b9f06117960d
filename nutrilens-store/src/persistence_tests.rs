//! Persistence round-trip and edge case tests.
//!
//! Tests file I/O operations, JSON persistence, and settings round-trip.

use std::num::NonZeroU32;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::credential_store::CredentialStore;
use crate::error::StoreError;
use crate::persistence::{
    ensure_dir, load_json, load_json_or_default, save_json, write_atomic_blocking,
};
use crate::sealed::SealedFileBackend;
use crate::settings::{CredentialBackendKind, RetrySettings, Settings};

// ============================================================================
// JSON Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_and_load_json_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("test.json");

    let settings = Settings {
        workers: 2,
        allowed_domains: vec!["api.nutrilens.app".to_string()],
        credential_backend: CredentialBackendKind::SealedFile,
        ..Settings::default()
    };

    save_json(&file_path, &settings).await.unwrap();
    let loaded: Settings = load_json(&file_path).await.unwrap();

    assert_eq!(loaded, settings);
}

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested_path = temp_dir
        .path()
        .join("deeply")
        .join("nested")
        .join("path")
        .join("test.json");

    let data = serde_json::json!({"key": "value"});

    save_json(&nested_path, &data).await.unwrap();
    assert!(nested_path.exists());
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let file_path = PathBuf::from("/nonexistent/path/settings.json");

    let result: Result<Settings, _> = load_json(&file_path).await;
    assert!(matches!(result, Err(StoreError::Io(_))));
}

#[tokio::test]
async fn test_ensure_dir_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let dir_path = temp_dir.path().join("test_dir");

    ensure_dir(&dir_path).await.unwrap();
    ensure_dir(&dir_path).await.unwrap();

    assert!(dir_path.is_dir());
}

#[tokio::test]
async fn test_load_or_default_on_corrupt_file() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");
    tokio::fs::write(&file_path, "{ not json").await.unwrap();

    let settings: Settings = load_json_or_default(&file_path).await;
    assert_eq!(settings, Settings::default());
}

#[tokio::test]
async fn test_overwrite_replaces_content() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("data.json");

    save_json(&file_path, &vec![1, 2, 3]).await.unwrap();
    save_json(&file_path, &vec![4]).await.unwrap();

    let loaded: Vec<i32> = load_json(&file_path).await.unwrap();
    assert_eq!(loaded, vec![4]);
}

// ============================================================================
// Settings Tests
// ============================================================================

#[tokio::test]
async fn test_settings_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    let settings = Settings {
        endpoint: "https://inference.example.com/v2/analyze".to_string(),
        retry: RetrySettings {
            max_attempts: 5,
            ..RetrySettings::default()
        },
        ..Settings::default()
    };
    settings.save(&path).await.unwrap();

    assert_eq!(Settings::load(&path).await, settings);
}

#[tokio::test]
async fn test_settings_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings::load(&temp_dir.path().join("absent.json")).await;
    assert_eq!(settings, Settings::default());
}

#[tokio::test]
async fn test_settings_malformed_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    tokio::fs::write(&path, "[1, 2").await.unwrap();

    assert_eq!(Settings::load(&path).await, Settings::default());
}

#[cfg(unix)]
#[tokio::test]
async fn test_settings_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    Settings::default().save(&path).await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[cfg(unix)]
#[test]
fn test_atomic_write_narrows_stale_temp_file() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("job.json");
    let stale = temp_dir.path().join("job.json.tmp");
    std::fs::write(&stale, b"leftover from a crash").unwrap();
    std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

    write_atomic_blocking(&path, b"{}").unwrap();

    assert!(!stale.exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

// ============================================================================
// Sealed Credential Store Tests
// ============================================================================

fn sealed_store(dir: &TempDir, passphrase: &str) -> CredentialStore {
    let backend = SealedFileBackend::new(dir.path().join("data").join("credential.sealed"), passphrase)
        .unwrap()
        .with_iterations(NonZeroU32::new(1_000).unwrap());
    CredentialStore::new(backend)
}

#[test]
fn test_sealed_store_survives_restart() {
    let temp_dir = TempDir::new().unwrap();

    sealed_store(&temp_dir, "pass").set("abc123").unwrap();

    let reopened = sealed_store(&temp_dir, "pass");
    assert_eq!(reopened.get().unwrap().expose(), "abc123");
}

#[test]
fn test_sealed_store_blank_set_keeps_stored_value() {
    let temp_dir = TempDir::new().unwrap();
    let store = sealed_store(&temp_dir, "pass");
    store.set("abc123").unwrap();

    assert!(matches!(store.set("   "), Err(StoreError::InvalidCredential(_))));

    let reopened = sealed_store(&temp_dir, "pass");
    assert_eq!(reopened.get().unwrap().expose(), "abc123");
}

#[test]
fn test_sealed_store_wrong_passphrase_reports_storage_failure() {
    let temp_dir = TempDir::new().unwrap();
    sealed_store(&temp_dir, "pass").set("abc123").unwrap();

    let other = sealed_store(&temp_dir, "wrong");
    assert!(other.get().is_none());
    let err = other.try_get().unwrap_err();
    assert_eq!(err.kind(), nutrilens_core::ErrorKind::Storage);
}

#[test]
fn test_sealed_store_clear_removes_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = sealed_store(&temp_dir, "pass");
    store.set("abc123").unwrap();
    store.clear().unwrap();

    assert!(!temp_dir.path().join("data").join("credential.sealed").exists());
    assert!(sealed_store(&temp_dir, "pass").get().is_none());
}

#[test]
fn test_from_settings_uses_sealed_file_under_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings {
        credential_backend: CredentialBackendKind::SealedFile,
        data_dir: Some(temp_dir.path().to_path_buf()),
        ..Settings::default()
    };

    let store = CredentialStore::from_settings(&settings, Some("pass".to_string())).unwrap();
    assert_eq!(store.backend_name(), "sealed_file");
    store.set("abc123").unwrap();
    assert!(settings.sealed_credential_path().exists());
}
