//! Wiring of the analysis pipeline from settings.

use std::sync::Arc;

use nutrilens_fetch::{HttpTransport, RequestAuthenticator, TransportPipeline};
use nutrilens_jobs::{FileJobStore, JobQueue, QueueConfig};
use nutrilens_store::{CredentialStore, Settings};
use tracing::{debug, instrument};

use crate::api::InferenceApi;
use crate::error::AnalysisError;
use crate::use_case::{AnalyzeMeal, ManageCredential};

/// A fully wired analysis pipeline.
///
/// Credential store, request builder, HTTP transport, job store and queue
/// are built once per process and shared by the use cases.
#[derive(Debug, Clone)]
pub struct AnalysisService {
    queue: JobQueue,
    credentials: Arc<CredentialStore>,
}

impl AnalysisService {
    /// Creates a service over already-built parts.
    pub fn new(queue: JobQueue, credentials: Arc<CredentialStore>) -> Self {
        Self { queue, credentials }
    }

    /// Builds the pipeline described by `settings`.
    ///
    /// Does not run recovery; call [`JobQueue::recover`] on
    /// [`AnalysisService::queue`] once at startup.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings, when the HTTP client cannot be
    /// built, or when the job directory cannot be created.
    #[instrument(skip(settings, credentials))]
    pub async fn open(
        settings: &Settings,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, AnalysisError> {
        settings.validate()?;

        let mut transport = HttpTransport::with_timeout(settings.timeout())?;
        if !settings.allowed_domains.is_empty() {
            transport = transport.with_allowed_domains(settings.allowed_domains.clone());
        }

        let authenticator =
            RequestAuthenticator::with_header_name(credentials.clone(), &settings.auth_header)?;
        let pipeline = TransportPipeline::new(authenticator, Arc::new(transport));

        let store = FileJobStore::open(settings.jobs_dir()).await?;
        let api = InferenceApi::from_settings(settings)?;
        debug!(endpoint = %api.endpoint(), workers = settings.workers, "Analysis pipeline ready");

        let queue = JobQueue::new(
            Arc::new(store),
            pipeline,
            Arc::new(api),
            QueueConfig {
                retry: settings.retry_strategy(),
                workers: settings.workers,
                ..QueueConfig::default()
            },
        )?;

        Ok(Self::new(queue, credentials))
    }

    /// The job queue.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// The analysis use case.
    pub fn analyze_meal(&self) -> AnalyzeMeal {
        AnalyzeMeal::new(self.queue.clone())
    }

    /// The credential use case.
    pub fn manage_credential(&self) -> ManageCredential {
        ManageCredential::new(Arc::clone(&self.credentials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutrilens_core::ErrorKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_jobs_dir() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            data_dir: Some(dir.path().to_path_buf()),
            ..Settings::default()
        };

        let service = AnalysisService::open(&settings, Arc::new(CredentialStore::in_memory()))
            .await
            .unwrap();

        assert!(dir.path().join("jobs").is_dir());
        assert_eq!(service.queue().active_count(), 0);
        assert!(!service.manage_credential().is_configured());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_settings() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            data_dir: Some(dir.path().to_path_buf()),
            workers: 0,
            ..Settings::default()
        };

        let err = AnalysisService::open(&settings, Arc::new(CredentialStore::in_memory()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
