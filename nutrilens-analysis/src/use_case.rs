//! Analysis use cases.
//!
//! Every operation returns an [`Outcome`]. Failures from lower layers are
//! forwarded with their [`ErrorKind`] intact; only context is added.

use std::sync::Arc;

use nutrilens_core::{AnalysisPayload, ErrorKind, Failure, NutritionEstimate, Outcome};
use nutrilens_jobs::{JobError, JobId, JobQueue};
use nutrilens_store::CredentialStore;
use tracing::{debug, info, instrument};

use crate::parser::parse_estimate;

// ============================================================================
// Analyze Meal
// ============================================================================

/// Requests nutrition estimates through the durable job queue.
#[derive(Debug, Clone)]
pub struct AnalyzeMeal {
    queue: JobQueue,
}

impl AnalyzeMeal {
    /// Creates the use case over `queue`.
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// Analyzes a meal and waits for the estimate.
    #[instrument(skip(self, payload))]
    pub async fn analyze(&self, payload: AnalysisPayload) -> Outcome<NutritionEstimate> {
        let handle = match self.queue.enqueue(payload).await {
            Ok(handle) => handle,
            Err(err) => return Outcome::failure(Failure::from(err)),
        };
        let id = handle.id();

        let outcome = handle
            .outcome()
            .await
            .and_then(parse_estimate)
            .context(format!("analysis {id}"));

        debug!(
            job_id = %id,
            outcome = outcome.kind().map_or("success", ErrorKind::as_str),
            "Analysis finished"
        );
        outcome
    }

    /// Queues a meal for analysis without waiting.
    ///
    /// The estimate can be read later with [`AnalyzeMeal::estimate`].
    #[instrument(skip(self, payload))]
    pub async fn submit(&self, payload: AnalysisPayload) -> Outcome<JobId> {
        match self.queue.enqueue(payload).await {
            Ok(handle) => {
                info!(job_id = %handle.id(), "Analysis queued");
                Outcome::success(handle.id())
            }
            Err(err) => Outcome::failure(Failure::from(err)),
        }
    }

    /// Reads the estimate of a submitted analysis.
    ///
    /// Yields `None` while the job is still pending or running.
    pub async fn estimate(&self, id: JobId) -> Outcome<Option<NutritionEstimate>> {
        let job = match self.queue.status(id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Outcome::failure(Failure::from(JobError::NotFound(id))),
            Err(err) => return Outcome::failure(Failure::from(err)),
        };

        match job.outcome() {
            None => Outcome::success(None),
            Some(outcome) => outcome.and_then(parse_estimate).map(Some),
        }
    }

    /// Cancels a submitted analysis.
    ///
    /// Returns `false` when the analysis had already finished.
    pub async fn cancel(&self, id: JobId) -> Outcome<bool> {
        self.queue.cancel(id).await.into()
    }
}

// ============================================================================
// Manage Credential
// ============================================================================

/// Settings-screen operations on the API credential.
#[derive(Debug, Clone)]
pub struct ManageCredential {
    store: Arc<CredentialStore>,
}

impl ManageCredential {
    /// Creates the use case over `store`.
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Stores a new credential.
    ///
    /// Blank input is a [`ErrorKind::Validation`] failure and leaves the
    /// previous credential in place.
    pub fn set(&self, raw: &str) -> Outcome<()> {
        let outcome: Outcome<()> = self.store.set(raw).into();
        if outcome.is_success() {
            info!(backend = self.store.backend_name(), "API credential updated");
        }
        outcome
    }

    /// Removes the credential. Succeeds when none was stored.
    pub fn clear(&self) -> Outcome<()> {
        let outcome: Outcome<()> = self.store.clear().into();
        if outcome.is_success() {
            info!(backend = self.store.backend_name(), "API credential cleared");
        }
        outcome
    }

    /// Returns true if a credential is configured.
    pub fn is_configured(&self) -> bool {
        self.store.is_configured()
    }

    /// Storage backend name, for status output.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}
