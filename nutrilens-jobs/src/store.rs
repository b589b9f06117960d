//! Durable job record storage.
//!
//! A record has a single writer: whoever holds its lease. The queue takes
//! the lease before driving, recovering or cancelling a job, and renews it
//! while the job is active. A lease that is not renewed expires, so a
//! crashed process never blocks a job for longer than the lease lifetime.
//!
//! Another process that wants a leased job cancelled leaves a cancellation
//! request; the lease holder honors it at its next safe point.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nutrilens_store::{StoreError, ensure_dir, load_json, save_json, write_atomic};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::job::{AnalysisJob, JobId};

// ============================================================================
// Leases
// ============================================================================

/// Identifies one queue instance as a lease holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Generates a new random owner id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lease file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
    owner: OwnerId,
    pid: u32,
    expires_at: DateTime<Utc>,
}

/// Absolute expiry for a lease taken now.
fn lease_expiry(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Persistent set of job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Loads every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    async fn load_all(&self) -> Result<Vec<AnalysisJob>, JobError>;

    /// Loads one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    async fn load(&self, id: JobId) -> Result<Option<AnalysisJob>, JobError>;

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    async fn save(&self, job: &AnalysisJob) -> Result<(), JobError>;

    /// Takes or renews the lease on `id` for `ttl`.
    ///
    /// Returns `false` if another owner holds an unexpired lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease cannot be read or written.
    async fn acquire(&self, id: JobId, owner: OwnerId, ttl: Duration) -> Result<bool, JobError>;

    /// Gives up the lease on `id` if `owner` holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease cannot be removed.
    async fn release(&self, id: JobId, owner: OwnerId) -> Result<(), JobError>;

    /// Asks the lease holder of `id` to cancel it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be written.
    async fn request_cancel(&self, id: JobId) -> Result<(), JobError>;

    /// Returns true if cancellation of `id` was requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be read.
    async fn cancel_requested(&self, id: JobId) -> Result<bool, JobError>;

    /// Drops a pending cancellation request for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be removed.
    async fn clear_cancel_request(&self, id: JobId) -> Result<(), JobError>;
}

// ============================================================================
// File Store
// ============================================================================

/// One JSON file per job in a directory.
///
/// Writes are atomic (temp file + rename) and owner-only.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Creates a store rooted at `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, JobError> {
        let dir = dir.into();
        ensure_dir(&dir).await?;
        debug!(dir = %dir.display(), "Job store opened");
        Ok(Self { dir })
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lease_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.lease"))
    }

    fn cancel_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.cancel"))
    }

    /// Creates the lease file with its full contents, failing if it exists.
    async fn create_lease(&self, id: JobId, owner: OwnerId, bytes: &[u8]) -> Result<bool, JobError> {
        // Write aside, then link into place: readers never see a partial lease.
        let staged = self.dir.join(format!("{id}.lease.{owner}.tmp"));
        tokio::fs::write(&staged, bytes).await?;
        let linked = tokio::fs::hard_link(&staged, self.lease_path(id)).await;
        remove_if_exists(&staged).await?;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), JobError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn load_all(&self) -> Result<Vec<AnalysisJob>, JobError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut jobs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_json::<AnalysisJob>(&path).await {
                Ok(job) => jobs.push(job),
                // Leave the file in place for inspection; one bad record must
                // not block recovery of the others.
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable job record"),
            }
        }

        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn load(&self, id: JobId) -> Result<Option<AnalysisJob>, JobError> {
        match load_json(&self.path_for(id)).await {
            Ok(job) => Ok(Some(job)),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, job: &AnalysisJob) -> Result<(), JobError> {
        save_json(&self.path_for(job.id), job).await?;
        debug!(job_id = %job.id, state = %job.state, "Job record saved");
        Ok(())
    }

    async fn acquire(&self, id: JobId, owner: OwnerId, ttl: Duration) -> Result<bool, JobError> {
        let path = self.lease_path(id);
        let lease = LeaseRecord {
            owner,
            pid: std::process::id(),
            expires_at: lease_expiry(ttl),
        };
        let bytes = serde_json::to_vec(&lease)?;

        // Second pass covers a lease that expired or vanished under us.
        for _ in 0..2 {
            if self.create_lease(id, owner, &bytes).await? {
                debug!(job_id = %id, %owner, "Lease taken");
                return Ok(true);
            }
            match load_json::<LeaseRecord>(&path).await {
                Ok(current) if current.owner == owner => {
                    write_atomic(&path, bytes).await?;
                    return Ok(true);
                }
                Ok(current) if current.expires_at > Utc::now() => return Ok(false),
                Ok(current) => {
                    warn!(job_id = %id, pid = current.pid, "Taking over expired job lease");
                }
                Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => warn!(job_id = %id, error = %e, "Replacing unreadable job lease"),
            }
            remove_if_exists(&path).await?;
        }
        Ok(false)
    }

    async fn release(&self, id: JobId, owner: OwnerId) -> Result<(), JobError> {
        let path = self.lease_path(id);
        match load_json::<LeaseRecord>(&path).await {
            Ok(current) if current.owner == owner => remove_if_exists(&path).await,
            Ok(_) => Ok(()),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn request_cancel(&self, id: JobId) -> Result<(), JobError> {
        write_atomic(&self.cancel_path(id), Vec::new()).await?;
        Ok(())
    }

    async fn cancel_requested(&self, id: JobId) -> Result<bool, JobError> {
        Ok(tokio::fs::try_exists(self.cancel_path(id)).await?)
    }

    async fn clear_cancel_request(&self, id: JobId) -> Result<(), JobError> {
        remove_if_exists(&self.cancel_path(id)).await
    }
}

// ============================================================================
// Memory Store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<JobId, AnalysisJob>,
    leases: HashMap<JobId, (OwnerId, DateTime<Utc>)>,
    cancel_requests: HashSet<JobId>,
}

/// Non-durable store for tests and embedding.
///
/// Queues sharing one instance behave like processes sharing a jobs
/// directory.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, JobError> {
        self.state
            .lock()
            .map_err(|_| JobError::Store(StoreError::LockPoisoned))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load_all(&self) -> Result<Vec<AnalysisJob>, JobError> {
        let mut jobs: Vec<AnalysisJob> = self.lock()?.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn load(&self, id: JobId) -> Result<Option<AnalysisJob>, JobError> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn save(&self, job: &AnalysisJob) -> Result<(), JobError> {
        self.lock()?.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn acquire(&self, id: JobId, owner: OwnerId, ttl: Duration) -> Result<bool, JobError> {
        let mut state = self.lock()?;
        if let Some((holder, expires_at)) = state.leases.get(&id) {
            if *holder != owner && *expires_at > Utc::now() {
                return Ok(false);
            }
        }
        state.leases.insert(id, (owner, lease_expiry(ttl)));
        Ok(true)
    }

    async fn release(&self, id: JobId, owner: OwnerId) -> Result<(), JobError> {
        let mut state = self.lock()?;
        if state.leases.get(&id).is_some_and(|(holder, _)| *holder == owner) {
            state.leases.remove(&id);
        }
        Ok(())
    }

    async fn request_cancel(&self, id: JobId) -> Result<(), JobError> {
        self.lock()?.cancel_requests.insert(id);
        Ok(())
    }

    async fn cancel_requested(&self, id: JobId) -> Result<bool, JobError> {
        Ok(self.lock()?.cancel_requests.contains(&id))
    }

    async fn clear_cancel_request(&self, id: JobId) -> Result<(), JobError> {
        self.lock()?.cancel_requests.remove(&id);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
