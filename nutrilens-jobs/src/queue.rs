//! The durable job queue.
//!
//! Each job is owned by one driver task, which holds the job's lease in the
//! [`JobStore`] for as long as it runs. The driver runs attempts strictly
//! one after another, persists every transition before acting on it, and
//! delivers the terminal outcome to the waiting [`JobHandle`] at most once.
//!
//! Distinct jobs run concurrently, bounded by a semaphore that is held only
//! while an attempt is in flight. Backoff waits do not hold a permit.
//!
//! Cancellation and the driver's decision to record a terminal outcome are
//! taken under the same registry lock, so [`JobQueue::cancel`] returns
//! `true` exactly when the job ends `Cancelled`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use nutrilens_core::{AnalysisPayload, ErrorKind, Failure, Outcome};
use nutrilens_fetch::{OutboundRequest, RetryStrategy, TransportPipeline};
use serde_json::Value;
use tokio::sync::{Semaphore, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::error::JobError;
use crate::job::{AnalysisJob, JobId, JobState};
use crate::store::{JobStore, OwnerId};

// ============================================================================
// Request Factory
// ============================================================================

/// Turns a job payload into the upstream request.
///
/// Called once per attempt, so every attempt sends a freshly built request.
pub trait RequestFactory: Send + Sync {
    /// Builds the request for `payload`.
    ///
    /// # Errors
    ///
    /// Returns a terminal failure if the payload cannot be encoded.
    fn build_request(&self, payload: &AnalysisPayload) -> Result<OutboundRequest, Failure>;

    /// Checks a 2xx JSON body before it is recorded as the job's result.
    ///
    /// # Errors
    ///
    /// Returns a terminal failure (usually `InvalidResponse`) for a body
    /// that is not a usable result.
    fn check_response(&self, _body: &Value) -> Result<(), Failure> {
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Default lifetime of a job lease.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Queue tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Backoff policy between attempts.
    pub retry: RetryStrategy,
    /// Maximum attempts in flight at once.
    pub workers: usize,
    /// How long a job lease lasts without renewal. Also bounds how long a
    /// crashed process keeps its jobs from being recovered.
    pub lease_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryStrategy::default(),
            workers: 4,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

// ============================================================================
// Job Handle
// ============================================================================

/// Waits for one job's terminal outcome.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    receiver: oneshot::Receiver<Outcome<Value>>,
}

impl JobHandle {
    /// The job id.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Waits for the terminal outcome.
    ///
    /// If the driver stops before the job is terminal (its record could not
    /// be written, or the queue was shut down), the result is a `Storage`
    /// failure and the job is left for [`JobQueue::recover`].
    pub async fn outcome(self) -> Outcome<Value> {
        self.receiver.await.unwrap_or_else(|_| {
            Outcome::failure(Failure::new(
                ErrorKind::Storage,
                format!("job {} stopped before delivering an outcome", self.id),
            ))
        })
    }
}

// ============================================================================
// Job Queue
// ============================================================================

struct Active {
    cancel: CancellationToken,
    waiter: Option<oneshot::Sender<Outcome<Value>>>,
    /// Set once the driver has committed to a terminal state.
    finished: bool,
}

struct Inner {
    store: Arc<dyn JobStore>,
    pipeline: TransportPipeline,
    factory: Arc<dyn RequestFactory>,
    retry: RetryStrategy,
    permits: Arc<Semaphore>,
    active: Mutex<HashMap<JobId, Active>>,
    owner: OwnerId,
    lease_ttl: Duration,
    stopping: CancellationToken,
    drivers: TaskTracker,
}

/// How a driver stopped.
enum RunEnd {
    /// The job reached a terminal state.
    Finished,
    /// The queue is shutting down; the record is left for recovery.
    Stopped,
}

/// Handle to the queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    /// Creates a queue.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Config`] for an unusable retry policy, a zero
    /// worker count or a zero lease lifetime.
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: TransportPipeline,
        factory: Arc<dyn RequestFactory>,
        config: QueueConfig,
    ) -> Result<Self, JobError> {
        config
            .retry
            .validate()
            .map_err(|e| JobError::Config(e.to_string()))?;
        if config.workers == 0 {
            return Err(JobError::Config("workers must be at least 1".to_string()));
        }
        if config.lease_ttl.is_zero() {
            return Err(JobError::Config("lease_ttl must be positive".to_string()));
        }

        let owner = OwnerId::new();
        debug!(%owner, "Job queue created");
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                pipeline,
                factory,
                retry: config.retry,
                permits: Arc::new(Semaphore::new(config.workers)),
                active: Mutex::new(HashMap::new()),
                owner,
                lease_ttl: config.lease_ttl,
                stopping: CancellationToken::new(),
                drivers: TaskTracker::new(),
            }),
        })
    }

    /// Persists a new job and starts driving it.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidPayload`] if there is nothing to analyze,
    /// [`JobError::ShutDown`] after [`JobQueue::shutdown`], or a storage
    /// error if the record cannot be written.
    #[instrument(skip(self, payload))]
    pub async fn enqueue(&self, payload: AnalysisPayload) -> Result<JobHandle, JobError> {
        payload.validate().map_err(JobError::InvalidPayload)?;
        if self.inner.stopping.is_cancelled() {
            return Err(JobError::ShutDown);
        }

        let job = AnalysisJob::new(payload);
        // Lease first: another process's recovery must never see an unowned record.
        if !self.inner.take_lease(job.id).await? {
            return Err(JobError::LeaseLost(job.id));
        }
        if let Err(e) = self.inner.store.save(&job).await {
            self.inner.give_up_lease(job.id).await;
            return Err(e);
        }
        info!(job_id = %job.id, "Job enqueued");

        self.spawn(job).await
    }

    /// Re-arms every job left unfinished by a previous process.
    ///
    /// - `Pending` and `Retrying` jobs continue where they left off.
    /// - `Running` jobs were interrupted mid-attempt; that attempt counts as a
    ///   `NetworkError` and the usual retry-or-exhaust rule applies.
    /// - Jobs with a pending cancellation request are cancelled.
    /// - Terminal jobs whose outcome was never delivered are delivered now.
    ///
    /// Jobs active in this process, or leased by another live process, are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be listed or updated.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<JobHandle>, JobError> {
        if self.inner.stopping.is_cancelled() {
            return Err(JobError::ShutDown);
        }
        let mut handles = Vec::new();

        for listed in self.inner.store.load_all().await? {
            if self.inner.is_active(listed.id)? {
                continue;
            }
            if listed.is_terminal() && listed.delivered {
                continue;
            }
            if !self.inner.take_lease(listed.id).await? {
                debug!(job_id = %listed.id, "Job leased by another process");
                continue;
            }

            match self.inner.adopt(listed.id).await {
                Ok(Some(job)) => {
                    debug!(job_id = %job.id, state = %job.state, "Re-arming job");
                    handles.push(self.spawn(job).await?);
                }
                Ok(None) => self.inner.give_up_lease(listed.id).await,
                Err(e) => {
                    self.inner.give_up_lease(listed.id).await;
                    return Err(e);
                }
            }
        }

        info!(count = handles.len(), "Recovery complete");
        Ok(handles)
    }

    /// Requests cancellation of a job.
    ///
    /// A waiting job is cancelled right away. A running attempt is allowed
    /// to finish, its result is discarded and the job ends `Cancelled`. A job
    /// driven by another process is cancelled by that process; this call
    /// waits for its decision.
    ///
    /// Returns `true` if the job ends `Cancelled` because of this call and
    /// `false` if it had already finished or finishes with its own outcome.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for an unknown id.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: JobId) -> Result<bool, JobError> {
        if let Some(accepted) = self.inner.cancel_active(id)? {
            if accepted {
                info!(job_id = %id, "Cancellation requested");
            }
            return Ok(accepted);
        }

        let Some(job) = self.inner.store.load(id).await? else {
            return Err(JobError::NotFound(id));
        };
        if job.is_terminal() {
            return Ok(false);
        }
        self.inner.cancel_elsewhere(id).await
    }

    /// Current record for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn status(&self, id: JobId) -> Result<Option<AnalysisJob>, JobError> {
        self.inner.store.load(id).await
    }

    /// All records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn jobs(&self) -> Result<Vec<AnalysisJob>, JobError> {
        self.inner.store.load_all().await
    }

    /// Number of jobs driven by this process right now.
    pub fn active_count(&self) -> usize {
        self.inner.active().map(|active| active.len()).unwrap_or(0)
    }

    /// Stops every driver at its next safe point and waits for them.
    ///
    /// In-flight attempts finish and are recorded. Waiting jobs keep their
    /// state and release their lease, so the next [`JobQueue::recover`]
    /// picks them up without spending an attempt.
    pub async fn shutdown(&self) {
        self.inner.stopping.cancel();
        self.inner.drivers.close();
        self.inner.drivers.wait().await;
        debug!("Job queue shut down");
    }

    /// Registers and starts a driver for a job whose lease is already held.
    async fn spawn(&self, job: AnalysisJob) -> Result<JobHandle, JobError> {
        let id = job.id;
        let (sender, receiver) = oneshot::channel();
        let token = CancellationToken::new();

        let registered = self.inner.active().and_then(|mut active| {
            if active.contains_key(&id) {
                return Err(JobError::AlreadyActive(id));
            }
            active.insert(
                id,
                Active {
                    cancel: token.clone(),
                    waiter: Some(sender),
                    finished: job.is_terminal(),
                },
            );
            Ok(())
        });
        if let Err(e) = registered {
            if !matches!(e, JobError::AlreadyActive(_)) {
                self.inner.give_up_lease(id).await;
            }
            return Err(e);
        }

        self.inner.drivers.spawn(Arc::clone(&self.inner).drive(job, token));
        Ok(JobHandle { id, receiver })
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("owner", &self.inner.owner)
            .field("retry", &self.inner.retry)
            .field("available_permits", &self.inner.permits.available_permits())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Driver
// ============================================================================

impl Inner {
    fn active(&self) -> Result<MutexGuard<'_, HashMap<JobId, Active>>, JobError> {
        self.active
            .lock()
            .map_err(|_| JobError::Store(nutrilens_store::StoreError::LockPoisoned))
    }

    fn is_active(&self, id: JobId) -> Result<bool, JobError> {
        Ok(self.active()?.contains_key(&id))
    }

    /// How often leases are renewed and cancellation requests polled.
    fn poll_interval(&self) -> Duration {
        (self.lease_ttl / 6).max(Duration::from_millis(10))
    }

    async fn take_lease(&self, id: JobId) -> Result<bool, JobError> {
        self.store.acquire(id, self.owner, self.lease_ttl).await
    }

    async fn give_up_lease(&self, id: JobId) {
        if let Err(e) = self.store.release(id, self.owner).await {
            warn!(job_id = %id, error = %e, "Could not release job lease");
        }
    }

    /// Cancels a job driven here. `None` if no driver here owns it.
    fn cancel_active(&self, id: JobId) -> Result<Option<bool>, JobError> {
        let active = self.active()?;
        Ok(active.get(&id).map(|entry| {
            if entry.finished {
                false
            } else {
                entry.cancel.cancel();
                true
            }
        }))
    }

    /// Decides whether the driver may record its outcome.
    ///
    /// Returns `false` if the job was cancelled first. A terminal outcome
    /// closes the job to later cancellation.
    fn commit(&self, id: JobId, terminal: bool) -> Result<bool, JobError> {
        let mut active = self.active()?;
        let Some(entry) = active.get_mut(&id) else {
            return Ok(true);
        };
        if entry.cancel.is_cancelled() {
            return Ok(false);
        }
        entry.finished |= terminal;
        Ok(true)
    }

    fn take_waiter(&self, id: JobId) -> Option<oneshot::Sender<Outcome<Value>>> {
        match self.active() {
            Ok(mut active) => active.get_mut(&id).and_then(|entry| entry.waiter.take()),
            Err(e) => {
                warn!(job_id = %id, error = %e, "Could not reach job waiter");
                None
            }
        }
    }

    fn unregister(&self, id: JobId) {
        match self.active() {
            Ok(mut active) => {
                active.remove(&id);
            }
            Err(e) => warn!(job_id = %id, error = %e, "Could not unregister job"),
        }
    }

    /// Reloads a freshly leased record and settles what the previous owner
    /// left behind. `None` if there is nothing left to do.
    async fn adopt(&self, id: JobId) -> Result<Option<AnalysisJob>, JobError> {
        let Some(mut job) = self.store.load(id).await? else {
            return Ok(None);
        };
        if job.is_terminal() && job.delivered {
            return Ok(None);
        }

        if !job.is_terminal() && self.store.cancel_requested(id).await? {
            job.cancel(Utc::now());
            self.store.save(&job).await?;
            info!(job_id = %id, "Honored cancellation request left for a stopped process");
        } else if job.state == JobState::Running {
            let failure = Failure::new(
                ErrorKind::NetworkError,
                "attempt interrupted before its outcome was recorded",
            );
            self.settle_failure(&mut job, failure);
            self.store.save(&job).await?;
            warn!(
                job_id = %job.id,
                attempt = job.attempts,
                state = %job.state,
                "Recovered interrupted attempt"
            );
        }
        Ok(Some(job))
    }

    /// Cancels a job no driver here owns.
    async fn cancel_elsewhere(&self, id: JobId) -> Result<bool, JobError> {
        let mut requested = false;
        loop {
            if requested {
                if let Some(job) = self.store.load(id).await? {
                    if job.is_terminal() {
                        self.store.clear_cancel_request(id).await?;
                        return Ok(job.state == JobState::Cancelled);
                    }
                }
            }

            if self.take_lease(id).await? {
                let result = self.cancel_owned(id, requested).await;
                if requested {
                    if let Err(e) = self.store.clear_cancel_request(id).await {
                        warn!(job_id = %id, error = %e, "Could not clear cancellation request");
                    }
                }
                self.give_up_lease(id).await;
                return result;
            }

            if !requested {
                self.store.request_cancel(id).await?;
                requested = true;
                info!(job_id = %id, "Cancellation requested from the owning process");
                continue;
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    /// Cancels a job whose lease this queue holds but does not drive.
    async fn cancel_owned(&self, id: JobId, requested: bool) -> Result<bool, JobError> {
        let Some(mut job) = self.store.load(id).await? else {
            return Err(JobError::NotFound(id));
        };
        if job.is_terminal() {
            // The previous owner may have honored our request before letting go.
            return Ok(requested && job.state == JobState::Cancelled);
        }
        job.cancel(Utc::now());
        self.store.save(&job).await?;
        info!(job_id = %id, "Job cancelled");
        Ok(true)
    }

    /// Backoff before the next attempt, or `None` if `failure` is final.
    fn retry_delay(&self, failure: &Failure, attempts: u32) -> Option<Duration> {
        self.retry
            .should_retry(failure.kind(), attempts)
            .then(|| self.retry.delay_for_attempt(attempts))
    }

    /// Applies the retry-or-exhaust rule to a failed attempt.
    fn settle_failure(&self, job: &mut AnalysisJob, failure: Failure) {
        let retry_after = self.retry_delay(&failure, job.attempts);
        job.record_failure(failure, retry_after, Utc::now());
    }

    async fn drive(self: Arc<Self>, mut job: AnalysisJob, token: CancellationToken) {
        let id = job.id;
        let end = tokio::select! {
            end = self.run(&mut job, &token) => end,
            lost = self.keep_lease(id, &token) => Err(lost),
        };

        match end {
            Ok(RunEnd::Finished) => {
                if let Err(e) = self.store.clear_cancel_request(id).await {
                    warn!(job_id = %id, error = %e, "Could not clear cancellation request");
                }
                self.deliver(&mut job).await;
            }
            Ok(RunEnd::Stopped) => {
                debug!(job_id = %id, state = %job.state, "Driver stopped, record left for recovery");
            }
            Err(e) => warn!(job_id = %id, error = %e, "Job driver stopped, record left for recovery"),
        }

        // The lease goes before the registry entry, so a recovery in this
        // process cannot adopt the job while it is still being delivered.
        self.give_up_lease(id).await;
        self.unregister(id);
    }

    /// Renews the lease and relays cancellation requests until the lease
    /// is lost.
    async fn keep_lease(&self, id: JobId, token: &CancellationToken) -> JobError {
        let mut ticks = tokio::time::interval(self.poll_interval());
        ticks.tick().await;
        loop {
            ticks.tick().await;
            match self.take_lease(id).await {
                Ok(true) => {}
                Ok(false) => return JobError::LeaseLost(id),
                Err(e) => warn!(job_id = %id, error = %e, "Could not renew job lease"),
            }
            match self.store.cancel_requested(id).await {
                Ok(true) if !token.is_cancelled() => {
                    info!(job_id = %id, "Cancellation requested by another process");
                    token.cancel();
                }
                Ok(_) => {}
                Err(e) => warn!(job_id = %id, error = %e, "Could not read cancellation request"),
            }
        }
    }

    async fn run(&self, job: &mut AnalysisJob, token: &CancellationToken) -> Result<RunEnd, JobError> {
        while !job.is_terminal() {
            let wait = job.wait_until_eligible(Utc::now());
            if !wait.is_zero() {
                debug!(job_id = %job.id, delay = ?wait, "Waiting for backoff");
                tokio::select! {
                    biased;
                    () = token.cancelled() => return self.finish_cancelled(job).await,
                    () = self.stopping.cancelled() => return Ok(RunEnd::Stopped),
                    () = tokio::time::sleep(wait) => {}
                }
            }
            if job.state == JobState::Retrying {
                job.state = JobState::Pending;
            }

            let permit = tokio::select! {
                biased;
                () = token.cancelled() => return self.finish_cancelled(job).await,
                () = self.stopping.cancelled() => return Ok(RunEnd::Stopped),
                permit = Arc::clone(&self.permits).acquire_owned() => {
                    permit.map_err(|_| JobError::ShutDown)?
                }
            };

            let attempt = job.begin_attempt(Utc::now());
            self.store.save(job).await?;
            info!(job_id = %job.id, attempt, "Attempt started");

            let result = self.attempt(job).await;
            drop(permit);

            if matches!(self.store.cancel_requested(job.id).await, Ok(true)) {
                token.cancel();
            }
            let retry_after = match &result {
                Ok(_) => None,
                Err(failure) => self.retry_delay(failure, job.attempts),
            };
            let terminal = result.is_ok() || retry_after.is_none();
            if !self.commit(job.id, terminal)? {
                debug!(job_id = %job.id, attempt, "Discarding result of cancelled job");
                return self.finish_cancelled(job).await;
            }

            match result {
                Ok(value) => {
                    job.record_success(value, Utc::now());
                    info!(job_id = %job.id, attempt, outcome = "success", "Attempt succeeded");
                }
                Err(failure) => {
                    let kind = failure.kind();
                    job.record_failure(failure, retry_after, Utc::now());
                    warn!(
                        job_id = %job.id,
                        attempt,
                        outcome = %kind,
                        state = %job.state,
                        "Attempt failed"
                    );
                }
            }
            self.store.save(job).await?;
        }
        Ok(RunEnd::Finished)
    }

    async fn attempt(&self, job: &AnalysisJob) -> Result<Value, Failure> {
        let request = self.factory.build_request(&job.payload)?;
        let response = self.pipeline.execute(&request).await?;
        let body = response.json::<Value>().map_err(|e| {
            Failure::from_error(ErrorKind::InvalidResponse, e).with_status(response.status())
        })?;
        self.factory
            .check_response(&body)
            .map_err(|failure| failure.with_status(response.status()))?;
        Ok(body)
    }

    async fn finish_cancelled(&self, job: &mut AnalysisJob) -> Result<RunEnd, JobError> {
        if let Ok(mut active) = self.active() {
            if let Some(entry) = active.get_mut(&job.id) {
                entry.finished = true;
            }
        }
        job.cancel(Utc::now());
        self.store.save(job).await?;
        info!(job_id = %job.id, attempts = job.attempts, "Job cancelled");
        Ok(RunEnd::Finished)
    }

    /// Hands the terminal outcome to the waiter, at most once.
    async fn deliver(&self, job: &mut AnalysisJob) {
        let waiter = self.take_waiter(job.id);
        let Some(outcome) = job.outcome() else {
            return;
        };
        if job.delivered {
            return;
        }
        let Some(waiter) = waiter.filter(|w| !w.is_closed()) else {
            debug!(job_id = %job.id, "No waiter, outcome kept for recovery");
            return;
        };

        // Persist first: a crash after this point can lose the notification
        // but can never deliver it twice.
        job.mark_delivered(Utc::now());
        if let Err(e) = self.store.save(job).await {
            warn!(job_id = %job.id, error = %e, "Could not record delivery, outcome kept for recovery");
            return;
        }

        debug!(job_id = %job.id, state = %job.state, "Delivering outcome");
        let _ = waiter.send(outcome);
    }
}
