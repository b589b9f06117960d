//! Job records.
//!
//! An [`AnalysisJob`] is the durable unit of work. It is persisted after
//! every transition, so the record on disk is always the state of the job.
//!
//! ```text
//! Pending -> Running -> Succeeded
//!               |-----> Retrying -> (delay) -> Pending
//!               |-----> Exhausted
//! any non-terminal ---> Cancelled
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nutrilens_core::{AnalysisPayload, ErrorKind, Failure, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Job Id
// ============================================================================

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Job State
// ============================================================================

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to run.
    Pending,
    /// An attempt is in flight.
    Running,
    /// Waiting out a backoff delay before the next attempt.
    Retrying,
    /// Finished with a result.
    Succeeded,
    /// Finished with a failure.
    Exhausted,
    /// Cancelled by the caller.
    Cancelled,
}

impl JobState {
    /// Returns true if no further attempts will run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Exhausted | JobState::Cancelled
        )
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Retrying => "retrying",
            JobState::Succeeded => "succeeded",
            JobState::Exhausted => "exhausted",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Attempt Record
// ============================================================================

/// What happened on one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When its outcome was recorded (`None` while in flight).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure kind, or `None` for a success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// HTTP status, when a response was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Backoff delay scheduled after this attempt, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl AttemptRecord {
    /// Returns true once the outcome has been recorded.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

// ============================================================================
// Analysis Job
// ============================================================================

/// A durable unit of analysis work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Job id.
    pub id: JobId,
    /// What to analyze.
    pub payload: AnalysisPayload,
    /// Current state.
    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
    /// Earliest time the next attempt may start.
    pub next_eligible_at: DateTime<Utc>,
    /// Most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<Failure>,
    /// Parsed response body of the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Whether the terminal outcome has been handed to a caller.
    #[serde(default)]
    pub delivered: bool,
    /// Per-attempt history.
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// Creates a pending job that is eligible immediately.
    pub fn new(payload: AnalysisPayload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            payload,
            state: JobState::Pending,
            attempts: 0,
            next_eligible_at: now,
            last_failure: None,
            result: None,
            delivered: false,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if no further attempts will run.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Time left until the job may run, zero if it is already eligible.
    pub fn wait_until_eligible(&self, now: DateTime<Utc>) -> Duration {
        (self.next_eligible_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Moves the job to `Running` and opens a new attempt record.
    ///
    /// Returns the attempt number.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> u32 {
        self.attempts += 1;
        self.state = JobState::Running;
        self.history.push(AttemptRecord {
            attempt: self.attempts,
            started_at: now,
            finished_at: None,
            error: None,
            status: None,
            retry_delay_ms: None,
        });
        self.updated_at = now;
        self.attempts
    }

    /// Records a successful attempt.
    pub fn record_success(&mut self, value: Value, now: DateTime<Utc>) {
        self.close_attempt(now, None, None, None);
        self.state = JobState::Succeeded;
        self.result = Some(value);
        self.last_failure = None;
        self.updated_at = now;
    }

    /// Records a failed attempt.
    ///
    /// With `retry_after` the job waits in `Retrying`; without it the job is
    /// exhausted and the failure becomes final.
    pub fn record_failure(
        &mut self,
        failure: Failure,
        retry_after: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        let delay_ms = retry_after.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self.close_attempt(now, Some(failure.kind()), failure.status(), delay_ms);

        match retry_after {
            Some(delay) => {
                self.state = JobState::Retrying;
                self.next_eligible_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|delay| now.checked_add_signed(delay))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.last_failure = Some(failure);
            }
            None => {
                self.state = JobState::Exhausted;
                self.last_failure = Some(failure.with_attempts(self.attempts));
            }
        }
        self.updated_at = now;
    }

    /// Cancels the job, closing any in-flight attempt.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.close_attempt(now, Some(ErrorKind::Cancelled), None, None);
        self.state = JobState::Cancelled;
        self.updated_at = now;
    }

    /// Marks the terminal outcome as handed over.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) {
        self.delivered = true;
        self.updated_at = now;
    }

    /// The terminal outcome, or `None` if the job is still active.
    pub fn outcome(&self) -> Option<Outcome<Value>> {
        match self.state {
            JobState::Succeeded => Some(Outcome::success(
                self.result.clone().unwrap_or(Value::Null),
            )),
            JobState::Exhausted => Some(Outcome::failure(self.last_failure.clone().unwrap_or_else(
                || {
                    Failure::new(ErrorKind::Storage, "job exhausted without a recorded failure")
                        .with_attempts(self.attempts)
                },
            ))),
            JobState::Cancelled => Some(Outcome::failure(
                Failure::cancelled().with_attempts(self.attempts),
            )),
            JobState::Pending | JobState::Running | JobState::Retrying => None,
        }
    }

    fn close_attempt(
        &mut self,
        now: DateTime<Utc>,
        error: Option<ErrorKind>,
        status: Option<u16>,
        retry_delay_ms: Option<u64>,
    ) {
        if let Some(record) = self.history.last_mut().filter(|r| !r.is_finished()) {
            record.finished_at = Some(now);
            record.error = error;
            record.status = status;
            record.retry_delay_ms = retry_delay_ms;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
