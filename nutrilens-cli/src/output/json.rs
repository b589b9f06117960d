//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use nutrilens_analysis::parse_estimate;
use nutrilens_core::{Failure, NutritionEstimate, Outcome};
use nutrilens_jobs::{AnalysisJob, JobId, JobState};
use serde::{Serialize, Serializer};
use serde_json::Value;

// ============================================================================
// Output Types
// ============================================================================

/// Credential status. Never carries the secret itself.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatusOutput {
    pub configured: bool,
    pub backend: String,
}

/// A failure as shown to scripts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureOutput {
    pub kind: String,
    pub message: String,
    pub user_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<&Failure> for FailureOutput {
    fn from(failure: &Failure) -> Self {
        Self {
            kind: failure.kind().to_string(),
            message: failure.message().to_string(),
            user_message: failure.user_message().to_string(),
            status: failure.status(),
        }
    }
}

/// One analysis job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub id: String,
    pub state: String,
    pub description: String,
    pub has_photo: bool,
    pub attempts: u32,
    pub delivered: bool,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_datetime_opt")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureOutput>,
}

impl From<&AnalysisJob> for JobOutput {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            id: job.id.to_string(),
            state: job.state.to_string(),
            description: job.payload.description.clone(),
            has_photo: job.payload.photo.is_some(),
            attempts: job.attempts,
            delivered: job.delivered,
            created_at: job.created_at,
            updated_at: job.updated_at,
            next_attempt_at: (job.state == JobState::Retrying).then_some(job.next_eligible_at),
            error: job.last_failure.as_ref().map(FailureOutput::from),
        }
    }
}

/// The outcome of a recovered job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredOutput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<NutritionEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureOutput>,
}

impl RecoveredOutput {
    /// Parses a job outcome into an estimate or an error.
    pub fn new(id: JobId, outcome: Outcome<Value>) -> Self {
        let (estimate, error) = match outcome.and_then(parse_estimate) {
            Outcome::Success(estimate) => (Some(estimate), None),
            Outcome::Error(failure) => (None, Some(FailureOutput::from(&failure))),
        };
        Self {
            id: id.to_string(),
            estimate,
            error,
        }
    }
}

// ============================================================================
// Serialization helpers
// ============================================================================

fn serialize_datetime<S>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&dt.to_rfc3339())
}

fn serialize_datetime_opt<S>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match dt {
        Some(dt) => s.serialize_str(&dt.to_rfc3339()),
        None => s.serialize_none(),
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
