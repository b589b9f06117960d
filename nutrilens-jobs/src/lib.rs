// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # NutriLens Jobs
//!
//! Durable, retrying execution of analysis requests.
//!
//! - [`job::AnalysisJob`] - The persisted record and its state machine
//! - [`store::JobStore`] - Where records and their leases live ([`store::FileJobStore`] on disk)
//! - [`queue::JobQueue`] - Worker pool, backoff, cancellation, restart recovery
//!
//! Transient failures (`ServerError`, `NetworkError`) are retried inside the
//! queue and never reach the caller until the attempt budget is spent. Every
//! other failure ends the job on the spot.
//!
//! ## Example
//!
//! ```ignore
//! let queue = JobQueue::new(store, pipeline, factory, QueueConfig::default())?;
//! queue.recover().await?;
//!
//! let handle = queue.enqueue(AnalysisPayload::from_description("grilled chicken, 200g")).await?;
//! match handle.outcome().await {
//!     Outcome::Success(body) => println!("{body}"),
//!     Outcome::Error(failure) => eprintln!("{}", failure.user_message()),
//! }
//! ```

pub mod error;
pub mod job;
pub mod queue;
pub mod store;

pub use error::JobError;
pub use job::{AnalysisJob, AttemptRecord, JobId, JobState};
pub use queue::{DEFAULT_LEASE_TTL, JobHandle, JobQueue, QueueConfig, RequestFactory};
pub use store::{FileJobStore, JobStore, MemoryJobStore, OwnerId};
