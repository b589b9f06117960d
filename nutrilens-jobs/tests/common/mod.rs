//! Shared doubles for queue tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nutrilens_core::{AnalysisPayload, ErrorKind, Failure};
use nutrilens_fetch::{
    AuthenticatedRequest, HttpError, OutboundRequest, RawResponse, RequestAuthenticator,
    RetryStrategy, Transport, TransportPipeline, Url,
};
use nutrilens_jobs::{AnalysisJob, JobId, JobQueue, JobState, JobStore, QueueConfig, RequestFactory};
use nutrilens_store::CredentialStore;
use serde_json::Value;
use tokio::sync::Notify;

pub type Reply = Result<RawResponse, HttpError>;

pub fn ok(body: &str) -> Reply {
    Ok(RawResponse::new(200, body))
}

pub fn status(code: u16) -> Reply {
    Ok(RawResponse::new(code, format!("status {code}")))
}

pub fn network() -> Reply {
    Err(HttpError::Connection("connection reset".to_string()))
}

/// Replays a fixed script, then fails with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
    last_auth: Mutex<Option<String>>,
}

impl ScriptedTransport {
    pub fn with(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    pub fn slow(replies: Vec<Reply>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            latency,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_auth(&self) -> Option<String> {
        self.last_auth.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &AuthenticatedRequest) -> Result<RawResponse, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_auth.lock().unwrap() = request.request().header("api-key").map(String::from);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self.replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(network)
    }
}

/// Blocks every call until released.
#[derive(Default)]
pub struct GatedTransport {
    pub entered: Notify,
    pub release: Notify,
    calls: AtomicUsize,
}

impl GatedTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, _request: &AuthenticatedRequest) -> Result<RawResponse, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(RawResponse::new(200, r#"{"calories":450}"#))
    }
}

/// Posts the payload as-is.
pub struct JsonFactory;

impl RequestFactory for JsonFactory {
    fn build_request(&self, payload: &AnalysisPayload) -> Result<OutboundRequest, Failure> {
        let url = Url::parse("https://api.example.com/v1/analyze").unwrap();
        OutboundRequest::post_json(url, payload)
            .map_err(|e| Failure::from_error(ErrorKind::Validation, e))
    }
}

/// Like [`JsonFactory`], but only accepts bodies carrying `calories`.
pub struct StrictFactory;

impl RequestFactory for StrictFactory {
    fn build_request(&self, payload: &AnalysisPayload) -> Result<OutboundRequest, Failure> {
        JsonFactory.build_request(payload)
    }

    fn check_response(&self, body: &Value) -> Result<(), Failure> {
        if body.get("calories").is_some() {
            Ok(())
        } else {
            Err(Failure::new(ErrorKind::InvalidResponse, "response has no calories"))
        }
    }
}

pub fn credentials(key: Option<&str>) -> Arc<CredentialStore> {
    let store = CredentialStore::in_memory();
    if let Some(key) = key {
        store.set(key).unwrap();
    }
    Arc::new(store)
}

/// Millisecond-scale backoff so tests run quickly.
pub fn fast_retry(max_attempts: u32) -> RetryStrategy {
    RetryStrategy::new(max_attempts)
        .with_base_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_secs(1))
        .with_jitter(0.25)
}

/// Short enough that a stopped process's leases lapse within a test.
pub const LEASE_TTL: Duration = Duration::from_millis(120);

pub fn queue(
    store: Arc<dyn JobStore>,
    credentials: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    retry: RetryStrategy,
    workers: usize,
) -> JobQueue {
    queue_with_factory(store, credentials, transport, Arc::new(JsonFactory), retry, workers)
}

pub fn queue_with_factory(
    store: Arc<dyn JobStore>,
    credentials: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    factory: Arc<dyn RequestFactory>,
    retry: RetryStrategy,
    workers: usize,
) -> JobQueue {
    let pipeline = TransportPipeline::new(RequestAuthenticator::new(credentials), transport);
    JobQueue::new(
        store,
        pipeline,
        factory,
        QueueConfig {
            retry,
            workers,
            lease_ttl: LEASE_TTL,
        },
    )
    .unwrap()
}

pub fn meal() -> AnalysisPayload {
    AnalysisPayload::from_description("grilled chicken, 200g")
}

/// Polls until the job reaches `state`.
pub async fn wait_for_state(queue: &JobQueue, id: JobId, state: JobState) -> AnalysisJob {
    for _ in 0..500 {
        if let Some(job) = queue.status(id).await.unwrap() {
            if job.state == state {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never reached {state}");
}
