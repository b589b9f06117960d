//! Analysis use cases wired from settings, against a local HTTP server.

use std::sync::Arc;
use std::time::Duration;

use nutrilens_analysis::{AnalysisService, encode_photo};
use nutrilens_core::{AnalysisPayload, ErrorKind, NutritionEstimate, Outcome};
use nutrilens_store::{CredentialStore, RetrySettings, Settings};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANALYZE_PATH: &str = "/v1/meals/analyze";

struct Harness {
    service: AnalysisService,
    _dir: TempDir,
}

async fn harness(server: &MockServer, key: Option<&str>) -> Harness {
    let dir = TempDir::new().unwrap();
    let settings = Settings {
        endpoint: format!("{}{ANALYZE_PATH}", server.uri()),
        timeout_secs: 5,
        data_dir: Some(dir.path().to_path_buf()),
        retry: RetrySettings {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 200,
            ..RetrySettings::default()
        },
        ..Settings::default()
    };

    let credentials = Arc::new(CredentialStore::in_memory());
    if let Some(key) = key {
        credentials.set(key).unwrap();
    }

    let service = AnalysisService::open(&settings, credentials).await.unwrap();
    Harness { service, _dir: dir }
}

fn chicken() -> AnalysisPayload {
    AnalysisPayload::from_description("grilled chicken, 200g")
}

#[tokio::test]
async fn test_unset_credential_fails_without_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"calories": 450})))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, None).await;
    let outcome = h.service.analyze_meal().analyze(chicken()).await;

    assert_eq!(outcome.kind(), Some(ErrorKind::CredentialMissing));
    assert!(outcome.failure_ref().unwrap().user_message().contains("API key"));
}

#[tokio::test]
async fn test_analyze_returns_estimate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ANALYZE_PATH))
        .and(header("api-key", "abc123"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({"description": "grilled chicken, 200g"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calories": 450,
            "protein_g": 62,
            "items": [{"name": "chicken breast", "grams": 200}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, Some("abc123")).await;
    let estimate = h
        .service
        .analyze_meal()
        .analyze(chicken())
        .await
        .into_result()
        .unwrap();

    assert!((estimate.calories - 450.0).abs() < f64::EPSILON);
    assert_eq!(estimate.protein_g, Some(62.0));
    assert_eq!(estimate.items[0].grams, Some(200.0));
}

#[tokio::test]
async fn test_transient_failure_is_retried_transparently() {
    let server = MockServer::start().await;
    Mock::given(path(ANALYZE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path(ANALYZE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"calories": 450})))
        .mount(&server)
        .await;

    let h = harness(&server, Some("abc123")).await;
    let outcome = h.service.analyze_meal().analyze(chicken()).await;

    assert_eq!(outcome, Outcome::success(NutritionEstimate::with_calories(450.0)));
}

#[tokio::test]
async fn test_exhausted_server_error_keeps_kind() {
    let server = MockServer::start().await;
    Mock::given(path(ANALYZE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server, Some("abc123")).await;
    let failure = h
        .service
        .analyze_meal()
        .analyze(chicken())
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::ServerError);
    assert_eq!(failure.status(), Some(500));
    assert_eq!(failure.attempts(), Some(3));
    assert!(failure.message().starts_with("analysis "), "{}", failure.message());
}

#[tokio::test]
async fn test_rejected_request_is_client_error() {
    let server = MockServer::start().await;
    Mock::given(path(ANALYZE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, Some("wrong")).await;
    let outcome = h.service.analyze_meal().analyze(chicken()).await;

    assert_eq!(outcome.kind(), Some(ErrorKind::ClientError));
}

#[tokio::test]
async fn test_unparsable_estimate_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(path(ANALYZE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, Some("abc123")).await;
    let outcome = h.service.analyze_meal().analyze(chicken()).await;

    assert_eq!(outcome.kind(), Some(ErrorKind::InvalidResponse));

    // The stored record agrees with what the caller saw.
    let jobs = h.service.queue().jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, nutrilens_jobs::JobState::Exhausted);
    assert!(jobs[0].result.is_none());
    assert_eq!(
        jobs[0].last_failure.as_ref().map(|f| f.kind()),
        Some(ErrorKind::InvalidResponse)
    );
}

#[tokio::test]
async fn test_photo_is_sent_inline() {
    let server = MockServer::start().await;
    Mock::given(path(ANALYZE_PATH))
        .and(body_partial_json(json!({
            "image": {"mime_type": "image/jpeg", "data": "YWJj"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"calories": 610})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, Some("abc123")).await;
    let payload = AnalysisPayload::from_description("").with_photo(encode_photo("image/jpeg", b"abc"));
    let outcome = h.service.analyze_meal().analyze(payload).await;

    assert!(outcome.is_success(), "{outcome:?}");
}

#[tokio::test]
async fn test_blank_payload_is_validation() {
    let server = MockServer::start().await;
    let h = harness(&server, Some("abc123")).await;

    let outcome = h
        .service
        .analyze_meal()
        .analyze(AnalysisPayload::from_description("  "))
        .await;

    assert_eq!(outcome.kind(), Some(ErrorKind::Validation));
    assert!(h.service.queue().jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_then_poll_estimate() {
    let server = MockServer::start().await;
    Mock::given(path(ANALYZE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"calories": 450}))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let h = harness(&server, Some("abc123")).await;
    let analyze = h.service.analyze_meal();
    let id = analyze.submit(chicken()).await.into_result().unwrap();

    let mut estimate = None;
    for _ in 0..200 {
        if let Some(found) = analyze.estimate(id).await.into_result().unwrap() {
            estimate = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(estimate, Some(NutritionEstimate::with_calories(450.0)));
    assert!(!analyze.cancel(id).await.into_result().unwrap());
}

#[tokio::test]
async fn test_poll_unknown_job() {
    let server = MockServer::start().await;
    let h = harness(&server, Some("abc123")).await;

    let outcome = h
        .service
        .analyze_meal()
        .estimate(nutrilens_jobs::JobId::new())
        .await;

    assert_eq!(outcome.kind(), Some(ErrorKind::Validation));
}
