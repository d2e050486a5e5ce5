//! Mock HTTP tests for HttpAnalysisClient and the requester on top of it.
//!
//! These tests cover:
//! - Client creation and configuration
//! - Request formatting (auth header, JSON body without data-URL header)
//! - Error handling (rate limits, server errors, malformed responses)
//! - Placeholder substitution for empty descriptions

use std::sync::Arc;
use std::time::Duration;

use glasscam::analysis::data_url::decode_payload;
use glasscam::analysis::{
    AnalysisRequest, UnconfiguredClient, API_KEY_ENV, DEFAULT_BASE_URL,
    EMPTY_DESCRIPTION_PLACEHOLDER,
};
use glasscam::{
    AnalysisClient, AnalysisFailure, AnalysisOutcome, AnalysisRequester, ClientError,
    HttpAnalysisClient, SourceId, StillFrame,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "vision/describe";

fn client(server: &MockServer) -> HttpAnalysisClient {
    HttpAnalysisClient::with_base_url("test-api-key".to_string(), server.uri())
        .unwrap()
        .model(MODEL_PATH)
}

fn request() -> AnalysisRequest {
    AnalysisRequest {
        image: "AAEC".to_string(),
        mime_type: "image/jpeg".to_string(),
        instruction: "What is this?".to_string(),
    }
}

fn still() -> StillFrame {
    let pixels: Vec<u8> = (0..32 * 24 * 3).map(|i| (i % 251) as u8).collect();
    StillFrame::from_rgb(SourceId::from("glasses"), 32, 24, pixels).unwrap()
}

// === Client Creation Tests ===

#[test]
fn test_new_reads_from_env() {
    let original = std::env::var(API_KEY_ENV).ok();

    std::env::set_var(API_KEY_ENV, "test-key-from-env");
    let client = HttpAnalysisClient::new().unwrap();
    assert_eq!(client.base_url(), DEFAULT_BASE_URL);

    std::env::remove_var(API_KEY_ENV);
    assert!(matches!(
        HttpAnalysisClient::new(),
        Err(ClientError::MissingApiKey)
    ));

    if let Some(val) = original {
        std::env::set_var(API_KEY_ENV, val);
    }
}

#[tokio::test]
async fn test_unconfigured_client_reports_missing_key() {
    let err = UnconfiguredClient.describe(&request()).await.unwrap_err();
    assert!(matches!(err, ClientError::MissingApiKey));

    let requester = AnalysisRequester::new(Arc::new(UnconfiguredClient));
    match requester.analyze(still(), "Describe").await {
        AnalysisOutcome::Failure(AnalysisFailure::Collaborator(message)) => {
            assert!(message.contains(API_KEY_ENV));
        }
        other => panic!("Expected collaborator failure, got {:?}", other),
    }
}

#[test]
fn test_rate_limit_error_display() {
    let error = ClientError::RateLimit {
        message: "Too many requests".to_string(),
        retry_after_secs: Some(30),
    };
    assert_eq!(error.to_string(), "Rate limited: Too many requests");
}

// === Mock HTTP Tests ===

#[tokio::test]
async fn test_describe_returns_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/vision/describe"))
        .and(header("Authorization", "Key test-api-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"text": "A red bicycle."})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let text = client(&mock_server).describe(&request()).await.unwrap();
    assert_eq!(text, "A red bicycle.");
}

#[tokio::test]
async fn test_describe_sends_request_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/vision/describe"))
        .and(body_json(serde_json::json!({
            "image": "AAEC",
            "mime_type": "image/jpeg",
            "instruction": "What is this?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "ok"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    assert!(client(&mock_server).describe(&request()).await.is_ok());
}

#[tokio::test]
async fn test_describe_missing_text_is_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&mock_server)
        .await;

    let text = client(&mock_server).describe(&request()).await.unwrap();
    assert_eq!(text, "");
}

#[tokio::test]
async fn test_describe_rate_limited_with_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "30")
                .set_body_string("Too many requests"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).describe(&request()).await.unwrap_err();
    match err {
        ClientError::RateLimit {
            message,
            retry_after_secs,
        } => {
            assert_eq!(message, "Too many requests");
            assert_eq!(retry_after_secs, Some(30));
        }
        other => panic!("Expected RateLimit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_describe_rate_limited_without_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).describe(&request()).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::RateLimit {
            retry_after_secs: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_describe_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).describe(&request()).await.unwrap_err();
    match err {
        ClientError::ApiError(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("model crashed"));
        }
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_describe_malformed_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).describe(&request()).await.unwrap_err();
    assert!(matches!(err, ClientError::HttpError(_)));
}

// === Requester over HTTP ===

#[tokio::test]
async fn test_empty_description_yields_placeholder() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/vision/describe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": ""})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let requester = AnalysisRequester::new(Arc::new(client(&mock_server)));
    let outcome = requester.analyze(still(), "Describe the scene").await;

    assert_eq!(
        outcome,
        AnalysisOutcome::Text(EMPTY_DESCRIPTION_PLACEHOLDER.to_string())
    );
}

#[tokio::test]
async fn test_transmitted_image_has_no_data_url_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "Pixels."})),
        )
        .mount(&mock_server)
        .await;

    let requester = AnalysisRequester::new(Arc::new(client(&mock_server)));
    let frame = still();
    let expected_jpeg = frame.encode_jpeg(85).unwrap();
    let outcome = requester.analyze(frame, "Describe the scene").await;
    assert_eq!(outcome, AnalysisOutcome::Text("Pixels.".to_string()));

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let image = body["image"].as_str().unwrap();
    assert!(!image.starts_with("data:"));
    assert!(!image.contains("base64,"));
    assert_eq!(body["mime_type"], "image/jpeg");
    assert_eq!(body["instruction"], "Describe the scene");
    assert_eq!(decode_payload(image).unwrap(), expected_jpeg);
}

#[tokio::test]
async fn test_server_error_becomes_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&mock_server)
        .await;

    let requester = AnalysisRequester::new(Arc::new(client(&mock_server)));
    match requester.analyze(still(), "Describe").await {
        AnalysisOutcome::Failure(AnalysisFailure::Collaborator(message)) => {
            assert!(message.contains("overloaded"));
        }
        other => panic!("Expected collaborator failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"text": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let requester = AnalysisRequester::new(Arc::new(client(&mock_server)))
        .with_timeout(Duration::from_millis(100));
    let outcome = requester.analyze(still(), "Describe").await;

    assert_eq!(
        outcome,
        AnalysisOutcome::Failure(AnalysisFailure::Timeout(Duration::from_millis(100)))
    );
}
