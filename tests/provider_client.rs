//! Tests for the push provider client against a mock HTTP server.

use pushgate::models::campaign::CampaignKind;
use pushgate::provider::{PushClient, PushPayload};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload() -> PushPayload {
    PushPayload {
        title: "Scheduled maintenance".to_string(),
        message: "The app will be offline tonight".to_string(),
        kind: CampaignKind::System,
        image_url: None,
        deep_link: Some("app://status".to_string()),
    }
}

#[tokio::test]
async fn test_send_batch_posts_payload_with_api_key() {
    let server = MockServer::start().await;
    let campaign_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(json!({
            "campaign_id": campaign_id,
            "recipients": ["tok-1", "tok-2"],
            "notification": {
                "title": "Scheduled maintenance",
                "kind": "system",
                "deep_link": "app://status",
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "delivered": 2 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PushClient::new(format!("{}/v1/send", server.uri()), "test-key".to_string());
    let tokens = vec!["tok-1".to_string(), "tok-2".to_string()];

    let receipt = client
        .send_batch(campaign_id, &tokens, &payload())
        .await
        .unwrap();

    assert_eq!(receipt.delivered, Some(2));
    assert!(receipt.failed_tokens.is_none());
}

#[tokio::test]
async fn test_send_batch_parses_failed_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "delivered": 1,
            "failed_tokens": ["tok-2"],
        })))
        .mount(&server)
        .await;

    let client = PushClient::new(format!("{}/v1/send", server.uri()), "key".to_string());
    let tokens = vec!["tok-1".to_string(), "tok-2".to_string()];

    let receipt = client
        .send_batch(Uuid::new_v4(), &tokens, &payload())
        .await
        .unwrap();

    assert_eq!(receipt.delivered, Some(1));
    assert_eq!(receipt.failed_tokens.unwrap(), vec!["tok-2"]);
}

#[tokio::test]
async fn test_send_batch_empty_receipt_means_no_counts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = PushClient::new(format!("{}/v1/send", server.uri()), "key".to_string());
    let receipt = client
        .send_batch(Uuid::new_v4(), &["tok".to_string()], &payload())
        .await
        .unwrap();

    assert!(receipt.delivered.is_none());
    assert!(receipt.failed_tokens.is_none());
}

#[tokio::test]
async fn test_send_batch_non_2xx_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(503).set_body_string("provider melting"))
        .mount(&server)
        .await;

    let client = PushClient::new(format!("{}/v1/send", server.uri()), "key".to_string());
    let err = client
        .send_batch(Uuid::new_v4(), &["tok".to_string()], &payload())
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("503"), "unexpected error: {}", msg);
    assert!(msg.contains("provider melting"), "unexpected error: {}", msg);
}

#[tokio::test]
async fn test_send_batch_connection_refused_is_error() {
    // Nothing listens here; the client must surface a transport error rather
    // than hang or panic.
    let client = PushClient::new("http://127.0.0.1:9/v1/send".to_string(), "key".to_string());
    let result = client
        .send_batch(Uuid::new_v4(), &["tok".to_string()], &payload())
        .await;

    assert!(result.is_err());
}
