//! End-to-end tests against the production router served on an ephemeral
//! port, with a stub classifier standing in for the model.

use std::error::Error;
use std::sync::Arc;

use newsvet::inference::{NewsClassifier, Prediction};
use newsvet::server::ApiServer;

/// Stub classifier with scripted behavior
struct StubClassifier {
    fail: bool,
}

impl NewsClassifier for StubClassifier {
    fn classify(&self, text: &str) -> Result<Prediction, Box<dyn Error + Send + Sync>> {
        if self.fail {
            return Err("scripted classification failure".into());
        }
        let label = if text.contains("flat") { "fake" } else { "real" };
        Ok(Prediction {
            prediction: label.to_string(),
            confidence: 0.87,
        })
    }
}

const ALLOWED_ORIGIN: &str = "http://localhost:3000";
const OTHER_ALLOWED_ORIGIN: &str = "http://localhost:3001";

/// Serves the production router on an ephemeral port and returns its base URL
async fn spawn_server(classifier: Arc<dyn NewsClassifier>) -> String {
    let server = ApiServer::new(
        classifier,
        "127.0.0.1".to_string(),
        0,
        vec![ALLOWED_ORIGIN.to_string(), OTHER_ALLOWED_ORIGIN.to_string()],
    );
    let router = server.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn spawn_ok_server() -> String {
    spawn_server(Arc::new(StubClassifier { fail: false })).await
}

#[tokio::test]
async fn test_root_returns_exact_status_message() {
    let base = spawn_ok_server().await;

    let response = reqwest::get(&base).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"Message": "Fake News Detection API is running."}));
}

#[tokio::test]
async fn test_predict_round_trip() {
    let base = spawn_ok_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/predict", base))
        .json(&serde_json::json!({"text": "Scientists confirm the earth is flat."}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["prediction"], "fake");
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((confidence - 0.87).abs() < 1e-6);
}

#[tokio::test]
async fn test_predict_missing_text_is_a_client_error() {
    let base = spawn_ok_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/predict", base))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();

    // Schema validation rejects the body before the classifier runs
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_predict_wrong_text_type_is_a_client_error() {
    let base = spawn_ok_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/predict", base))
        .json(&serde_json::json!({"text": 42}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_classifier_failure_maps_to_generic_500() {
    let base = spawn_server(Arc::new(StubClassifier { fail: true })).await;

    let response = reqwest::Client::new()
        .post(format!("{}/predict", base))
        .json(&serde_json::json!({"text": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    // The body carries no failure detail
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"status": "error", "message": "internal server error"}));
}

#[tokio::test]
async fn test_cors_headers_for_allowed_origin() {
    let base = spawn_ok_server().await;

    let response = reqwest::Client::new()
        .get(&base)
        .header("Origin", ALLOWED_ORIGIN)
        .send()
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], ALLOWED_ORIGIN);
    assert_eq!(headers["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn test_no_cors_headers_for_unknown_origin() {
    let base = spawn_ok_server().await;

    let response = reqwest::Client::new()
        .get(&base)
        .header("Origin", "http://evil.example")
        .send()
        .await
        .unwrap();

    // The request still succeeds; the browser blocks it client-side
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_preflight_for_allowed_origin() {
    let base = spawn_ok_server().await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/predict", base))
        .header("Origin", OTHER_ALLOWED_ORIGIN)
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], OTHER_ALLOWED_ORIGIN);
    assert_eq!(headers["access-control-allow-methods"], "*");
    assert_eq!(headers["access-control-allow-headers"], "content-type");
    assert_eq!(headers["access-control-allow-credentials"], "true");
}
