use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::inference::NewsClassifier;
use super::types::{ErrorResponse, PredictRequest, StatusResponse};

/// Returns a static status message confirming the service is running
pub async fn root() -> impl IntoResponse {
    Json(StatusResponse {
        message: "Fake News Detection API is running.".to_string(),
    })
}

/// Classifies the submitted text and returns the predicted label with its
/// confidence.
///
/// Malformed bodies never reach this handler; the Json extractor rejects
/// them with a client error first. Classification failures are logged with
/// full detail and answered with a generic 500 body.
pub async fn predict(
    State(classifier): State<Arc<dyn NewsClassifier>>,
    Json(request): Json<PredictRequest>,
) -> impl IntoResponse {
    info!("Predict endpoint called with {} characters of text", request.text.len());

    // The forward pass is CPU-bound, so run it off the async workers
    let result = tokio::task::spawn_blocking(move || classifier.classify(&request.text)).await;

    match result {
        Ok(Ok(prediction)) => {
            info!("Prediction: {} (confidence {:.4})",
                  prediction.prediction, prediction.confidence);
            (StatusCode::OK, Json(prediction)).into_response()
        }
        Ok(Err(e)) => {
            error!("Classification failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
        }
        Err(e) => {
            error!("Classification task did not complete: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
        }
    }
}
