use serde::{Deserialize, Serialize};

/// Request body for classification
#[derive(Deserialize, Serialize, Clone)]
pub struct PredictRequest {
    pub text: String,
}

/// Body of the root status endpoint
#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "Message")]
    pub message: String,
}

/// Generic error body; the message stays deliberately vague because
/// failure detail only goes to the server log
#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn internal() -> Self {
        Self {
            status: "error".to_string(),
            message: "internal server error".to_string(),
        }
    }
}
