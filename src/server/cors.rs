use std::sync::Arc;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// The cross-origin policy: an explicit allowlist of origins. Allowed
/// origins may use any method and any headers, with credentials.
#[derive(Clone)]
pub struct CorsState {
    pub allowed_origins: Vec<String>,
}

/// Middleware enforcing the cross-origin policy.
///
/// Requests from origins on the allowlist get the CORS response headers;
/// their preflight OPTIONS requests are answered directly with 204.
/// Requests from other origins pass through untouched, which leaves the
/// browser to block them.
pub async fn cors_middleware(
    State(cors): State<Arc<CorsState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let allowed = match &origin {
        Some(origin) => cors.allowed_origins.iter().any(|allowed| allowed == origin),
        None => false,
    };

    if allowed && request.method() == Method::OPTIONS {
        // Preflight: answer here instead of routing
        let requested_headers = request.headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned();

        let mut response = StatusCode::NO_CONTENT.into_response();
        if let Some(origin) = &origin {
            apply_cors_headers(response.headers_mut(), origin, requested_headers);
        }
        return response;
    }

    let mut response = next.run(request).await;

    if allowed {
        if let Some(origin) = &origin {
            apply_cors_headers(response.headers_mut(), origin, None);
        }
    }

    response
}

/// Writes the CORS response headers for an allowed origin
fn apply_cors_headers(headers: &mut HeaderMap, origin: &str, requested_headers: Option<HeaderValue>) {
    if let Ok(origin_value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value);
    }
    headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));
    // Echo the requested headers on preflight so credentialed requests work
    // with a wildcard-free value
    let allow_headers = requested_headers.unwrap_or_else(|| HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    // Responses differ per origin, so caches must key on it
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}
