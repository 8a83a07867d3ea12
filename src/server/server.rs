use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use axum::{middleware, Router, routing::{get, post}};
use tracing::info;

use crate::inference::NewsClassifier;
use super::cors::{cors_middleware, CorsState};
use super::routes;

/// API server exposing the classification endpoints
pub struct ApiServer {
    classifier: Arc<dyn NewsClassifier>,
    host: String,
    port: u16,
    allowed_origins: Vec<String>,
}

impl ApiServer {
    pub fn new(
        classifier: Arc<dyn NewsClassifier>,
        host: String,
        port: u16,
        allowed_origins: Vec<String>,
    ) -> Self {
        info!("Creating new API server on {}:{}", host, port);
        Self {
            classifier,
            host,
            port,
            allowed_origins,
        }
    }

    /// Builds the router with all routes and the CORS layer. Exposed so
    /// tests can serve the exact production router on a listener of their
    /// choosing.
    pub fn router(&self) -> Router {
        let cors_state = Arc::new(CorsState {
            allowed_origins: self.allowed_origins.clone(),
        });

        Router::new()
            .route("/", get(routes::root))
            .route("/predict", post(routes::predict))
            .layer(middleware::from_fn_with_state(cors_state, cors_middleware))
            .with_state(Arc::clone(&self.classifier))
    }

    pub async fn start(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app = self.router();

        info!("Starting server on {}:{}", self.host, self.port);
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;

        info!("Server started successfully");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
