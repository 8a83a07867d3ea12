// Declare submodules
mod cors;
mod routes;
mod server;
mod types;

// Re-export for external use
pub use server::ApiServer;
pub use types::{ErrorResponse, PredictRequest, StatusResponse};
