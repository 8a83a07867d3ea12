use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use newsvet::config::Settings;
use newsvet::inference::{ClassifierEngine, NewsClassifier};
use newsvet::server::ApiServer;

/// Main entry point for the newsvet service
///
/// Loads settings, initializes logging, loads the classification model and
/// tokenizer, and starts the HTTP server. Any failure before the listener
/// binds aborts startup; the service never runs without a working engine.
///
/// # Errors
/// Returns an error if configuration is invalid, the model artifacts cannot
/// be loaded, or the server fails to bind.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Load settings first
    let settings = Settings::new()?;

    // Initialize the subscriber first, before any file operations
    let file_appender = tracing_appender::rolling::RollingFileAppender::new(
        tracing_appender::rolling::Rotation::DAILY,
        // Use log file path from settings, or default to "logs"
        settings.logging.file.as_deref().unwrap_or_else(|| Path::new("logs")),
        "newsvet",
    );

    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let level = settings.logging.level.parse().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        // Disable ANSI colors for cleaner log files
        .with_ansi(false)
        .with_line_number(true)
        .with_file(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(false)
        .with_max_level(level)
        .init();

    info!("newsvet starting up...");

    let log_path = settings.logging.file.as_deref().unwrap_or_else(|| Path::new("logs"));
    std::fs::create_dir_all(log_path)?;
    let full_log_path = std::fs::canonicalize(log_path)?;
    info!("Log directory: {}", full_log_path.display());

    // Model directory location
    let model_path = std::fs::canonicalize(&settings.model.directory)?;
    info!("Model directory: {}", model_path.display());

    info!("Settings loaded");

    // Load the engine before binding the listener; a broken model must
    // never reach the point of serving requests
    let engine = ClassifierEngine::load(&model_path, settings.model.max_sequence_length)?;
    info!("Engine loaded at {} on device {}", engine.loaded_at(), engine.device());

    let classifier: Arc<dyn NewsClassifier> = Arc::new(engine);

    // Create and start server in the foreground
    let server = ApiServer::new(
        classifier,
        settings.server.host.clone(),
        settings.server.port,
        settings.server.allowed_origins.clone(),
    );
    server.start().await?;

    Ok(())
}
