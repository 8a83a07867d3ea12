// Required external crates for configuration management and serialization
use serde::Deserialize;
use std::path::PathBuf;
use config::{Config, ConfigError, Environment, File};

/// Configuration for the model artifacts
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Directory containing config.json, model.safetensors, vocab.json
    /// and merges.txt
    pub directory: PathBuf,
    /// Maximum token sequence length; longer inputs are truncated
    pub max_sequence_length: usize,
}

/// Configuration for the HTTP server
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
    /// Origins permitted to make cross-origin requests
    pub allowed_origins: Vec<String>,
}

/// Configuration for application logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Optional log file directory
    pub file: Option<PathBuf>,
}

/// Main settings struct that contains all configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Model-related settings
    pub model: ModelConfig,
    /// Server-related settings
    pub server: ServerConfig,
    /// Logging-related settings
    pub logging: LoggingConfig,
}

/// Implementation for loading and parsing configuration
impl Settings {
    /// Creates a new Settings instance by loading config from multiple sources
    /// in the following order of precedence (highest to lowest):
    /// 1. Environment variables prefixed with NEWSVET_
    /// 2. Local config file (local.toml) if present
    /// 3. Default config file (default.toml)
    pub fn new() -> Result<Self, ConfigError> {
        // Check if current directory exists
        let config_dir = std::env::current_dir()
            .map_err(|e| ConfigError::Message(
                format!("Failed to get current directory: {}", e)
            ))?
            .join("config");

        // Check if config directory exists
        if !config_dir.exists() {
            return Err(ConfigError::Message(
                format!("Config directory not found at: {}", config_dir.display())
            ));
        }

        // Check if default.toml exists
        let default_config = config_dir.join("default.toml");
        if !default_config.exists() {
            return Err(ConfigError::Message(
                format!("Default configuration file not found at: {}", default_config.display())
            ));
        }

        // Create the local config path
        let local_config = config_dir.join("local.toml");

        // Convert paths to strings and keep them alive
        let default_config_path = default_config.to_string_lossy();
        let local_config_path = local_config.to_string_lossy();

        // Load and validate configuration
        let settings = Config::builder()
            .add_source(File::with_name(&default_config_path))
            .add_source(File::with_name(&local_config_path).required(false))
            .add_source(Environment::with_prefix("NEWSVET").separator("_"))
            .build()?
            .try_deserialize::<Settings>()?;

        // Validate settings after loading
        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The model directory must already exist: without artifacts the
        // service cannot run, and silently creating an empty directory
        // would only defer the failure
        if !self.model.directory.exists() {
            return Err(ConfigError::Message(format!(
                "Model directory not found at: {}",
                self.model.directory.display()
            )));
        }

        // Validate max_sequence_length; two slots are reserved for the
        // sequence delimiter tokens
        if self.model.max_sequence_length < 3 {
            return Err(ConfigError::Message(
                "max_sequence_length must be at least 3".to_string()
            ));
        }

        // Validate server port range
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Port must be between 1 and 65535, got: 0".to_string()
            ));
        }

        // Validate CORS origins
        if self.server.allowed_origins.is_empty() {
            return Err(ConfigError::Message(
                "allowed_origins must not be empty".to_string()
            ));
        }
        for origin in &self.server.allowed_origins {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(ConfigError::Message(format!(
                    "Invalid origin '{}': origins must start with http:// or https://",
                    origin
                )));
            }
        }

        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ConfigError::Message(
                format!("Invalid logging level: {}. Must be one of: error, warn, info, debug, trace",
                    self.logging.level)
            )),
        }?;

        // Create log file directory if configured and doesn't exist
        if let Some(log_file) = &self.logging.file {
            if !log_file.exists() {
                std::fs::create_dir_all(log_file).map_err(|e| {
                    ConfigError::Message(format!(
                        "Failed to create log directory at {}: {}",
                        log_file.display(), e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings(model_dir: PathBuf) -> Settings {
        Settings {
            model: ModelConfig {
                directory: model_dir,
                max_sequence_length: 512,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                allowed_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:3001".to_string(),
                ],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
            },
        }
    }

    #[test]
    fn test_valid_settings_pass() {
        let dir = tempfile::tempdir().unwrap();
        let settings = valid_settings(dir.path().to_path_buf());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_model_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = valid_settings(dir.path().join("does-not-exist"));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_tiny_sequence_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path().to_path_buf());
        settings.model.max_sequence_length = 2;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_origins_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path().to_path_buf());
        settings.server.allowed_origins.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_malformed_origin_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path().to_path_buf());
        settings.server.allowed_origins = vec!["localhost:3000".to_string()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path().to_path_buf());
        settings.logging.level = "verbose".to_string();
        assert!(settings.validate().is_err());
    }
}
