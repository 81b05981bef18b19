//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub cors_origin: String,
    pub openai_api_key: String,
    pub extraction_model: String,
    pub google_vision_api_key: String,
    pub max_images: usize,
    pub max_upload_bytes: usize,
    pub external_timeout: Duration,
    pub discount_lock_on_zero: bool,
    pub max_write_attempts: usize,
}

/// Reads a variable that must be set to a non-blank value.
fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

/// Reads an optional variable and parses it, falling back to `default`.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Upload Settings ---
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Required API Keys ---
        let openai_api_key = required_var("OPENAI_API_KEY")?;
        let google_vision_api_key = required_var("GOOGLE_VISION_API_KEY")?;

        // --- Load Adapter-specific Settings ---
        let extraction_model =
            std::env::var("EXTRACTION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let external_timeout = Duration::from_secs(parse_var("EXTERNAL_TIMEOUT_SECS", 30u64)?);

        // --- Load Workflow Policy ---
        let max_images = parse_var("MAX_IMAGES", 7usize)?;
        if max_images == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_IMAGES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize)?;
        let discount_lock_on_zero = parse_var("DISCOUNT_LOCK_ON_ZERO", false)?;
        let max_write_attempts = parse_var("MAX_WRITE_ATTEMPTS", 10usize)?;
        if max_write_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_WRITE_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            upload_dir,
            public_base_url,
            cors_origin,
            openai_api_key,
            extraction_model,
            google_vision_api_key,
            max_images,
            max_upload_bytes,
            external_timeout,
            discount_lock_on_zero,
            max_write_attempts,
        })
    }
}
