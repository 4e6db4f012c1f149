//! Error types for medquery

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using medquery's Error
pub type Result<T> = std::result::Result<T, Error>;

/// medquery error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
