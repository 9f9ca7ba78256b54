//! Error handling for the ScoreApp CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("ScoreApp core error: {0}")]
    Core(#[from] scoreapp_core::CoreError),

    #[error("Live feed error: {0}")]
    Live(#[from] scoreapp_live::LiveError),

    #[error("API request failed: {0}")]
    Api(#[from] scoreapp_core::ApiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Race {0} not found")]
    RaceNotFound(scoreapp_core::RaceId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(err.to_string())
    }
}
