//! ScoreApp CLI Configuration Management
//!
//! Configuration is read from a TOML file, then command line overrides are
//! applied on top, then the result is validated. Every section has defaults
//! that target a backend running on `localhost:4110`, so an empty file (or no
//! file at all) is a valid configuration.
//!
//! ```toml
//! [live]
//! url = "ws://localhost:4110/ws"
//! retry = { kind = "linear", max_retries = 10, delay_ms = 1000 }
//!
//! [api]
//! rest_url = "http://localhost:4110"
//!
//! [timing]
//! negative_diff = "retain"
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::Level;
use url::Url;

use scoreapp_core::{LiveConfig, TimingConfig};

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// Default base URL of the snapshot/control API
pub const DEFAULT_REST_URL: &str = "http://localhost:4110";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the ScoreApp CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub live: LiveConfig,
    pub api: ApiConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

/// Snapshot/control API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL without a trailing slash
    pub rest_url: String,
    /// Bearer token sent with control requests
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rest_url: DEFAULT_REST_URL.to_string(),
            auth_token: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when neither `--verbose` nor `RUST_LOG` is given
    pub level: String,
    /// Include the module target in log lines
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<Level> {
        Level::from_str(&self.level)
            .map_err(|_| CliError::Config(format!("Unknown log level: {}", self.level)))
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides and normalize user-provided values
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(url) = &cli.url {
            self.live.url = Some(url.clone());
        }
        if let Some(api_url) = &cli.api_url {
            self.api.rest_url = api_url.clone();
        }
        if let Some(token) = &cli.token {
            self.api.auth_token = Some(token.clone());
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        while self.api.rest_url.ends_with('/') {
            self.api.rest_url.pop();
        }
        if self.api.auth_token.as_deref() == Some("") {
            self.api.auth_token = None;
        }
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.live.validate()?;

        let rest = Url::parse(&self.api.rest_url).map_err(|e| {
            CliError::Config(format!("Invalid API URL {}: {}", self.api.rest_url, e))
        })?;
        if !matches!(rest.scheme(), "http" | "https") {
            return Err(CliError::Config(format!(
                "API URL must use http or https: {}",
                self.api.rest_url
            )));
        }

        if self.api.request_timeout_ms == 0 {
            return Err(CliError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        self.logging.max_level()?;
        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&AppConfig::default())
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
