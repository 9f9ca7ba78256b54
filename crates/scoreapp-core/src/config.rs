//! Configuration for the live connection and the timing engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{CoreError, Result};
use crate::retry::RetryConfig;
use crate::timing::LapStatsOptions;

/// Default endpoint of the race backend's live feed
pub const DEFAULT_LIVE_URL: &str = "ws://localhost:4110/ws";

/// Live connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Websocket endpoint; no URL keeps the client in the `NoUrl` state
    pub url: Option<String>,
    /// Connect as soon as the client is created
    pub auto_connect: bool,
    pub retry: RetryConfig,
    /// Close connections that stay silent (not even pings) for this long
    pub idle_timeout_ms: Option<u64>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: Some(DEFAULT_LIVE_URL.to_string()),
            auto_connect: true,
            retry: RetryConfig::default(),
            idle_timeout_ms: Some(75_000),
        }
    }
}

impl LiveConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.url {
            validate_live_url(url)?;
        }
        Ok(())
    }
}

/// Timing engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(flatten)]
    pub lap_stats: LapStatsOptions,
}

/// Parse a live feed URL, accepting only websocket schemes
pub fn validate_live_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| CoreError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(CoreError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}', expected ws or wss", other),
        }),
    }
}
