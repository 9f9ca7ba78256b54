//! Connection state snapshot types

use core::fmt;

use serde::{Deserialize, Serialize};

/// Name of a connection state, without its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStateName {
    NoUrl,
    NotConnected,
    Connecting,
    Connected,
    MaxRetriesReached,
}

impl fmt::Display for ConnectionStateName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ConnectionStateName::NoUrl => "no_url",
            ConnectionStateName::NotConnected => "not_connected",
            ConnectionStateName::Connecting => "connecting",
            ConnectionStateName::Connected => "connected",
            ConnectionStateName::MaxRetriesReached => "max_retries_reached",
        };
        f.write_str(name)
    }
}

/// Observable state of the live connection
///
/// `attempt` counts retries: `0` for the first connection attempt after an
/// explicit connect, `1` once connected, and the retry number while
/// reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConnectionState {
    NoUrl,
    NotConnected { url: String, attempt: u32 },
    Connecting { url: String, attempt: u32 },
    Connected { url: String, attempt: u32 },
    MaxRetriesReached { url: String, attempt: u32 },
}

impl ConnectionState {
    pub fn name(&self) -> ConnectionStateName {
        match self {
            ConnectionState::NoUrl => ConnectionStateName::NoUrl,
            ConnectionState::NotConnected { .. } => ConnectionStateName::NotConnected,
            ConnectionState::Connecting { .. } => ConnectionStateName::Connecting,
            ConnectionState::Connected { .. } => ConnectionStateName::Connected,
            ConnectionState::MaxRetriesReached { .. } => ConnectionStateName::MaxRetriesReached,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ConnectionState::NoUrl => None,
            ConnectionState::NotConnected { url, .. }
            | ConnectionState::Connecting { url, .. }
            | ConnectionState::Connected { url, .. }
            | ConnectionState::MaxRetriesReached { url, .. } => Some(url),
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            ConnectionState::NoUrl => 0,
            ConnectionState::NotConnected { attempt, .. }
            | ConnectionState::Connecting { attempt, .. }
            | ConnectionState::Connected { attempt, .. }
            | ConnectionState::MaxRetriesReached { attempt, .. } => *attempt,
        }
    }

    /// Connecting or connected
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting { .. } | ConnectionState::Connected { .. }
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.url() {
            Some(url) => write!(f, "{} ({}, attempt {})", self.name(), url, self.attempt()),
            None => write!(f, "{}", self.name()),
        }
    }
}
