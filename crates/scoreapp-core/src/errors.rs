//! Error types for the ScoreApp core
//!
//! Transport faults never surface here: they are expressed as connection state
//! transitions. What remains are decoding failures, configuration problems and
//! the single fatal invariant of the aggregator (race/stats type disagreement).

use serde::{Deserialize, Serialize};

use crate::types::{RaceId, RaceType};

// ----------------------------------------------------------------------------
// Core Error
// ----------------------------------------------------------------------------

/// Errors produced by the core crate
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Frame decoding failed: {0}")]
    FrameDecode(#[from] serde_json::Error),

    #[error("Stats of type {stats} computed for race {race_id} of type {race}")]
    StatsTypeMismatch {
        race_id: RaceId,
        race: RaceType,
        stats: RaceType,
    },

    #[error("Race {actual} offered to the tracker of race {expected}")]
    RaceIdMismatch { expected: RaceId, actual: RaceId },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl CoreError {
    /// Whether the error is an invariant violation that must abort rendering
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::StatsTypeMismatch { .. })
    }
}

pub type Result<T> = core::result::Result<T, CoreError>;

// ----------------------------------------------------------------------------
// Request Failures
// ----------------------------------------------------------------------------

/// Normalized failure of a snapshot/control request
///
/// Produced by the request/response collaborator; the core only stores it so a
/// race view can report why no data is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ApiError {
    pub const FETCH_FAILED: &'static str = "fetch_failed";
    pub const PARSE_ERROR: &'static str = "parse_error";
    pub const UNKNOWN_ERROR: &'static str = "unknown_error";

    pub fn new(code: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    /// The request never produced a response (network error, refused connection)
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::new(Self::FETCH_FAILED, message, None)
    }

    /// The response body was not valid JSON
    pub fn parse_error(message: impl Into<String>, status: u16) -> Self {
        Self::new(Self::PARSE_ERROR, message, Some(status))
    }

    /// Unsuccessful response without a usable error body
    pub fn unknown(status: u16) -> Self {
        Self::new(
            Self::UNKNOWN_ERROR,
            format!("Response status is {}", status),
            Some(status),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_type_mismatch_is_fatal() {
        let mismatch = CoreError::StatsTypeMismatch {
            race_id: 3,
            race: RaceType::TimeTrial,
            stats: RaceType::HeadToHead,
        };
        assert!(mismatch.is_fatal());
        assert!(!CoreError::InvalidConfiguration("x".to_string()).is_fatal());
    }

    #[test]
    fn test_api_error_status_is_omitted_when_absent() {
        let err = ApiError::fetch_failed("network down");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("status"));
        assert_eq!(err.to_string(), "fetch_failed: network down");
        assert_eq!(ApiError::unknown(502).status, Some(502));
    }
}
