//! Reconnection backoff policies
//!
//! A policy maps the retry attempt number (starting at 1) to the delay before
//! that attempt, or `None` to stop reconnecting.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub trait RetryPolicy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

impl<F> RetryPolicy for F
where
    F: Fn(u32) -> Option<Duration> + Send + Sync,
{
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self(attempt)
    }
}

// ----------------------------------------------------------------------------
// Retry Limit
// ----------------------------------------------------------------------------

/// Maximum number of retries. Configured as an integer where `-1` is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RetryLimit {
    Unlimited,
    Limited(u32),
}

impl RetryLimit {
    pub fn allows(self, attempt: u32) -> bool {
        match self {
            RetryLimit::Unlimited => true,
            RetryLimit::Limited(max) => attempt <= max,
        }
    }
}

impl TryFrom<i64> for RetryLimit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(RetryLimit::Unlimited),
            n => u32::try_from(n)
                .map(RetryLimit::Limited)
                .map_err(|_| format!("retry limit must be -1 or a non-negative integer, got {}", n)),
        }
    }
}

impl From<RetryLimit> for i64 {
    fn from(limit: RetryLimit) -> i64 {
        match limit {
            RetryLimit::Unlimited => -1,
            RetryLimit::Limited(max) => i64::from(max),
        }
    }
}

impl From<u32> for RetryLimit {
    fn from(max: u32) -> Self {
        RetryLimit::Limited(max)
    }
}

impl fmt::Display for RetryLimit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RetryLimit::Unlimited => write!(f, "unlimited"),
            RetryLimit::Limited(max) => write!(f, "{}", max),
        }
    }
}

// ----------------------------------------------------------------------------
// Built-in Policies
// ----------------------------------------------------------------------------

/// Never reconnect
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Same delay before every retry
#[derive(Debug, Clone, Copy)]
pub struct ConstantRetry {
    pub max_retries: RetryLimit,
    pub delay: Duration,
}

impl ConstantRetry {
    pub fn new(max_retries: impl Into<RetryLimit>, delay: Duration) -> Self {
        Self {
            max_retries: max_retries.into(),
            delay,
        }
    }
}

impl RetryPolicy for ConstantRetry {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.max_retries.allows(attempt).then_some(self.delay)
    }
}

/// Delay grows by `delay` with every retry
#[derive(Debug, Clone, Copy)]
pub struct LinearRetry {
    pub max_retries: RetryLimit,
    pub delay: Duration,
}

impl LinearRetry {
    pub fn new(max_retries: impl Into<RetryLimit>, delay: Duration) -> Self {
        Self {
            max_retries: max_retries.into(),
            delay,
        }
    }
}

impl RetryPolicy for LinearRetry {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.max_retries
            .allows(attempt)
            .then(|| self.delay.saturating_mul(attempt))
    }
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Serializable description of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryConfig {
    None,
    Constant { max_retries: RetryLimit, delay_ms: u64 },
    Linear { max_retries: RetryLimit, delay_ms: u64 },
}

impl RetryConfig {
    pub fn build(&self) -> Arc<dyn RetryPolicy> {
        match *self {
            RetryConfig::None => Arc::new(NoRetry),
            RetryConfig::Constant {
                max_retries,
                delay_ms,
            } => Arc::new(ConstantRetry::new(max_retries, Duration::from_millis(delay_ms))),
            RetryConfig::Linear {
                max_retries,
                delay_ms,
            } => Arc::new(LinearRetry::new(max_retries, Duration::from_millis(delay_ms))),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::Linear {
            max_retries: RetryLimit::Limited(10),
            delay_ms: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry() {
        assert_eq!(NoRetry.next_delay(1), None);
    }

    #[test]
    fn test_constant_retry() {
        let policy = ConstantRetry::new(2, Duration::from_millis(500));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_linear_retry() {
        let policy = LinearRetry::new(2, Duration::from_millis(1_000));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(2_000)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_zero_retries_behaves_like_no_retry() {
        let policy = LinearRetry::new(0, Duration::from_millis(1_000));
        assert_eq!(policy.next_delay(1), None);
    }

    #[test]
    fn test_unlimited_retries() {
        let policy = ConstantRetry::new(RetryLimit::Unlimited, Duration::from_millis(10));
        assert_eq!(policy.next_delay(10_000), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_closure_policy() {
        let policy = |attempt: u32| (attempt < 3).then(|| Duration::from_secs(attempt.into()));
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_retry_limit_from_integer() {
        assert_eq!(RetryLimit::try_from(-1i64), Ok(RetryLimit::Unlimited));
        assert_eq!(RetryLimit::try_from(4i64), Ok(RetryLimit::Limited(4)));
        assert!(RetryLimit::try_from(-2i64).is_err());
    }

    #[test]
    fn test_config_builds_policy() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"kind":"constant","max_retries":-1,"delay_ms":250}"#)
                .unwrap();
        let policy = config.build();
        assert_eq!(policy.next_delay(99), Some(Duration::from_millis(250)));

        let config: RetryConfig = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(config.build().next_delay(1), None);
    }
}
