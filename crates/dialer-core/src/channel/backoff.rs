//! Reconnection backoff policy

use crate::config::duration_ms;
use crate::error::{DialerError, DialerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff: `base_delay * 2^(attempt - 1)`, at most
/// `max_attempts` attempts before giving up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether attempt `attempt` (1-based) is still allowed
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    pub fn validate(&self) -> DialerResult<()> {
        if self.max_attempts == 0 {
            return Err(DialerError::config("channel.reconnect.max_attempts", "must be at least 1"));
        }
        if self.base_delay.is_zero() {
            return Err(DialerError::config("channel.reconnect.base_delay", "must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_attempt_cap() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.allows(0));
        assert!(policy.allows(5));
        assert!(!policy.allows(6));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), u32::MAX);
        assert!(policy.delay_for(200) >= policy.delay_for(31));
    }
}
