//! Dialer configuration
//!
//! Every timing the dialer relies on lives here with its production default.
//! Durations are written as milliseconds in TOML.
//!
//! ```rust
//! use rvoip_dialer_core::DialerConfig;
//! use std::time::Duration;
//!
//! let config = DialerConfig::new("http://localhost:3000")
//!     .with_health_check_interval(Duration::from_secs(60))
//!     .with_max_reconnect_attempts(3);
//! assert!(config.validate().is_ok());
//! ```

use crate::channel::ReconnectPolicy;
use crate::error::{DialerError, DialerResult};
use crate::quality::QualityThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Session resilience timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(with = "duration_ms")]
    pub health_check_interval: Duration,
    #[serde(with = "duration_ms")]
    pub device_refresh_interval: Duration,
    /// Delay between a successful credential fetch and the next one
    #[serde(with = "duration_ms")]
    pub credential_refresh_interval: Duration,
    /// Wait after a call ends before replaying deferred work
    #[serde(with = "duration_ms")]
    pub deferred_replay_delay: Duration,
    /// Wait after teardown before re-initializing
    #[serde(with = "duration_ms")]
    pub teardown_settle: Duration,
    /// Rows of call history fetched for display
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(120),
            device_refresh_interval: Duration::from_secs(300),
            credential_refresh_interval: Duration::from_secs(50 * 60),
            deferred_replay_delay: Duration::from_secs(1),
            teardown_settle: Duration::from_millis(500),
            history_limit: 5,
        }
    }
}

/// Signaling channel timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub keepalive_interval: Duration,
    /// How long after a ping the pong is checked
    #[serde(with = "duration_ms")]
    pub pong_check_delay: Duration,
    /// Maximum pong age before the channel counts as stale
    #[serde(with = "duration_ms")]
    pub pong_freshness: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            pong_check_delay: Duration::from_secs(5),
            pong_freshness: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Call and telephony device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    #[serde(with = "duration_ms")]
    pub stats_interval: Duration,
    #[serde(with = "duration_ms")]
    pub timer_interval: Duration,
    /// Wait after unregister and after destroy
    #[serde(with = "duration_ms")]
    pub teardown_settle: Duration,
    pub codec_preferences: Vec<String>,
    pub enable_ringing_state: bool,
    pub dscp: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_secs(1),
            timer_interval: Duration::from_secs(1),
            teardown_settle: Duration::from_millis(500),
            codec_preferences: vec!["opus".to_string(), "pcmu".to_string()],
            enable_ringing_state: true,
            dscp: true,
        }
    }
}

/// Signal quality engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    #[serde(with = "duration_ms")]
    pub monitor_interval: Duration,
    pub history_capacity: usize,
    pub thresholds: QualityThresholds,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(2),
            history_capacity: 60,
            thresholds: QualityThresholds::default(),
        }
    }
}

/// Top-level dialer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    /// Base URL of the credential/history service
    pub service_url: String,
    pub session: SessionConfig,
    pub channel: ChannelConfig,
    pub call: CallConfig,
    pub quality: QualityConfig,
    pub activity_log_capacity: usize,
    pub event_capacity: usize,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:3000".to_string(),
            session: SessionConfig::default(),
            channel: ChannelConfig::default(),
            call: CallConfig::default(),
            quality: QualityConfig::default(),
            activity_log_capacity: 10,
            event_capacity: 1000,
        }
    }
}

impl DialerConfig {
    /// Create a configuration pointing at the given service
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            ..Default::default()
        }
    }

    /// Parse TOML; missing keys keep their defaults
    pub fn from_toml_str(input: &str) -> DialerResult<Self> {
        let config: DialerConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> DialerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DialerError::config(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> DialerResult<String> {
        toml::to_string_pretty(self).map_err(|e| DialerError::config("toml", e.to_string()))
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = url.into();
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.session.health_check_interval = interval;
        self
    }

    pub fn with_device_refresh_interval(mut self, interval: Duration) -> Self {
        self.session.device_refresh_interval = interval;
        self
    }

    pub fn with_credential_refresh_interval(mut self, interval: Duration) -> Self {
        self.session.credential_refresh_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.channel.connect_timeout = timeout;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.channel.reconnect.max_attempts = attempts;
        self
    }

    pub fn with_quality_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.quality.thresholds = thresholds;
        self
    }

    /// Reject settings the components cannot run with
    pub fn validate(&self) -> DialerResult<()> {
        let intervals = [
            ("session.health_check_interval", self.session.health_check_interval),
            ("session.device_refresh_interval", self.session.device_refresh_interval),
            ("session.credential_refresh_interval", self.session.credential_refresh_interval),
            ("channel.connect_timeout", self.channel.connect_timeout),
            ("channel.keepalive_interval", self.channel.keepalive_interval),
            ("call.stats_interval", self.call.stats_interval),
            ("call.timer_interval", self.call.timer_interval),
            ("quality.monitor_interval", self.quality.monitor_interval),
        ];
        for (field, value) in intervals {
            if value.is_zero() {
                return Err(DialerError::config(field, "must be greater than zero"));
            }
        }
        if self.channel.pong_check_delay >= self.channel.keepalive_interval {
            return Err(DialerError::config(
                "channel.pong_check_delay",
                "must be shorter than the keepalive interval",
            ));
        }
        self.channel.reconnect.validate()?;
        if self.quality.history_capacity == 0 {
            return Err(DialerError::config("quality.history_capacity", "must be at least 1"));
        }
        self.quality.thresholds.validate()?;
        if self.activity_log_capacity == 0 {
            return Err(DialerError::config("activity_log_capacity", "must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(DialerError::config("event_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DialerConfig::default();
        assert_eq!(config.session.health_check_interval, Duration::from_secs(120));
        assert_eq!(config.session.device_refresh_interval, Duration::from_secs(300));
        assert_eq!(config.session.credential_refresh_interval, Duration::from_secs(3000));
        assert_eq!(config.channel.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.channel.reconnect.max_attempts, 5);
        assert_eq!(config.quality.history_capacity, 60);
        assert_eq!(config.call.codec_preferences, vec!["opus", "pcmu"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DialerConfig::from_toml_str(
            r#"
            service_url = "https://dialer.example.com"

            [session]
            health_check_interval = 60000

            [channel.reconnect]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.service_url, "https://dialer.example.com");
        assert_eq!(config.session.health_check_interval, Duration::from_secs(60));
        assert_eq!(config.session.device_refresh_interval, Duration::from_secs(300));
        assert_eq!(config.channel.reconnect.max_attempts, 3);
        assert_eq!(config.channel.reconnect.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = DialerConfig::default().with_max_reconnect_attempts(7);
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(DialerConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let config = DialerConfig::default().with_health_check_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(DialerError::InvalidConfiguration { .. })
        ));

        let config = DialerConfig::default().with_max_reconnect_attempts(0);
        assert!(config.validate().is_err());

        assert!(DialerConfig::from_toml_str("event_capacity = 0").is_err());
    }
}
