//! Network and call metrics fed into the scorer

use super::warnings::WarningSample;
use crate::call::CallStatsSample;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection class as reported by the platform network information API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectiveType {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
    Unknown,
    /// Any class the scorer does not know by name
    Other(String),
}

impl EffectiveType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => EffectiveType::Slow2g,
            "2g" => EffectiveType::TwoG,
            "3g" => EffectiveType::ThreeG,
            "4g" => EffectiveType::FourG,
            "unknown" | "" => EffectiveType::Unknown,
            _ => EffectiveType::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EffectiveType::Slow2g => "slow-2g",
            EffectiveType::TwoG => "2g",
            EffectiveType::ThreeG => "3g",
            EffectiveType::FourG => "4g",
            EffectiveType::Unknown => "unknown",
            EffectiveType::Other(s) => s,
        }
    }
}

impl From<String> for EffectiveType {
    fn from(value: String) -> Self {
        EffectiveType::parse(&value)
    }
}

impl From<EffectiveType> for String {
    fn from(value: EffectiveType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EffectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub effective_type: EffectiveType,
    /// Mbps; 0 when unknown
    pub downlink: f64,
    /// Milliseconds
    pub rtt: f64,
}

impl NetworkMetrics {
    pub fn new(effective_type: EffectiveType, downlink: f64, rtt: f64) -> Self {
        Self {
            effective_type,
            downlink,
            rtt,
        }
    }

    /// Assumed when the platform exposes no network information
    pub fn fallback() -> Self {
        Self::new(EffectiveType::FourG, 10.0, 50.0)
    }
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self::new(EffectiveType::Unknown, 0.0, 0.0)
    }
}

/// Per-call metrics; 0 means "not measured"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetrics {
    pub jitter: f64,
    pub packet_loss: f64,
    pub rtt: f64,
    pub mos: f64,
    pub audio_level: f64,
}

impl CallMetrics {
    /// Overwrite the fields a transport warning carried
    pub fn apply_warning(&mut self, sample: &WarningSample) {
        if let Some(jitter) = sample.jitter {
            self.jitter = jitter;
        }
        if let Some(loss) = sample.packet_loss_percentage {
            self.packet_loss = loss;
        }
        if let Some(rtt) = sample.rtt {
            self.rtt = rtt;
        }
        if let Some(mos) = sample.mos {
            self.mos = mos;
        }
        if let Some(level) = sample.audio_level {
            self.audio_level = level;
        }
    }

    pub fn apply_stats(&mut self, sample: &CallStatsSample) {
        self.jitter = sample.jitter;
        self.packet_loss = sample.packet_loss_percentage();
        self.rtt = sample.rtt;
        self.mos = sample.mos;
        self.audio_level = sample.audio_level;
    }
}

/// Where the engine reads network information from
pub trait NetworkInfoSource: Send + Sync {
    /// `None` when the platform has no network information API
    fn current(&self) -> Option<NetworkMetrics>;
}

/// A source that reports whatever it was last told
#[derive(Default)]
pub struct StaticNetworkInfo {
    metrics: RwLock<Option<NetworkMetrics>>,
}

impl StaticNetworkInfo {
    pub fn new(metrics: Option<NetworkMetrics>) -> Self {
        Self {
            metrics: RwLock::new(metrics),
        }
    }

    pub fn set(&self, metrics: Option<NetworkMetrics>) {
        *self.metrics.write() = metrics;
    }
}

impl NetworkInfoSource for StaticNetworkInfo {
    fn current(&self) -> Option<NetworkMetrics> {
        self.metrics.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_type_parse() {
        assert_eq!(EffectiveType::parse("slow-2g"), EffectiveType::Slow2g);
        assert_eq!(EffectiveType::parse("4G"), EffectiveType::FourG);
        assert_eq!(EffectiveType::parse(""), EffectiveType::Unknown);
        assert_eq!(EffectiveType::parse("5g"), EffectiveType::Other("5g".into()));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let metrics = NetworkMetrics::new(EffectiveType::ThreeG, 1.5, 320.0);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["effectiveType"], "3g");
        let back: NetworkMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(back, metrics);
    }

    #[test]
    fn test_apply_warning_only_touches_present_fields() {
        let mut call = CallMetrics {
            jitter: 10.0,
            mos: 4.2,
            ..Default::default()
        };
        call.apply_warning(&WarningSample {
            packet_loss_percentage: Some(6.5),
            ..Default::default()
        });
        assert_eq!(call.jitter, 10.0);
        assert_eq!(call.mos, 4.2);
        assert_eq!(call.packet_loss, 6.5);
    }
}
