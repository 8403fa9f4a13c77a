//! Parsing of raw transport statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed statistics sample for the active call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStatsSample {
    pub timestamp: DateTime<Utc>,
    pub jitter: f64,
    pub packets_received: f64,
    pub packets_lost: f64,
    pub bytes_received: f64,
    pub bytes_sent: f64,
    pub rtt: f64,
    pub mos: f64,
    pub audio_level: f64,
    pub codec_name: Option<String>,
}

impl CallStatsSample {
    /// Lost packets as a percentage of all packets seen
    pub fn packet_loss_percentage(&self) -> f64 {
        let total = self.packets_received + self.packets_lost;
        if total > 0.0 {
            self.packets_lost / total * 100.0
        } else {
            0.0
        }
    }
}

/// Numbers and numeric strings parse; anything missing or invalid is 0.
pub fn parse_stat_value(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn is_audio_report(report: &Value) -> bool {
    let mentions_audio = |key: &str| {
        report
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.to_ascii_lowercase().contains("audio"))
            .unwrap_or(false)
    };
    mentions_audio("kind") || mentions_audio("mediaType") || mentions_audio("codecName")
}

/// Pick the first audio report out of a stats dump
pub fn parse_stats(reports: &[Value]) -> Option<CallStatsSample> {
    let report = reports.iter().find(|r| is_audio_report(r))?;
    Some(CallStatsSample {
        timestamp: Utc::now(),
        jitter: parse_stat_value(report.get("jitter")),
        packets_received: parse_stat_value(report.get("packetsReceived")),
        packets_lost: parse_stat_value(report.get("packetsLost")),
        bytes_received: parse_stat_value(report.get("bytesReceived")),
        bytes_sent: parse_stat_value(report.get("bytesSent")),
        rtt: parse_stat_value(report.get("rtt")),
        mos: parse_stat_value(report.get("mos")),
        audio_level: parse_stat_value(report.get("audioLevel")),
        codec_name: report.get("codecName").and_then(Value::as_str).map(str::to_string),
    })
}
