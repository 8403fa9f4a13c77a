//! Transport warning lookup table

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Critical,
    Warning,
}

impl fmt::Display for WarningSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningSeverity::Critical => f.write_str("critical"),
            WarningSeverity::Warning => f.write_str("warning"),
        }
    }
}

/// Measurements attached to a transport warning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningSample {
    pub jitter: Option<f64>,
    pub packet_loss_percentage: Option<f64>,
    pub rtt: Option<f64>,
    pub mos: Option<f64>,
    pub audio_level: Option<f64>,
}

/// Severity, message and remediation for one warning name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningInfo {
    pub name: &'static str,
    pub severity: WarningSeverity,
    pub message: &'static str,
    pub suggestion: &'static str,
}

pub const WARNING_TABLE: &[WarningInfo] = &[
    WarningInfo {
        name: "high-packets-lost-fraction",
        severity: WarningSeverity::Critical,
        message: "High packet loss detected - audio quality may be degraded",
        suggestion: "Check your network connection or try switching to a wired connection",
    },
    WarningInfo {
        name: "low-mos",
        severity: WarningSeverity::Critical,
        message: "Poor call quality detected - consider switching networks",
        suggestion: "Switch to a better network or move to an area with stronger signal",
    },
    WarningInfo {
        name: "constant-audio-input-level",
        severity: WarningSeverity::Critical,
        message: "Microphone issue detected - check your audio settings",
        suggestion: "Check if your microphone is muted or try selecting a different microphone",
    },
    WarningInfo {
        name: "high-jitter",
        severity: WarningSeverity::Warning,
        message: "Network instability detected - audio may be choppy",
        suggestion: "Move closer to your router or switch to a more stable connection",
    },
    WarningInfo {
        name: "high-rtt",
        severity: WarningSeverity::Warning,
        message: "High network latency detected - conversations may have delays",
        suggestion: "Check your internet connection speed or try a different network",
    },
];

const GENERIC_SUGGESTION: &str = "Try improving your network connection";

/// A warning resolved against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedWarning {
    pub name: String,
    pub severity: WarningSeverity,
    pub message: String,
    pub suggestion: String,
}

pub fn lookup(name: &str) -> Option<&'static WarningInfo> {
    WARNING_TABLE.iter().find(|w| w.name == name)
}

/// Unknown names are plain warnings with a generic message
pub fn classify(name: &str) -> ClassifiedWarning {
    match lookup(name) {
        Some(info) => ClassifiedWarning {
            name: name.to_string(),
            severity: info.severity,
            message: info.message.to_string(),
            suggestion: info.suggestion.to_string(),
        },
        None => ClassifiedWarning {
            name: name.to_string(),
            severity: WarningSeverity::Warning,
            message: format!("Call quality warning: {}", name),
            suggestion: GENERIC_SUGGESTION.to_string(),
        },
    }
}
