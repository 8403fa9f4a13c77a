//! Quality scoring
//!
//! Four integer scores from 1 (worst) to 5 (best):
//!
//! - network: connection class, clamped down by RTT and downlink bands
//! - audio: MOS when measured, otherwise jitter and loss tiers
//! - stability: variance of the last five overall scores
//! - overall: `round(0.4 * network + 0.4 * audio + 0.2 * stability)`

use super::metrics::{CallMetrics, EffectiveType, NetworkMetrics};
use crate::error::{DialerError, DialerResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshots needed before stability is measured
pub const STABILITY_WINDOW: usize = 5;

/// Limits for one quality tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTier {
    /// ms
    pub jitter: f64,
    /// percent
    pub packet_loss: f64,
    /// ms
    pub rtt: f64,
    pub mos: f64,
}

/// Downlink bands in Mbps; below each the network score is capped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownlinkBands {
    /// caps at 2
    pub poor: f64,
    /// caps at 3
    pub fair: f64,
    /// caps at 4
    pub good: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub excellent: ThresholdTier,
    pub good: ThresholdTier,
    pub fair: ThresholdTier,
    pub downlink: DownlinkBands,
    /// MOS below `fair.mos` but at or above this scores 2
    pub poor_mos: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: ThresholdTier {
                jitter: 30.0,
                packet_loss: 1.0,
                rtt: 150.0,
                mos: 4.0,
            },
            good: ThresholdTier {
                jitter: 60.0,
                packet_loss: 3.0,
                rtt: 300.0,
                mos: 3.5,
            },
            fair: ThresholdTier {
                jitter: 100.0,
                packet_loss: 5.0,
                rtt: 500.0,
                mos: 3.0,
            },
            downlink: DownlinkBands {
                poor: 1.0,
                fair: 2.0,
                good: 5.0,
            },
            poor_mos: 2.5,
        }
    }
}

impl QualityThresholds {
    pub fn validate(&self) -> DialerResult<()> {
        let ascending = |name: &str, a: f64, b: f64, c: f64| {
            if a < b && b < c {
                Ok(())
            } else {
                Err(DialerError::config(
                    format!("quality.thresholds.{}", name),
                    "tiers must be strictly ordered",
                ))
            }
        };
        ascending("jitter", self.excellent.jitter, self.good.jitter, self.fair.jitter)?;
        ascending("packet_loss", self.excellent.packet_loss, self.good.packet_loss, self.fair.packet_loss)?;
        ascending("rtt", self.excellent.rtt, self.good.rtt, self.fair.rtt)?;
        ascending("mos", self.poor_mos, self.fair.mos, self.good.mos)?;
        ascending("mos", self.fair.mos, self.good.mos, self.excellent.mos)?;
        ascending("downlink", self.downlink.poor, self.downlink.fair, self.downlink.good)?;
        Ok(())
    }
}

/// Derived scores, each 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScores {
    pub network: u8,
    pub audio: u8,
    pub stability: u8,
    pub overall: u8,
}

impl Default for QualityScores {
    fn default() -> Self {
        Self {
            network: 3,
            audio: 3,
            stability: 3,
            overall: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl SignalStrength {
    pub fn from_overall(overall: u8) -> Self {
        match overall {
            4.. => SignalStrength::Excellent,
            3 => SignalStrength::Good,
            2 => SignalStrength::Fair,
            _ => SignalStrength::Poor,
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStrength::Excellent => "excellent",
            SignalStrength::Good => "good",
            SignalStrength::Fair => "fair",
            SignalStrength::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Indicator bar count
pub fn signal_bars(overall: u8) -> u8 {
    overall.clamp(1, 5)
}

fn base_network_score(effective_type: &EffectiveType) -> u8 {
    match effective_type {
        EffectiveType::Slow2g => 1,
        EffectiveType::TwoG => 2,
        EffectiveType::ThreeG => 3,
        EffectiveType::FourG => 4,
        EffectiveType::Unknown => 3,
        EffectiveType::Other(_) => 4,
    }
}

pub fn network_score(metrics: &NetworkMetrics, thresholds: &QualityThresholds) -> u8 {
    let mut score = base_network_score(&metrics.effective_type);

    if metrics.rtt > thresholds.fair.rtt {
        score = score.min(2);
    } else if metrics.rtt > thresholds.good.rtt {
        score = score.min(3);
    } else if metrics.rtt > thresholds.excellent.rtt {
        score = score.min(4);
    }

    // 0 means the platform gave no estimate
    if metrics.downlink > 0.0 {
        let bands = &thresholds.downlink;
        if metrics.downlink < bands.poor {
            score = score.min(2);
        } else if metrics.downlink < bands.fair {
            score = score.min(3);
        } else if metrics.downlink < bands.good {
            score = score.min(4);
        }
    }

    score.max(1)
}

pub fn audio_score(metrics: &CallMetrics, call_active: bool, thresholds: &QualityThresholds) -> u8 {
    if metrics.mos > 0.0 {
        return if metrics.mos >= thresholds.excellent.mos {
            5
        } else if metrics.mos >= thresholds.good.mos {
            4
        } else if metrics.mos >= thresholds.fair.mos {
            3
        } else if metrics.mos >= thresholds.poor_mos {
            2
        } else {
            1
        };
    }

    if metrics.jitter == 0.0 && metrics.packet_loss == 0.0 {
        return if call_active { 4 } else { 3 };
    }

    let mut score: u8 = 5;

    if metrics.jitter > thresholds.fair.jitter {
        score = 2;
    } else if metrics.jitter > thresholds.good.jitter {
        score = 3;
    } else if metrics.jitter > thresholds.excellent.jitter {
        score = 4;
    }

    if metrics.packet_loss > thresholds.fair.packet_loss {
        score = score.min(2);
    } else if metrics.packet_loss > thresholds.good.packet_loss {
        score = score.min(3);
    } else if metrics.packet_loss > thresholds.excellent.packet_loss {
        score = score.min(4);
    }

    score.max(1)
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// `overall_history` is oldest first
pub fn stability_score(overall_history: &[u8]) -> u8 {
    if overall_history.len() < STABILITY_WINDOW {
        return 4;
    }
    let recent: Vec<f64> = overall_history[overall_history.len() - STABILITY_WINDOW..]
        .iter()
        .map(|s| f64::from(*s))
        .collect();
    let v = variance(&recent);
    if v > 2.0 {
        2
    } else if v > 1.0 {
        3
    } else if v > 0.5 {
        4
    } else {
        5
    }
}

/// Weighted 2:2:1 and rounded; integer arithmetic keeps it exact
pub fn overall_score(network: u8, audio: u8, stability: u8) -> u8 {
    let weighted = 2 * u32::from(network) + 2 * u32::from(audio) + u32::from(stability);
    // weighted / 5 rounded half up
    let rounded = (2 * weighted + 5) / 10;
    rounded.clamp(1, 5) as u8
}

pub fn compute_scores(
    network: &NetworkMetrics,
    call: &CallMetrics,
    call_active: bool,
    overall_history: &[u8],
    thresholds: &QualityThresholds,
) -> QualityScores {
    let network = network_score(network, thresholds);
    let audio = audio_score(call, call_active, thresholds);
    let stability = stability_score(overall_history);
    QualityScores {
        network,
        audio,
        stability,
        overall: overall_score(network, audio, stability),
    }
}
