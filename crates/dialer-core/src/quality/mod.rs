//! Signal quality engine
//!
//! Scores live network and call conditions from 1 to 5 and turns transport
//! warnings into operator-facing messages with remediation hints.

mod engine;
pub mod metrics;
pub mod scoring;
pub mod warnings;

pub use engine::{QualityEngine, QualityReport, QualitySnapshot};
pub use metrics::{CallMetrics, EffectiveType, NetworkInfoSource, NetworkMetrics, StaticNetworkInfo};
pub use scoring::{QualityScores, QualityThresholds, SignalStrength};
pub use warnings::{classify, ClassifiedWarning, WarningSample, WarningSeverity};
