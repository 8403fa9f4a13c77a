//! Score command - run the quality rules on hand-entered measurements

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use rvoip_dialer_core::quality::scoring::{compute_scores, signal_bars};
use rvoip_dialer_core::quality::{CallMetrics, EffectiveType, NetworkMetrics, QualityScores, SignalStrength};
use rvoip_dialer_core::DialerConfig;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::Output;

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    /// Effective connection type (slow-2g, 2g, 3g, 4g, unknown)
    #[arg(long = "type", default_value = "4g")]
    effective_type: String,

    /// Downlink estimate in Mbps; 0 when unknown
    #[arg(long, default_value_t = 0.0)]
    downlink: f64,

    /// Network round trip time in ms
    #[arg(long, default_value_t = 0.0)]
    rtt: f64,

    /// Call jitter in ms
    #[arg(long, default_value_t = 0.0)]
    jitter: f64,

    /// Call packet loss in percent
    #[arg(long, default_value_t = 0.0)]
    packet_loss: f64,

    /// Mean opinion score; 0 when not measured
    #[arg(long, default_value_t = 0.0)]
    mos: f64,

    /// Score as if a call were up
    #[arg(long)]
    call_active: bool,

    /// Earlier overall scores, oldest first, e.g. 4,4,3,4,4
    #[arg(long, value_delimiter = ',')]
    history: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct ScoreReport {
    scores: QualityScores,
    strength: SignalStrength,
    bars: u8,
}

#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "Component")]
    component: &'static str,
    #[tabled(rename = "Score")]
    score: u8,
}

fn score(args: &ScoreArgs, config: &DialerConfig) -> ScoreReport {
    let network = NetworkMetrics::new(EffectiveType::parse(&args.effective_type), args.downlink, args.rtt);
    let call = CallMetrics {
        jitter: args.jitter,
        packet_loss: args.packet_loss,
        mos: args.mos,
        ..Default::default()
    };
    let scores = compute_scores(&network, &call, args.call_active, &args.history, &config.quality.thresholds);
    ScoreReport {
        scores,
        strength: SignalStrength::from_overall(scores.overall),
        bars: signal_bars(scores.overall),
    }
}

pub fn execute(args: &ScoreArgs, config: &DialerConfig, out: &Output) -> Result<()> {
    let report = score(args, config);
    if out.is_json() {
        return out.print_json(&report);
    }

    let rows = vec![
        ScoreRow { component: "network", score: report.scores.network },
        ScoreRow { component: "audio", score: report.scores.audio },
        ScoreRow { component: "stability", score: report.scores.stability },
        ScoreRow { component: "overall", score: report.scores.overall },
    ];
    println!("{}", Table::new(rows).with(Style::rounded()));

    let bars = "▮".repeat(report.bars as usize);
    let label = match report.strength {
        SignalStrength::Excellent => report.strength.to_string().green(),
        SignalStrength::Good => report.strength.to_string().cyan(),
        SignalStrength::Fair => report.strength.to_string().yellow(),
        SignalStrength::Poor => report.strength.to_string().red(),
    };
    println!("{} {}", bars, label);
    Ok(())
}
