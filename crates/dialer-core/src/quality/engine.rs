use super::metrics::{CallMetrics, NetworkInfoSource, NetworkMetrics};
use super::scoring::{compute_scores, signal_bars, QualityScores, SignalStrength};
use super::warnings::{classify, WarningSample};
use crate::config::QualityConfig;
use crate::events::{DialerEvent, EventEmitter};
use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MONITOR_TASK: &str = "quality-monitor";

/// One immutable sample kept for stability scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub timestamp: DateTime<Utc>,
    pub network: NetworkMetrics,
    pub call: CallMetrics,
    pub scores: QualityScores,
}

/// What every recomputation publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub timestamp: DateTime<Utc>,
    pub scores: QualityScores,
    pub strength: SignalStrength,
    pub bars: u8,
    pub network: NetworkMetrics,
    pub call: CallMetrics,
    pub call_active: bool,
    pub history_len: usize,
}

struct EngineState {
    network: NetworkMetrics,
    call: CallMetrics,
    scores: QualityScores,
    history: VecDeque<QualitySnapshot>,
    call_active: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            network: NetworkMetrics::default(),
            call: CallMetrics::default(),
            scores: QualityScores::default(),
            history: VecDeque::new(),
            call_active: false,
        }
    }
}

/// Signal quality engine
///
/// Keeps network and call metrics, rescoring them every monitor interval and
/// whenever a transport warning arrives. Subscribes to call events on the bus
/// to learn when a call is active and to pick up stats and warnings.
pub struct QualityEngine {
    config: QualityConfig,
    events: EventEmitter,
    network_source: Arc<dyn NetworkInfoSource>,
    state: Mutex<EngineState>,
    scheduler: Scheduler,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl QualityEngine {
    pub fn new(
        config: QualityConfig,
        events: EventEmitter,
        network_source: Arc<dyn NetworkInfoSource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            events,
            network_source,
            state: Mutex::new(EngineState::new()),
            scheduler: Scheduler::new(),
            listener: Mutex::new(None),
        })
    }

    /// Start the bus listener and the monitor loop. Restarting replaces both.
    pub fn start(self: &Arc<Self>) {
        self.stop();
        self.refresh_network();

        let mut rx = self.events.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(engine) = weak.upgrade() else { break };
                        engine.handle_event(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "quality engine lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *self.listener.lock() = Some(listener);

        let weak = Arc::downgrade(self);
        self.scheduler.every(MONITOR_TASK, self.config.monitor_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(engine) = weak.upgrade() {
                    engine.collect();
                }
            }
        });
        info!(interval_ms = self.config.monitor_interval.as_millis() as u64, "signal monitoring started");
    }

    pub fn stop(&self) {
        self.scheduler.cancel_all();
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.scheduler.is_scheduled(MONITOR_TASK)
    }

    /// Back to initial scores with an empty history
    pub fn reset(&self) {
        *self.state.lock() = EngineState::new();
        debug!("quality state reset");
    }

    /// One monitor tick: refresh network, rescore, record a snapshot
    pub fn collect(&self) -> QualityReport {
        self.refresh_network();
        let report = self.recompute();

        let mut state = self.state.lock();
        state.history.push_back(QualitySnapshot {
            timestamp: report.timestamp,
            network: report.network.clone(),
            call: report.call.clone(),
            scores: report.scores,
        });
        while state.history.len() > self.config.history_capacity {
            state.history.pop_front();
        }
        report
    }

    /// Rescore from current metrics and publish the result
    pub fn recompute(&self) -> QualityReport {
        let report = {
            let mut state = self.state.lock();
            let overall_history: Vec<u8> = state.history.iter().map(|s| s.scores.overall).collect();
            let scores = compute_scores(
                &state.network,
                &state.call,
                state.call_active,
                &overall_history,
                &self.config.thresholds,
            );
            state.scores = scores;
            Self::report_from(&state)
        };
        self.events.emit(DialerEvent::QualityChanged {
            report: report.clone(),
        });
        report
    }

    fn refresh_network(&self) {
        let metrics = self.network_source.current().unwrap_or_else(NetworkMetrics::fallback);
        self.state.lock().network = metrics;
    }

    /// Platform reported a network change
    pub fn on_network_change(&self, metrics: NetworkMetrics) {
        debug!(effective_type = %metrics.effective_type, rtt = metrics.rtt, downlink = metrics.downlink, "network changed");
        self.state.lock().network = metrics.clone();
        self.events.emit(DialerEvent::NetworkChanged { metrics });
        self.recompute();
    }

    /// Fold a transport warning into call metrics and raise a classified warning
    pub fn handle_warning(&self, name: &str, sample: &WarningSample) {
        self.state.lock().call.apply_warning(sample);
        self.recompute();

        let warning = classify(name);
        warn!(warning = %warning.name, severity = %warning.severity, "call quality warning");
        self.events.emit(DialerEvent::QualityWarning {
            name: warning.name,
            severity: warning.severity,
            message: warning.message,
            suggestion: warning.suggestion,
        });
    }

    pub fn clear_warning(&self, name: &str) {
        self.events.emit(DialerEvent::QualityWarningCleared {
            name: name.to_string(),
        });
    }

    pub fn set_call_active(&self, active: bool) {
        let mut state = self.state.lock();
        if active && !state.call_active {
            // fresh call, fresh measurements
            state.call = CallMetrics::default();
        }
        state.call_active = active;
    }

    fn handle_event(&self, event: &DialerEvent) {
        match event {
            // a ringing call already counts as a call for audio scoring
            DialerEvent::CallIncoming { .. } | DialerEvent::CallConnected { .. } => {
                self.set_call_active(true);
                self.recompute();
            }
            DialerEvent::CallEnded { .. } => {
                self.set_call_active(false);
                self.recompute();
            }
            DialerEvent::CallStats { sample, .. } => {
                self.state.lock().call.apply_stats(sample);
            }
            DialerEvent::CallWarning { name, sample, .. } => {
                self.handle_warning(name, sample);
            }
            DialerEvent::CallWarningCleared { name, .. } => {
                self.clear_warning(name);
            }
            _ => {}
        }
    }

    fn report_from(state: &EngineState) -> QualityReport {
        QualityReport {
            timestamp: Utc::now(),
            scores: state.scores,
            strength: SignalStrength::from_overall(state.scores.overall),
            bars: signal_bars(state.scores.overall),
            network: state.network.clone(),
            call: state.call.clone(),
            call_active: state.call_active,
            history_len: state.history.len(),
        }
    }

    /// Current report without rescoring
    pub fn report(&self) -> QualityReport {
        Self::report_from(&self.state.lock())
    }

    pub fn scores(&self) -> QualityScores {
        self.state.lock().scores
    }

    pub fn signal_strength(&self) -> SignalStrength {
        SignalStrength::from_overall(self.scores().overall)
    }

    pub fn history(&self) -> Vec<QualitySnapshot> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }
}

impl Drop for QualityEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
