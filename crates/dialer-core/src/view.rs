//! Render and notify ports
//!
//! The core never draws anything. Screens, the activity feed and incoming-call
//! notifications go through [`DialerView`] and [`Notifier`], which the
//! embedding application implements. [`ViewBridge`] turns bus events into
//! port calls and keeps the bounded [`ActivityLog`].

use crate::call::CallStatus;
use crate::events::{ActivityEntry, ActivityLevel, DialerEvent, EventEmitter};
use crate::phone::format_number;
use crate::provider::CallHistoryEntry;
use crate::quality::{QualityReport, WarningSeverity};
use crate::session::OperatorIdentity;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Render port
pub trait DialerView: Send + Sync {
    fn show_login(&self);

    fn show_activation(&self, operator: &OperatorIdentity);

    fn show_app(&self, operator: &OperatorIdentity);

    fn show_error(&self, message: &str);

    /// Make the activation control usable again after a failed attempt
    fn enable_activation(&self);

    fn add_activity(&self, entry: &ActivityEntry);

    fn update_call_history(&self, history: &[CallHistoryEntry]);

    fn show_call_state(&self, status: CallStatus);

    fn update_call_timer(&self, _display: &str) {}

    fn update_quality(&self, report: &QualityReport);
}

/// Notify port for incoming calls
pub trait Notifier: Send + Sync {
    /// Returns whether a notification was actually shown
    fn show_incoming(&self, from: &str) -> bool;

    fn clear(&self);
}

/// View that only writes to the log, for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessView;

impl DialerView for HeadlessView {
    fn show_login(&self) {
        info!("login required");
    }

    fn show_activation(&self, operator: &OperatorIdentity) {
        info!(operator = %operator.name, "ready to activate");
    }

    fn show_app(&self, operator: &OperatorIdentity) {
        info!(operator = %operator.name, "dialer active");
    }

    fn show_error(&self, message: &str) {
        warn!(%message, "dialer error");
    }

    fn enable_activation(&self) {}

    fn add_activity(&self, entry: &ActivityEntry) {
        info!(level = ?entry.level, message = %entry.message, "activity");
    }

    fn update_call_history(&self, history: &[CallHistoryEntry]) {
        debug!(rows = history.len(), "call history updated");
    }

    fn show_call_state(&self, status: CallStatus) {
        debug!(%status, "call state");
    }

    fn update_quality(&self, report: &QualityReport) {
        debug!(overall = report.scores.overall, strength = %report.strength, "quality");
    }
}

/// Notifier that never shows anything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn show_incoming(&self, _from: &str) -> bool {
        false
    }

    fn clear(&self) {}
}

/// Newest-first activity feed with a fixed capacity
#[derive(Debug, Clone)]
pub struct ActivityLog {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<ActivityEntry>>>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn push(&self, entry: ActivityEntry) {
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Newest first
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.entries.lock().iter().any(|e| e.message == message)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Forwards bus events to the view and notifier
pub struct ViewBridge {
    view: Arc<dyn DialerView>,
    notifier: Arc<dyn Notifier>,
    log: ActivityLog,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ViewBridge {
    pub fn new(view: Arc<dyn DialerView>, notifier: Arc<dyn Notifier>, log: ActivityLog) -> Arc<Self> {
        Arc::new(Self {
            view,
            notifier,
            log,
            listener: Mutex::new(None),
        })
    }

    /// Subscribe to `events`; a second call replaces the first subscription
    pub fn start(self: &Arc<Self>, events: &EventEmitter) {
        let mut rx = events.subscribe();
        let bridge = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(bridge) = bridge.upgrade() else { break };
                        bridge.handle(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "view bridge lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    fn record(&self, level: ActivityLevel, message: impl Into<String>) {
        let entry = ActivityEntry::new(level, message);
        self.view.add_activity(&entry);
        self.log.push(entry);
    }

    fn notify_incoming(&self, from: &str) {
        if self.notifier.show_incoming(from) {
            self.record(
                ActivityLevel::Success,
                format!("Desktop notification shown for call from {}", from),
            );
        } else {
            self.record(ActivityLevel::Warning, "Failed to show desktop notification");
        }
    }

    pub fn handle(&self, event: &DialerEvent) {
        match event {
            DialerEvent::Activity(entry) => {
                self.view.add_activity(entry);
                self.log.push(entry.clone());
            }
            DialerEvent::CallIncoming { from, .. } => {
                self.view.show_call_state(CallStatus::Incoming);
                self.record(
                    ActivityLevel::Info,
                    format!("Incoming call from {}", format_number(from)),
                );
            }
            DialerEvent::CallStateChanged { status, .. } => self.view.show_call_state(*status),
            DialerEvent::CallConnected { .. } => self.record(ActivityLevel::Success, "Call connected"),
            DialerEvent::CallEnded { reason, .. } => {
                self.record(ActivityLevel::Info, format!("Call ended: {}", reason))
            }
            DialerEvent::CallTimerTick { display, .. } => self.view.update_call_timer(display),
            DialerEvent::ToneSent { digit, .. } => {
                self.record(ActivityLevel::Info, format!("Sent tone: {}", digit))
            }
            DialerEvent::CallWarning { severity, message, .. } => {
                let level = match severity {
                    WarningSeverity::Critical => ActivityLevel::Error,
                    WarningSeverity::Warning => ActivityLevel::Warning,
                };
                self.record(level, message.clone());
            }
            DialerEvent::DeviceError { message } => {
                self.record(ActivityLevel::Error, format!("Device error: {}", message))
            }
            DialerEvent::OperatorRegistered { .. } => {
                self.record(ActivityLevel::Success, "Successfully registered for incoming calls")
            }
            DialerEvent::QualityChanged { report } => self.view.update_quality(report),
            DialerEvent::NotificationRequested { from, .. } => self.notify_incoming(from),
            DialerEvent::InboundCallNotice { from, .. } => self.notify_incoming(from),
            DialerEvent::NotificationCleared => self.notifier.clear(),
            _ => {}
        }
    }
}

impl Drop for ViewBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
