//! Domain event bus for the dialer
//!
//! Every component publishes through a cloned [`EventEmitter`] handed to it by
//! the composition root. Subscribers (the session manager, the quality engine,
//! the view bridge) each get their own receiver; ordering is FIFO per publisher.

use crate::call::{CallDirection, CallId, CallStatsSample, CallStatus, EndReason};
use crate::channel::DisconnectReason;
use crate::quality::{NetworkMetrics, QualityReport, WarningSample, WarningSeverity};
use crate::session::{ActivationState, DeferredOp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Events published on the dialer bus
#[derive(Debug, Clone)]
pub enum DialerEvent {
    // Call events
    /// An inbound offer arrived
    CallIncoming {
        call_id: CallId,
        from: String,
        direction: CallDirection,
    },

    /// Call status changed
    CallStateChanged {
        call_id: CallId,
        previous: CallStatus,
        status: CallStatus,
        /// Seconds since the call record was created, rounded
        duration_secs: u64,
    },

    /// Call reached ACTIVE
    CallConnected { call_id: CallId },

    /// Call reached ENDED
    CallEnded {
        call_id: CallId,
        reason: EndReason,
        duration_secs: u64,
    },

    /// Mute toggled
    CallMuteChanged { call_id: CallId, muted: bool },

    /// DTMF digit sent
    ToneSent { call_id: CallId, digit: char },

    /// One-second call timer tick
    CallTimerTick {
        call_id: CallId,
        elapsed_secs: u64,
        /// `MM:SS`
        display: String,
    },

    /// Parsed transport statistics
    CallStats {
        call_id: CallId,
        sample: CallStatsSample,
    },

    /// Transport warning re-published with a severity
    CallWarning {
        call_id: CallId,
        name: String,
        severity: WarningSeverity,
        message: String,
        sample: WarningSample,
    },

    /// Transport warning cleared
    CallWarningCleared { call_id: CallId, name: String },

    // Device events
    /// Telephony capability registered and ready
    DeviceReady,

    /// Telephony capability reported an error
    DeviceError { message: String },

    // Channel events
    /// Signaling channel connected
    ChannelConnected,

    /// Signaling channel dropped
    ChannelDisconnected { reason: DisconnectReason },

    /// A reconnection attempt was scheduled
    ChannelReconnecting {
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
    },

    /// Transport-level reconnect completed
    ChannelReconnected,

    /// Attempt cap reached; manual reconnect required
    ChannelReconnectExhausted { attempts: u32 },

    /// No pong inside the freshness window
    ChannelStale { last_pong_ms: Option<u64> },

    /// Server accepted `register-client`
    OperatorRegistered { payload: serde_json::Value },

    /// Server refused `register-client`
    OperatorRegistrationFailed { payload: serde_json::Value },

    /// Out-of-band inbound call notice from the channel
    InboundCallNotice {
        from: String,
        call_sid: Option<String>,
    },

    /// Server-side call status update
    CallStatusUpdate { payload: serde_json::Value },

    // Quality events
    /// Scores recomputed
    QualityChanged { report: QualityReport },

    /// Severity-classified warning with a remediation hint
    QualityWarning {
        name: String,
        severity: WarningSeverity,
        message: String,
        suggestion: String,
    },

    /// Warning cleared
    QualityWarningCleared { name: String },

    /// Network information changed
    NetworkChanged { metrics: NetworkMetrics },

    // Session events
    /// Activation state changed
    SessionStateChanged {
        previous: ActivationState,
        state: ActivationState,
    },

    /// New credential issued and pushed into the device
    CredentialRefreshed { issued_at: DateTime<Utc> },

    /// Maintenance postponed because a call is in progress
    OperationDeferred { op: DeferredOp },

    /// Deferred maintenance replayed
    DeferredReplayed { ops: Vec<DeferredOp> },

    // Activity and notification
    /// Operator-facing activity entry
    Activity(ActivityEntry),

    /// Ask the notifier to surface an incoming call
    NotificationRequested { call_id: CallId, from: String },

    /// Dismiss any incoming-call notification
    NotificationCleared,
}

impl DialerEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            DialerEvent::CallIncoming { .. } => "call:incoming",
            DialerEvent::CallStateChanged { .. } => "call:state",
            DialerEvent::CallConnected { .. } => "call:connected",
            DialerEvent::CallEnded { .. } => "call:ended",
            DialerEvent::CallMuteChanged { .. } => "call:mute",
            DialerEvent::ToneSent { .. } => "call:tone",
            DialerEvent::CallTimerTick { .. } => "call:timer",
            DialerEvent::CallStats { .. } => "call:stats",
            DialerEvent::CallWarning { .. } => "call:warning",
            DialerEvent::CallWarningCleared { .. } => "call:warning-cleared",
            DialerEvent::DeviceReady => "device:ready",
            DialerEvent::DeviceError { .. } => "device:error",
            DialerEvent::ChannelConnected => "channel:connected",
            DialerEvent::ChannelDisconnected { .. } => "channel:disconnected",
            DialerEvent::ChannelReconnecting { .. } => "channel:reconnecting",
            DialerEvent::ChannelReconnected => "channel:reconnected",
            DialerEvent::ChannelReconnectExhausted { .. } => "channel:reconnect-exhausted",
            DialerEvent::ChannelStale { .. } => "channel:stale",
            DialerEvent::OperatorRegistered { .. } => "channel:registered",
            DialerEvent::OperatorRegistrationFailed { .. } => "channel:registration-failed",
            DialerEvent::InboundCallNotice { .. } => "channel:incoming-call",
            DialerEvent::CallStatusUpdate { .. } => "channel:call-status",
            DialerEvent::QualityChanged { .. } => "quality:changed",
            DialerEvent::QualityWarning { .. } => "quality:warning",
            DialerEvent::QualityWarningCleared { .. } => "quality:warning-cleared",
            DialerEvent::NetworkChanged { .. } => "quality:network",
            DialerEvent::SessionStateChanged { .. } => "session:state",
            DialerEvent::CredentialRefreshed { .. } => "session:credential",
            DialerEvent::OperationDeferred { .. } => "session:deferred",
            DialerEvent::DeferredReplayed { .. } => "session:replayed",
            DialerEvent::Activity(_) => "activity",
            DialerEvent::NotificationRequested { .. } => "notify:show",
            DialerEvent::NotificationCleared => "notify:clear",
        }
    }
}

/// Severity of an activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One line of the operator activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub level: ActivityLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(level: ActivityLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Event stream type
pub type EventStream = BroadcastStream<DialerEvent>;

/// Cloneable publisher/subscriber handle for the dialer bus
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<DialerEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: DialerEvent) {
        tracing::trace!(event = event.name(), "emit");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Emit an operator-facing activity entry
    pub fn activity(&self, level: ActivityLevel, message: impl Into<String>) {
        self.emit(DialerEvent::Activity(ActivityEntry::new(level, message)));
    }

    /// Subscribe with a raw receiver
    pub fn subscribe(&self) -> broadcast::Receiver<DialerEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a stream
    pub fn subscribe_stream(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1000)
    }
}
