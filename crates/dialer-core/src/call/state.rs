//! Call record and lifecycle states

use crate::error::{DialerError, DialerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// Local identifier for a call
pub type CallId = Uuid;

/// Lifecycle of the single call the dialer owns
///
/// ```text
/// NONE -> INCOMING -> CONNECTING -> ACTIVE -> ENDED -> NONE
/// ```
///
/// `INCOMING` may go straight to `ACTIVE` on a local answer and `NONE` goes to
/// `CONNECTING` for outbound calls. `ENDED` is only reachable from a call that
/// is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    None,
    Incoming,
    Connecting,
    Active,
    Ended,
}

impl CallStatus {
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        use CallStatus::*;
        matches!(
            (self, next),
            (None, Incoming)
                | (None, Connecting)
                | (Incoming, Connecting)
                | (Incoming, Active)
                | (Incoming, Ended)
                | (Connecting, Active)
                | (Connecting, Ended)
                | (Active, Ended)
                | (Ended, None)
        )
    }

    /// Incoming, connecting or active
    pub fn is_in_progress(self) -> bool {
        matches!(self, CallStatus::Incoming | CallStatus::Connecting | CallStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::None => "none",
            CallStatus::Incoming => "incoming",
            CallStatus::Connecting => "connecting",
            CallStatus::Active => "active",
            CallStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Why a call reached `ENDED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Caller hung up before the call was answered
    Cancelled,
    /// Rejected locally
    Rejected,
    /// Hung up locally
    Hangup,
    /// Remote side disconnected
    Disconnected,
    /// Unrecoverable transport error
    Error,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Cancelled => "cancelled",
            EndReason::Rejected => "rejected",
            EndReason::Hangup => "hangup",
            EndReason::Disconnected => "disconnected",
            EndReason::Error => "error",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one call the dialer is handling
#[derive(Debug, Clone)]
pub struct Call {
    pub id: CallId,
    /// Transport identifier, when the capability provides one
    pub call_sid: Option<String>,
    pub counterpart: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    /// Reset when the call connects
    pub started_at: Instant,
    pub created_at: DateTime<Utc>,
    pub muted: bool,
}

impl Call {
    pub fn new(counterpart: impl Into<String>, direction: CallDirection, call_sid: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_sid,
            counterpart: counterpart.into(),
            direction,
            status: CallStatus::None,
            started_at: Instant::now(),
            created_at: Utc::now(),
            muted: false,
        }
    }

    /// Elapsed seconds since `started_at`, rounded to the nearest second
    pub fn duration_secs(&self) -> u64 {
        let millis = self.started_at.elapsed().as_millis() as u64;
        (millis + 500) / 1000
    }

    /// Move to `next`, returning the previous status
    pub fn transition(&mut self, next: CallStatus) -> DialerResult<CallStatus> {
        if !self.status.can_transition_to(next) {
            return Err(DialerError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let previous = self.status;
        self.status = next;
        if next == CallStatus::Active {
            self.started_at = Instant::now();
        }
        Ok(previous)
    }
}

/// `MM:SS`
pub fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
