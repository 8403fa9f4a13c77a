//! Telephony capability port
//!
//! The dialer never transports audio itself. A [`DeviceFactory`] builds an
//! opaque [`TelephonyDevice`] from a credential; the device reports lifecycle
//! and inbound offers as [`DeviceEvent`]s, and each call it hands over comes
//! with its own [`CallEvent`] receiver.

use crate::config::CallConfig;
use crate::error::DialerResult;
use crate::quality::WarningSample;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Registration state of the telephony capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Unregistered,
    Registering,
    Registered,
    Destroyed,
}

impl DeviceState {
    /// Able to receive calls
    pub fn is_ready(self) -> bool {
        self == DeviceState::Registered
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Unregistered => "unregistered",
            DeviceState::Registering => "registering",
            DeviceState::Registered => "registered",
            DeviceState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Codec and feature configuration passed to the capability
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOptions {
    pub codec_preferences: Vec<String>,
    pub enable_ringing_state: bool,
    pub dscp: bool,
}

impl From<&CallConfig> for DeviceOptions {
    fn from(config: &CallConfig) -> Self {
        Self {
            codec_preferences: config.codec_preferences.clone(),
            enable_ringing_state: config.enable_ringing_state,
            dscp: config.dscp,
        }
    }
}

/// Events raised by a call object
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Cancel,
    Disconnect,
    Reject,
    Accept,
    Error { message: String },
    Warning { name: String, sample: WarningSample },
    WarningCleared { name: String },
}

/// A call object owned by the capability
#[async_trait]
pub trait CallHandle: Send + Sync {
    /// Transport call identifier
    fn call_sid(&self) -> Option<String>;

    /// Number or client identity of the other party
    fn remote_party(&self) -> Option<String>;

    fn accept(&self) -> DialerResult<()>;

    fn reject(&self) -> DialerResult<()>;

    fn disconnect(&self) -> DialerResult<()>;

    fn mute(&self, muted: bool) -> DialerResult<()>;

    fn send_digits(&self, digits: &str) -> DialerResult<()>;

    /// Raw statistics reports, one JSON object per media stream
    async fn get_stats(&self) -> DialerResult<Vec<serde_json::Value>>;
}

/// A call handle together with its event feed
pub struct CallSession {
    pub handle: Arc<dyn CallHandle>,
    pub events: mpsc::UnboundedReceiver<CallEvent>,
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("call_sid", &self.handle.call_sid())
            .field("remote_party", &self.handle.remote_party())
            .finish()
    }
}

/// Events raised by the device
#[derive(Debug)]
pub enum DeviceEvent {
    Ready,
    Error { message: String },
    Incoming(CallSession),
    Connect { call_sid: Option<String> },
    Disconnect { call_sid: Option<String> },
}

/// The registered telephony capability
#[async_trait]
pub trait TelephonyDevice: Send + Sync {
    fn state(&self) -> DeviceState;

    async fn register(&self) -> DialerResult<()>;

    async fn unregister(&self) -> DialerResult<()>;

    fn destroy(&self);

    /// Swap the credential without touching a call in progress
    fn update_credential(&self, token: &str) -> DialerResult<()>;

    /// Place an outbound call
    async fn connect(&self, target: &str) -> DialerResult<CallSession>;
}

/// Builds devices from a credential
#[async_trait]
pub trait DeviceFactory: Send + Sync {
    async fn create(
        &self,
        token: &str,
        options: &DeviceOptions,
    ) -> DialerResult<(Arc<dyn TelephonyDevice>, mpsc::UnboundedReceiver<DeviceEvent>)>;
}
