//! Signaling channel port
//!
//! A [`SignalingTransport`] opens one [`SignalingLink`] per connect attempt and
//! hands back the stream of server events for that link. Links are never
//! reused; the manager opens a fresh one on every (re)connect.

use crate::error::DialerResult;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Client-emitted event names
pub mod wire {
    pub const REGISTER_CLIENT: &str = "register-client";
    pub const CALL_ANSWERED: &str = "call-answered";
    pub const CALL_REJECTED: &str = "call-rejected";
    pub const CALL_ENDED: &str = "call-ended";
    pub const PING: &str = "ping";
}

/// Why the channel dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the channel
    ServerDisconnect,
    /// We closed it
    ClientDisconnect,
    TransportClose,
    TransportError,
    PingTimeout,
    Other(String),
}

impl DisconnectReason {
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "io server disconnect" | "server disconnect" => DisconnectReason::ServerDisconnect,
            "io client disconnect" | "client disconnect" => DisconnectReason::ClientDisconnect,
            "transport close" => DisconnectReason::TransportClose,
            "transport error" => DisconnectReason::TransportError,
            "ping timeout" => DisconnectReason::PingTimeout,
            other => DisconnectReason::Other(other.to_string()),
        }
    }

    pub fn is_server_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ServerDisconnect)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerDisconnect => f.write_str("server disconnect"),
            DisconnectReason::ClientDisconnect => f.write_str("client disconnect"),
            DisconnectReason::TransportClose => f.write_str("transport close"),
            DisconnectReason::TransportError => f.write_str("transport error"),
            DisconnectReason::PingTimeout => f.write_str("ping timeout"),
            DisconnectReason::Other(s) => f.write_str(s),
        }
    }
}

/// Server-pushed events
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: DisconnectReason },
    ConnectError { message: String },
    Reconnected,
    RegistrationSuccess(Value),
    RegistrationError(Value),
    IncomingCall(Value),
    CallStatusUpdate(Value),
    Pong,
}

impl ChannelEvent {
    /// Map a named wire event; unknown names yield `None`
    pub fn from_wire(name: &str, payload: Value) -> Option<Self> {
        let event = match name {
            "connect" => ChannelEvent::Connected,
            "disconnect" => ChannelEvent::Disconnected {
                reason: DisconnectReason::from_wire(payload.as_str().unwrap_or_default()),
            },
            "connect_error" => ChannelEvent::ConnectError {
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| payload.as_str())
                    .unwrap_or("connect error")
                    .to_string(),
            },
            "reconnect" => ChannelEvent::Reconnected,
            "registration-success" => ChannelEvent::RegistrationSuccess(payload),
            "registration-error" => ChannelEvent::RegistrationError(payload),
            "incoming-call" => ChannelEvent::IncomingCall(payload),
            "call-status-update" => ChannelEvent::CallStatusUpdate(payload),
            "pong" => ChannelEvent::Pong,
            _ => return None,
        };
        Some(event)
    }
}

/// One open signaling connection
pub trait SignalingLink: Send + Sync {
    fn emit(&self, event: &str, payload: Value) -> DialerResult<()>;

    fn close(&self);

    fn is_connected(&self) -> bool;

    /// Transport-assigned identifier, if any
    fn id(&self) -> Option<String> {
        None
    }
}

/// Opens signaling links
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn open(&self) -> DialerResult<(Arc<dyn SignalingLink>, mpsc::UnboundedReceiver<ChannelEvent>)>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_disconnect_reasons() {
        assert!(DisconnectReason::from_wire("io server disconnect").is_server_initiated());
        assert!(DisconnectReason::from_wire("server disconnect").is_server_initiated());
        assert!(!DisconnectReason::from_wire("transport close").is_server_initiated());
        assert_eq!(
            DisconnectReason::from_wire("weird"),
            DisconnectReason::Other("weird".into())
        );
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(ChannelEvent::from_wire("pong", Value::Null), Some(ChannelEvent::Pong));
        assert_eq!(
            ChannelEvent::from_wire("connect_error", json!({ "message": "refused" })),
            Some(ChannelEvent::ConnectError {
                message: "refused".into()
            })
        );
        assert_eq!(
            ChannelEvent::from_wire("disconnect", json!("io server disconnect")),
            Some(ChannelEvent::Disconnected {
                reason: DisconnectReason::ServerDisconnect
            })
        );
        assert!(ChannelEvent::from_wire("mystery", Value::Null).is_none());
    }
}
