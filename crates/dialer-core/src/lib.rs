//! Dialer core: session resilience for a softphone operator
//!
//! Keeps one logged-in operator reachable for inbound calls over unreliable
//! networks. The crate is split into four cooperating components that talk
//! only through a shared event bus:
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │  SessionManager  │  activation, health loops, deferred replay
//!                 └────────┬─────────┘
//!        ┌─────────────────┼──────────────────┐
//! ┌──────▼──────┐   ┌──────▼───────┐   ┌──────▼───────┐
//! │ CallManager │   │ChannelManager│   │QualityEngine │
//! └──────┬──────┘   └──────┬───────┘   └──────────────┘
//!   telephony device   signaling channel
//! ```
//!
//! The telephony device, signaling transport, credential service and UI are
//! ports ([`TelephonyDevice`], [`SignalingTransport`], [`CredentialProvider`],
//! [`DialerView`]) supplied by the embedding application. [`DialerBuilder`]
//! wires everything together.

pub mod call;
pub mod channel;
pub mod config;
pub mod device;
pub mod dialer;
pub mod error;
pub mod events;
pub mod logging;
pub mod phone;
pub mod provider;
pub mod quality;
pub mod scheduler;
pub mod session;
pub mod view;

pub use call::{Call, CallDirection, CallId, CallManager, CallStatsSample, CallStatus, EndReason};
pub use channel::{
    ChannelEvent, ChannelManager, ConnectionStatus, DisconnectReason, ReconnectPolicy, SignalingLink,
    SignalingTransport,
};
pub use config::{CallConfig, ChannelConfig, DialerConfig, QualityConfig, SessionConfig};
pub use device::{
    CallEvent, CallHandle, CallSession, DeviceEvent, DeviceFactory, DeviceOptions, DeviceState,
    TelephonyDevice,
};
pub use dialer::{Dialer, DialerBuilder};
pub use error::{DialerError, DialerResult};
pub use events::{ActivityEntry, ActivityLevel, DialerEvent, EventEmitter, EventStream};
pub use logging::{parse_log_level, setup_logging, LoggingConfig};
pub use provider::{
    CallHistoryEntry, CredentialGrant, CredentialProvider, HttpCredentialProvider, OperatorRecord,
    OperatorStatus,
};
pub use quality::{
    NetworkInfoSource, NetworkMetrics, QualityEngine, QualityReport, QualityScores, QualityThresholds,
    SignalStrength, StaticNetworkInfo,
};
pub use scheduler::Scheduler;
pub use session::{ActivationState, DeferredOp, OperatorIdentity, SessionManager, SessionStatus};
pub use view::{ActivityLog, DialerView, HeadlessView, Notifier, SilentNotifier, ViewBridge};

/// Dialer-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
