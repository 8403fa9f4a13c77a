//! Connection channel
//!
//! The always-on signaling connection used for out-of-band inbound call
//! notices, with keepalive and bounded exponential reconnection.

mod backoff;
mod manager;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use manager::{ChannelManager, ConnectionStatus};
pub use transport::{wire, ChannelEvent, DisconnectReason, SignalingLink, SignalingTransport};
