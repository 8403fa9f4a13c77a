//! Call lifecycle
//!
//! One call at a time, driven by telephony device events and local operator
//! actions (answer, reject, hang up, mute, DTMF).

mod manager;
pub mod state;
pub mod stats;

pub use manager::CallManager;
pub use state::{format_duration, Call, CallDirection, CallId, CallStatus, EndReason};
pub use stats::{parse_stat_value, parse_stats, CallStatsSample};
