//! Session resilience
//!
//! Activation, periodic health maintenance and deferred replay for the
//! logged-in operator.

mod deferred;
mod identity;
mod manager;

pub use deferred::{DeferredOp, DeferredOps};
pub use identity::{Credential, OperatorIdentity};
pub use manager::{ActivationState, SessionManager, SessionStatus};
