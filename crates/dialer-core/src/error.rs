//! Error types for the dialer core
//!
//! Errors are grouped so callers can decide how to react:
//!
//! - **Network** - channel disconnects, connect timeouts, stale keepalives.
//!   Retried automatically with bounded backoff.
//! - **Device** - telephony capability registration or initialization failures.
//!   Surfaced to the operator; activation is aborted and may be retried.
//! - **Call** - operations on a call that does not exist or is in the wrong state.
//! - **Credential** - the credential/history service refused or failed a request.
//! - **Validation** - bad input (empty operator name, empty call target). Rejected
//!   before any side effect happens.
//!
//! ```rust
//! use rvoip_dialer_core::DialerError;
//!
//! let err = DialerError::network("channel closed");
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "network");
//! ```

use thiserror::Error;

/// Result type alias for dialer operations
pub type DialerResult<T> = Result<T, DialerError>;

/// Errors produced by the dialer core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DialerError {
    /// Signaling channel errors
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    #[error("Connection already in progress")]
    ConnectInProgress,

    #[error("Channel not connected")]
    NotConnected,

    /// Telephony capability errors
    #[error("Device error: {reason}")]
    Device { reason: String },

    #[error("Device not initialized")]
    DeviceNotInitialized,

    #[error("Device registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// Call errors
    #[error("No active call")]
    NoActiveCall,

    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: String },

    #[error("Call already exists: {call_id}")]
    CallAlreadyExists { call_id: String },

    #[error("Invalid call transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Session errors
    #[error("Activation already in progress")]
    ActivationInProgress,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Session not active")]
    SessionInactive,

    /// Credential/history service errors
    #[error("Credential service error during {operation}: {reason}")]
    Provider { operation: String, reason: String },

    /// Input validation errors
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DialerError {
    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network { reason: reason.into() }
    }

    /// Create a device error
    pub fn device(reason: impl Into<String>) -> Self {
        Self::Device { reason: reason.into() }
    }

    /// Create a registration failed error
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed { reason: reason.into() }
    }

    /// Create a credential service error
    pub fn provider(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if this error is worth retrying on the next cycle
    pub fn is_recoverable(&self) -> bool {
        match self {
            DialerError::Network { .. }
            | DialerError::ConnectionTimeout { .. }
            | DialerError::NotConnected
            | DialerError::Provider { .. }
            | DialerError::RegistrationFailed { .. } => true,

            DialerError::Validation { .. }
            | DialerError::InvalidConfiguration { .. }
            | DialerError::NotLoggedIn => false,

            _ => false,
        }
    }

    /// Check if error is call-related
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            DialerError::NoActiveCall
                | DialerError::CallNotFound { .. }
                | DialerError::CallAlreadyExists { .. }
                | DialerError::InvalidTransition { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            DialerError::Network { .. }
            | DialerError::ConnectionTimeout { .. }
            | DialerError::ConnectInProgress
            | DialerError::NotConnected => "network",

            DialerError::Device { .. }
            | DialerError::DeviceNotInitialized
            | DialerError::RegistrationFailed { .. } => "device",

            DialerError::NoActiveCall
            | DialerError::CallNotFound { .. }
            | DialerError::CallAlreadyExists { .. }
            | DialerError::InvalidTransition { .. } => "call",

            DialerError::ActivationInProgress
            | DialerError::NotLoggedIn
            | DialerError::SessionInactive => "session",

            DialerError::Provider { .. } => "credential",

            DialerError::Validation { .. } => "validation",

            DialerError::InvalidConfiguration { .. } => "configuration",

            DialerError::Internal { .. } => "system",
        }
    }
}

impl From<reqwest::Error> for DialerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DialerError::network(format!("request timed out: {}", err))
        } else {
            DialerError::network(err.to_string())
        }
    }
}

impl From<toml::de::Error> for DialerError {
    fn from(err: toml::de::Error) -> Self {
        DialerError::config("toml", err.to_string())
    }
}
