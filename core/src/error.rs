//! Error types for dlt-node-core

use std::time::Duration;

use thiserror::Error;

use crate::traits::BusError;

/// Core error type
#[derive(Error, Debug)]
pub enum NodeError {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Inbound command was missing fields or carried mistyped values
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A script instance could not be created for a slot
    #[error("plugin load failed on slot {slot}: {message}")]
    PluginLoad {
        /// Slot index that failed
        slot: usize,
        /// Backend error message
        message: String,
    },

    /// A script invocation failed
    #[error("invocation failed on slot {slot}: {message}")]
    Invocation {
        /// Slot index that failed
        slot: usize,
        /// Backend error message
        message: String,
    },

    /// A script invocation did not return within the configured limit
    #[error("invocation on slot {slot} exceeded {timeout:?}")]
    InvocationTimeout {
        /// Slot index that timed out
        slot: usize,
        /// Configured limit
        timeout: Duration,
    },

    /// Publishing to the transport failed
    #[error("transport publish failed: {0}")]
    TransportPublish(#[from] BusError),

    /// Serialization error
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Payload could not be decoded
    #[error("decoding error: {0}")]
    Decode(String),

    /// A background task could not be joined
    #[error("task failed: {0}")]
    Task(String),
}

impl NodeError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration error for a missing builder field
    pub fn missing_config(field: &str) -> Self {
        Self::Config(format!("missing required field: {field}"))
    }

    /// Create an invalid-command error
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Create a plugin load error
    pub fn plugin_load(slot: usize, msg: impl Into<String>) -> Self {
        Self::PluginLoad {
            slot,
            message: msg.into(),
        }
    }

    /// Create an invocation error
    pub fn invocation(slot: usize, msg: impl Into<String>) -> Self {
        Self::Invocation {
            slot,
            message: msg.into(),
        }
    }

    /// Whether this error ends the session it occurred in
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::PluginLoad { .. }
                | NodeError::Invocation { .. }
                | NodeError::InvocationTimeout { .. }
        )
    }
}

/// Result type alias
pub type NodeResult<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fatal_classification() {
        assert!(NodeError::plugin_load(0, "syntax").is_session_fatal());
        assert!(NodeError::invocation(3, "boom").is_session_fatal());
        assert!(NodeError::InvocationTimeout {
            slot: 1,
            timeout: Duration::from_secs(2)
        }
        .is_session_fatal());

        assert!(!NodeError::config("bad").is_session_fatal());
        assert!(!NodeError::invalid_command("no tps").is_session_fatal());
        assert!(!NodeError::TransportPublish(BusError::Closed).is_session_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = NodeError::invocation(2, "ReferenceError: x is not defined");
        assert_eq!(
            err.to_string(),
            "invocation failed on slot 2: ReferenceError: x is not defined"
        );

        let err = NodeError::missing_config("factory");
        assert!(err.to_string().contains("factory"));
    }
}
