//! Error types for tool client connections.

use thiserror::Error;

/// A tool server could not be brought up.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server process could not be spawned.
    #[error("failed to spawn tool server '{server}': {reason}")]
    Spawn { server: String, reason: String },

    /// The process started but the protocol handshake failed.
    #[error("handshake with tool server '{server}' failed: {reason}")]
    Handshake { server: String, reason: String },

    /// The server did not finish starting within the connect timeout.
    #[error("tool server '{server}' did not connect within {secs}s")]
    Timeout { server: String, secs: u64 },

    /// The handle was already closed; closed handles never reopen.
    #[error("tool server '{server}' handle is closed")]
    Closed { server: String },
}

impl ConnectionError {
    pub fn spawn(server: impl Into<String>, reason: impl ToString) -> Self {
        Self::Spawn {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    pub fn handshake(server: impl Into<String>, reason: impl ToString) -> Self {
        Self::Handshake {
            server: server.into(),
            reason: reason.to_string(),
        }
    }
}

/// A call on an open (or supposedly open) tool server failed.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The handle is not in the `Open` state.
    #[error("tool server '{server}' is not open")]
    NotOpen { server: String },

    /// Transport or protocol failure during the call.
    #[error("call to '{server}.{tool}' failed: {reason}")]
    CallFailed {
        server: String,
        tool: String,
        reason: String,
    },
}

impl InvocationError {
    pub fn call_failed(
        server: impl Into<String>,
        tool: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::CallFailed {
            server: server.into(),
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}
