//! Connection error types.
//!
//! These never cross the `ConnectionHandle` boundary: each one ends up as
//! a state transition, a log line and a metrics label.

use hublink_loop::LoopError;
use hublink_wire::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Socket IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Failed to start {what} thread: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Writer loop error: {0}")]
    Loop(#[from] LoopError),
}

impl ConnError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Io(_) => "io",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Wire(_) => "protocol",
            Self::Spawn { .. } | Self::Loop(_) => "spawn",
        }
    }
}

pub type ConnResult<T> = Result<T, ConnError>;
