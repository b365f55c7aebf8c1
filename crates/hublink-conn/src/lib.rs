//! Resilient TCP connection to a hublink hub.
//!
//! Provides:
//! - `ConnectionHandle`: one connect attempt and the resulting connection,
//!   driven by a state machine whose switches run on the owning loop
//! - `Heartbeat`: keepalive and timeout detection for a live connection
//! - `HubSession`: restarts a handle at a fixed interval after failures
//! - `Transport` / `Socket`: the byte-stream capability, with a TCP
//!   implementation

pub mod config;
pub mod error;
pub mod handle;
pub mod heartbeat;
pub mod session;
mod state;
pub mod transport;

pub use config::ConnectionConfig;
pub use error::{ConnError, ConnResult};
pub use handle::{ConnectionHandle, ConnectionListener, StateKind};
pub use heartbeat::{Heartbeat, HeartbeatSink};
pub use session::{HubSender, HubSession, SessionEvents, SessionSender};
pub use transport::{Socket, TcpTransport, Transport};
