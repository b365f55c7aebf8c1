//! Connection handle and its state-switch protocol.
//!
//! A handle owns one current state and at most one pending successor.
//! States never replace themselves: they ask their `StateSwitcher`, which
//! stores the successor as pending and posts one apply task to the owning
//! loop. Dropping the old state and activating the new one only happen in
//! that task. A second request before the task runs replaces the pending
//! state, which is dropped without ever being activated.
//!
//! Each state carries the generation it was created for. Requests from a
//! state that is no longer the latest are ignored, which is what makes a
//! torn-down state's late callbacks harmless.

use crate::config::ConnectionConfig;
use crate::state::{Activation, ConnectionState, Connecting};
use crate::transport::Transport;
use hublink_loop::{ExecutionLoop, LoopClient};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{trace, Span};

/// Receives connection events, always on the owning loop thread.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionListener: Send + Sync {
    /// One non-heartbeat frame payload.
    fn on_packet(&self, payload: Vec<u8>);
    /// The connect attempt failed. Fired at most once per handle.
    fn on_connect_failed(&self);
    /// An established connection was lost. Fired at most once per handle.
    fn on_disconnect(&self);
}

/// Which state a handle is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Connecting,
    Connected,
    ConnectFailed,
    Disconnected,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ConnectFailed => "connect_failed",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Read-only bundle shared by every state of one handle.
pub(crate) struct Context {
    pub exec: Arc<ExecutionLoop>,
    pub host: String,
    pub port: u16,
    pub config: ConnectionConfig,
    pub transport: Arc<dyn Transport>,
    pub listener: Arc<dyn ConnectionListener>,
    pub span: Span,
}

#[derive(Default)]
struct Slots {
    current: Option<ConnectionState>,
    pending: Option<ConnectionState>,
    /// Generation of the latest state (pending if any, else current).
    generation: u64,
    apply_posted: bool,
    closed: bool,
}

pub(crate) struct HandleCore {
    ctx: Arc<Context>,
    slots: Mutex<Slots>,
    client: LoopClient,
}

/// Lets one state request its own replacement.
#[derive(Clone)]
pub(crate) struct StateSwitcher {
    core: Weak<HandleCore>,
    generation: u64,
}

impl StateSwitcher {
    /// Run `f` on the latest state if the owner of this switcher still is
    /// that state. `f` gets the switcher for a successor and may return
    /// one, which becomes the pending state. Runs under the handle lock.
    ///
    /// Returns `false` if the owner was already superseded or the handle
    /// is gone.
    pub fn with_live_state<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut ConnectionState, StateSwitcher) -> Option<ConnectionState>,
    {
        match self.core.upgrade() {
            Some(core) => core.switch_if_live(self.generation, f),
            None => false,
        }
    }
}

impl HandleCore {
    fn switch_if_live<F>(self: &Arc<Self>, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut ConnectionState, StateSwitcher) -> Option<ConnectionState>,
    {
        let stale = {
            let mut guard = self.slots.lock();
            let slots = &mut *guard;
            if slots.closed || slots.generation != generation {
                return false;
            }

            let next = StateSwitcher {
                core: Arc::downgrade(self),
                generation: generation + 1,
            };
            let Some(live) = slots.pending.as_mut().or(slots.current.as_mut()) else {
                return false;
            };
            let Some(successor) = f(live, next) else {
                return true;
            };

            trace!(from = %live_kind(slots), to = %successor.kind(), "State switch requested");
            slots.generation = generation + 1;
            let stale = slots.pending.replace(successor);
            if !slots.apply_posted {
                slots.apply_posted = true;
                self.post_apply();
            }
            stale
        };

        drop(stale);
        true
    }

    fn post_apply(self: &Arc<Self>) {
        let core = Arc::downgrade(self);
        self.client.post(move || {
            if let Some(core) = core.upgrade() {
                core.apply_pending();
            }
        });
    }

    /// Promote the pending state and activate it. Loop thread only.
    fn apply_pending(&self) {
        loop {
            let previous = {
                let mut slots = self.slots.lock();
                slots.apply_posted = false;
                let Some(next) = slots.pending.take() else {
                    return;
                };
                slots.current.replace(next)
            };
            // Joins worker threads that may be waiting for the slots lock.
            drop(previous);

            let activation = {
                let mut slots = self.slots.lock();
                if slots.pending.is_some() {
                    continue;
                }
                match slots.current.as_mut() {
                    Some(state) => state.activate(&self.ctx),
                    None => return,
                }
            };

            match activation {
                Activation::Ready => return,
                Activation::ConnectFailed => {
                    self.ctx.listener.on_connect_failed();
                    return;
                }
                Activation::Disconnected => {
                    self.ctx.listener.on_disconnect();
                    return;
                }
                Activation::Failed(replacement) => {
                    let mut slots = self.slots.lock();
                    if slots.closed || slots.pending.is_some() {
                        continue;
                    }
                    slots.generation += 1;
                    slots.pending = Some(*replacement);
                }
            }
        }
    }
}

fn live_kind(slots: &Slots) -> StateKind {
    slots
        .pending
        .as_ref()
        .or(slots.current.as_ref())
        .map_or(StateKind::Connecting, ConnectionState::kind)
}

/// One connection attempt and, if it succeeds, the connection itself.
///
/// Starts connecting as soon as it is created. Never reconnects: once it
/// reports `ConnectFailed` or `Disconnected` it stays there and drops
/// every send.
pub struct ConnectionHandle {
    core: Arc<HandleCore>,
}

impl ConnectionHandle {
    pub fn new(
        exec: Arc<ExecutionLoop>,
        host: impl Into<String>,
        port: u16,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        listener: Arc<dyn ConnectionListener>,
        span: Span,
    ) -> Self {
        let ctx = Arc::new(Context {
            exec: Arc::clone(&exec),
            host: host.into(),
            port,
            config,
            transport,
            listener,
            span,
        });
        let core = Arc::new(HandleCore {
            ctx: Arc::clone(&ctx),
            slots: Mutex::new(Slots::default()),
            client: LoopClient::new(exec),
        });

        {
            let mut slots = core.slots.lock();
            slots.generation = 1;
            let switcher = StateSwitcher {
                core: Arc::downgrade(&core),
                generation: 1,
            };
            slots.pending = Some(ConnectionState::Connecting(Connecting::new(ctx, switcher)));
            slots.apply_posted = true;
            core.post_apply();
        }

        Self { core }
    }

    /// Send one frame payload. Buffered while connecting, queued to the
    /// writer once connected, dropped otherwise.
    pub fn send(&self, data: Vec<u8>) {
        let mut guard = self.core.slots.lock();
        let slots = &mut *guard;
        if let Some(state) = slots.pending.as_mut().or(slots.current.as_mut()) {
            state.send(data);
        }
    }

    /// The active state. Before the first apply task has run this is the
    /// initial `Connecting`.
    pub fn state_kind(&self) -> StateKind {
        let slots = self.core.slots.lock();
        slots
            .current
            .as_ref()
            .or(slots.pending.as_ref())
            .map_or(StateKind::Connecting, ConnectionState::kind)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let (pending, current) = {
            let mut slots = self.core.slots.lock();
            slots.closed = true;
            slots.generation += 1;
            (slots.pending.take(), slots.current.take())
        };
        self.core.client.cancel_all();

        drop(pending);
        drop(current);
    }
}
