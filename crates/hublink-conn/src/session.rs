//! Reconnecting hub session.
//!
//! Owns at most one `ConnectionHandle`. When it reports a failed connect
//! or a lost connection, the handle is discarded and a new one is started
//! after a fixed retry interval, forever.

use crate::config::ConnectionConfig;
use crate::handle::{ConnectionHandle, ConnectionListener, StateKind};
use crate::transport::Transport;
use hublink_loop::{ExecutionLoop, LoopClient};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, Span};

/// Send access handed to session hooks.
pub trait HubSender {
    /// Send one frame payload; dropped if there is no connection.
    fn send(&self, data: Vec<u8>);

    fn has_connection(&self) -> bool;
}

/// Hooks a session user implements. All run on the session loop thread.
pub trait SessionEvents: Send + Sync {
    /// A new connection attempt has started. Anything sent here is
    /// delivered before any later send once the connection is up.
    fn on_restarted(&self, _hub: &dyn HubSender) {}

    fn on_packet(&self, _hub: &dyn HubSender, _payload: Vec<u8>) {}

    fn on_connect_failed(&self, _hub: &dyn HubSender) {}

    /// An established connection was lost.
    fn on_disconnected(&self, _hub: &dyn HubSender) {}
}

struct Connection {
    handle: Option<ConnectionHandle>,
    stopped: bool,
}

struct SessionInner {
    exec: Arc<ExecutionLoop>,
    /// Owns the retry task.
    client: LoopClient,
    host: String,
    port: u16,
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    events: Arc<dyn SessionEvents>,
    span: Span,
    connection: Mutex<Connection>,
    me: Weak<SessionInner>,
}

/// Auto-reconnecting connection to one hub endpoint.
pub struct HubSession {
    inner: Arc<SessionInner>,
}

impl HubSession {
    /// Start connecting right away. `on_restarted` runs before this returns.
    pub fn new(
        exec: Arc<ExecutionLoop>,
        host: impl Into<String>,
        port: u16,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        events: Arc<dyn SessionEvents>,
        span: Span,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| SessionInner {
            client: LoopClient::new(Arc::clone(&exec)),
            exec,
            host: host.into(),
            port,
            config,
            transport,
            events,
            span,
            connection: Mutex::new(Connection {
                handle: None,
                stopped: false,
            }),
            me: me.clone(),
        });

        inner.start_connecting();
        Self { inner }
    }

    pub fn send(&self, data: Vec<u8>) {
        self.inner.send(data);
    }

    pub fn has_connection(&self) -> bool {
        self.inner.has_connection()
    }

    /// State of the current connection, if one exists.
    pub fn state_kind(&self) -> Option<StateKind> {
        self.inner
            .connection
            .lock()
            .handle
            .as_ref()
            .map(ConnectionHandle::state_kind)
    }

    pub fn sender(&self) -> &dyn HubSender {
        &*self.inner
    }

    /// Send access for tasks that must not keep the session alive.
    pub fn downgrade(&self) -> SessionSender {
        SessionSender {
            session: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak send access to a `HubSession`. Sends after the session is gone
/// are dropped.
#[derive(Clone)]
pub struct SessionSender {
    session: Weak<SessionInner>,
}

impl HubSender for SessionSender {
    fn send(&self, data: Vec<u8>) {
        if let Some(session) = self.session.upgrade() {
            session.send(data);
        }
    }

    fn has_connection(&self) -> bool {
        self.session
            .upgrade()
            .is_some_and(|session| session.has_connection())
    }
}

impl Drop for HubSession {
    fn drop(&mut self) {
        let handle = {
            let mut connection = self.inner.connection.lock();
            connection.stopped = true;
            connection.handle.take()
        };
        self.inner.client.cancel_all();
        drop(handle);
        debug!(host = %self.inner.host, port = self.inner.port, "Hub session closed");
    }
}

impl SessionInner {
    fn start_connecting(&self) {
        let _entered = self.span.enter();

        let previous = {
            let mut connection = self.connection.lock();
            if connection.stopped {
                return;
            }
            connection.handle.take()
        };
        drop(previous);

        let listener = Arc::new(SessionListener {
            session: self.me.clone(),
        });
        let handle = ConnectionHandle::new(
            Arc::clone(&self.exec),
            self.host.clone(),
            self.port,
            self.config.clone(),
            Arc::clone(&self.transport),
            listener,
            self.span.clone(),
        );

        let mut connection = self.connection.lock();
        if connection.stopped {
            drop(connection);
            drop(handle);
            return;
        }
        connection.handle = Some(handle);
        drop(connection);

        info!(host = %self.host, port = self.port, "Connecting to hub");
        self.events.on_restarted(self);
    }

    /// Drop the dead handle, notify, and schedule the next attempt.
    fn restart_later(&self, disconnected: bool) {
        let _entered = self.span.enter();

        let (dead, stopped) = {
            let mut connection = self.connection.lock();
            (connection.handle.take(), connection.stopped)
        };
        drop(dead);
        if stopped {
            return;
        }

        if disconnected {
            self.events.on_disconnected(self);
        } else {
            self.events.on_connect_failed(self);
        }

        let retry = self.config.retry_interval();
        let me = self.me.clone();
        self.client.post_delayed(retry, move || {
            if let Some(session) = me.upgrade() {
                session.start_connecting();
            }
        });
        info!(retry_ms = retry.as_millis() as u64, "Reconnect scheduled");
    }
}

impl HubSender for SessionInner {
    fn send(&self, data: Vec<u8>) {
        match self.connection.lock().handle.as_ref() {
            Some(handle) => handle.send(data),
            None => trace!(len = data.len(), "No connection, dropping send"),
        }
    }

    fn has_connection(&self) -> bool {
        self.connection.lock().handle.is_some()
    }
}

/// Bridges handle events to the session without keeping it alive.
struct SessionListener {
    session: Weak<SessionInner>,
}

impl ConnectionListener for SessionListener {
    fn on_packet(&self, payload: Vec<u8>) {
        if let Some(session) = self.session.upgrade() {
            let _entered = session.span.enter();
            session.events.on_packet(&*session, payload);
        }
    }

    fn on_connect_failed(&self) {
        if let Some(session) = self.session.upgrade() {
            session.restart_later(false);
        }
    }

    fn on_disconnect(&self) {
        if let Some(session) = self.session.upgrade() {
            session.restart_later(true);
        }
    }
}
