//! Connection states.

use crate::error::{ConnError, ConnResult};
use crate::handle::{Context, StateKind, StateSwitcher};
use crate::heartbeat::{Heartbeat, HeartbeatSink};
use crate::transport::Socket;
use hublink_loop::{ExecutionLoop, LoopClient, LoopThread};
use hublink_telemetry::Metrics;
use hublink_wire::{encode_frame, parse_frame_len, FRAME_HEADER_LEN};
use parking_lot::Mutex;
use std::mem;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

pub(crate) enum ConnectionState {
    Connecting(Connecting),
    Connected(Connected),
    ConnectFailed(ConnError),
    Disconnected(ConnError),
}

/// Result of activating a state on the loop thread.
pub(crate) enum Activation {
    Ready,
    /// Tell the listener the connect attempt failed.
    ConnectFailed,
    /// Tell the listener the connection was lost.
    Disconnected,
    /// The state could not start; switch to this one instead.
    Failed(Box<ConnectionState>),
}

impl ConnectionState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Connecting(_) => StateKind::Connecting,
            Self::Connected(_) => StateKind::Connected,
            Self::ConnectFailed(_) => StateKind::ConnectFailed,
            Self::Disconnected(_) => StateKind::Disconnected,
        }
    }

    /// Called once, on the loop thread, under the handle lock.
    pub fn activate(&mut self, ctx: &Arc<Context>) -> Activation {
        let _entered = ctx.span.enter();
        match self {
            Self::Connecting(connecting) => connecting.activate(),
            Self::Connected(connected) => connected.activate(ctx),
            Self::ConnectFailed(error) => {
                warn!(error = %error, "Connect failed");
                Metrics::connect_failed();
                Activation::ConnectFailed
            }
            Self::Disconnected(error) => {
                debug!(error = %error, "Disconnected");
                Activation::Disconnected
            }
        }
    }

    pub fn send(&mut self, data: Vec<u8>) {
        match self {
            Self::Connecting(connecting) => connecting.delayed.push(data),
            Self::Connected(connected) => connected.io.send(data),
            Self::ConnectFailed(_) | Self::Disconnected(_) => {
                trace!(len = data.len(), "Dropping send on dead connection");
            }
        }
    }
}

// ============================================================================
// Connecting
// ============================================================================

/// Opens the socket on a worker thread and buffers sends meanwhile.
///
/// The worker is detached when this state is dropped: a blocking connect
/// cannot be interrupted. Its late result is discarded by the switcher.
pub(crate) struct Connecting {
    ctx: Arc<Context>,
    switcher: StateSwitcher,
    delayed: Vec<Vec<u8>>,
}

impl Connecting {
    pub fn new(ctx: Arc<Context>, switcher: StateSwitcher) -> Self {
        Self {
            ctx,
            switcher,
            delayed: Vec::new(),
        }
    }

    fn activate(&mut self) -> Activation {
        let ctx = Arc::clone(&self.ctx);
        let switcher = self.switcher.clone();

        let spawned = thread::Builder::new()
            .name("hublink-connect".to_string())
            .spawn(move || connect_worker(ctx, switcher));

        match spawned {
            Ok(_detached) => Activation::Ready,
            Err(source) => Activation::Failed(Box::new(ConnectionState::ConnectFailed(
                ConnError::Spawn {
                    what: "connect",
                    source,
                },
            ))),
        }
    }
}

fn connect_worker(ctx: Arc<Context>, switcher: StateSwitcher) {
    let _entered = ctx.span.enter();
    Metrics::connect_attempt();
    debug!(host = %ctx.host, port = ctx.port, "Connecting");

    match ctx.transport.connect(&ctx.host, ctx.port) {
        Ok(socket) => {
            let mut unclaimed = Some(socket);
            switcher.with_live_state(|state, next| {
                let ConnectionState::Connecting(connecting) = state else {
                    return None;
                };
                let socket = unclaimed.take()?;
                let delayed = mem::take(&mut connecting.delayed);
                Some(ConnectionState::Connected(Connected::new(
                    &ctx, next, socket, delayed,
                )))
            });
            if let Some(socket) = unclaimed {
                debug!("Connect finished after teardown, closing socket");
                socket.close();
            }
        }
        Err(source) => {
            let error = ConnError::Connect {
                addr: format!("{}:{}", ctx.host, ctx.port),
                source,
            };
            let mut error = Some(error);
            switcher.with_live_state(|_, _| error.take().map(ConnectionState::ConnectFailed));
        }
    }
}

// ============================================================================
// Connected
// ============================================================================

/// Live socket with one reader thread, one writer thread and a heartbeat.
pub(crate) struct Connected {
    io: Arc<ConnectedIo>,
    heartbeat: Option<Arc<Heartbeat>>,
    writer: Option<LoopThread>,
    reader: Option<JoinHandle<()>>,
    live: bool,
}

/// Parts of `Connected` shared with its worker threads.
struct ConnectedIo {
    socket: Arc<dyn Socket>,
    /// Serialized send queue drained by the writer thread.
    send_exec: Arc<ExecutionLoop>,
    /// Delivers inbound frames on the connection loop.
    deliveries: LoopClient,
    closed: Mutex<bool>,
    switcher: StateSwitcher,
    max_frame_len: usize,
    me: Weak<ConnectedIo>,
}

impl Connected {
    /// Buffered sends are queued before anything else can be.
    fn new(
        ctx: &Arc<Context>,
        switcher: StateSwitcher,
        socket: Arc<dyn Socket>,
        delayed: Vec<Vec<u8>>,
    ) -> Self {
        let io = Arc::new_cyclic(|me| ConnectedIo {
            socket,
            send_exec: Arc::new(ExecutionLoop::new()),
            deliveries: LoopClient::new(Arc::clone(&ctx.exec)),
            closed: Mutex::new(false),
            switcher,
            max_frame_len: ctx.config.max_frame_len,
            me: me.clone(),
        });
        for data in delayed {
            io.send(data);
        }

        Self {
            io,
            heartbeat: None,
            writer: None,
            reader: None,
            live: false,
        }
    }

    fn activate(&mut self, ctx: &Arc<Context>) -> Activation {
        match self.start_workers(ctx) {
            Ok(()) => {
                self.live = true;
                Metrics::connected();
                info!(host = %ctx.host, port = ctx.port, "Connected");
                Activation::Ready
            }
            Err(error) => {
                error!(error = %error, "Failed to start connection workers");
                self.io.close();
                Activation::Failed(Box::new(ConnectionState::Disconnected(error)))
            }
        }
    }

    fn start_workers(&mut self, ctx: &Arc<Context>) -> ConnResult<()> {
        let writer = LoopThread::spawn("hublink-writer", Arc::clone(&self.io.send_exec))?;
        self.writer = Some(writer);

        let heartbeat = Heartbeat::new(
            Arc::clone(&ctx.exec),
            ctx.config.heartbeat_interval(),
            ctx.config.heartbeat_timeout(),
            Arc::clone(&self.io) as Arc<dyn HeartbeatSink>,
        );

        let io = Arc::clone(&self.io);
        let weak_heartbeat = Arc::downgrade(&heartbeat);
        let ctx_for_reader = Arc::clone(ctx);
        let reader = thread::Builder::new()
            .name("hublink-reader".to_string())
            .spawn(move || read_loop(io, weak_heartbeat, ctx_for_reader))
            .map_err(|source| ConnError::Spawn {
                what: "reader",
                source,
            })?;
        self.reader = Some(reader);

        heartbeat.start();
        self.heartbeat = Some(heartbeat);
        Ok(())
    }
}

impl Drop for Connected {
    fn drop(&mut self) {
        self.io.close();

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        drop(self.writer.take());
        if let Some(reader) = self.reader.take() {
            if reader.thread().id() != thread::current().id() && reader.join().is_err() {
                error!("Reader thread panicked");
            }
        }

        if self.live {
            Metrics::connection_closed();
            debug!("Connection closed");
        }
    }
}

fn read_loop(io: Arc<ConnectedIo>, heartbeat: Weak<Heartbeat>, ctx: Arc<Context>) {
    let _entered = ctx.span.enter();

    let error = loop {
        match io.read_frame() {
            Ok(frame) => {
                Metrics::frame_received();
                let heartbeat = heartbeat.clone();
                let listener = Arc::clone(&ctx.listener);
                io.deliveries.post(move || {
                    // Gone with its state: the frame belongs to a dead connection.
                    let Some(heartbeat) = heartbeat.upgrade() else {
                        return;
                    };
                    if !heartbeat.is_heartbeat(&frame) {
                        listener.on_packet(frame);
                    }
                });
            }
            Err(error) => break error,
        }
    };

    io.fail(error);
}

impl ConnectedIo {
    fn read_frame(&self) -> ConnResult<Vec<u8>> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        self.socket.read_exact(&mut header)?;
        let len = parse_frame_len(header, self.max_frame_len)?;

        let mut payload = vec![0u8; len];
        self.socket.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn send(&self, data: Vec<u8>) {
        let closed = self.closed.lock();
        if *closed {
            trace!(len = data.len(), "Dropping send on closed connection");
            return;
        }

        let io = self.me.clone();
        self.send_exec.post(move || {
            if let Some(io) = io.upgrade() {
                io.write_frame(&data);
            }
        });
    }

    /// Writer thread only.
    fn write_frame(&self, data: &[u8]) {
        let written = encode_frame(data)
            .map_err(ConnError::Wire)
            .and_then(|frame| self.socket.write_all(&frame).map_err(ConnError::Io));
        match written {
            Ok(()) => Metrics::frame_sent(),
            Err(e) => self.fail(e),
        }
    }

    /// Close the socket and stop the writer. Returns `false` if already
    /// closed.
    fn close(&self) -> bool {
        let mut closed = self.closed.lock();
        if *closed {
            return false;
        }
        *closed = true;
        self.socket.close();
        self.send_exec.terminate();
        true
    }

    /// Switch to `Disconnected`, at most once and only while this
    /// connection is the latest state.
    fn fail(&self, error: ConnError) {
        let mut error = Some(error);
        self.switcher.with_live_state(|_, _| {
            if !self.close() {
                return None;
            }
            let error = error.take()?;
            warn!(error = %error, "Connection lost");
            Metrics::disconnected(error.reason());
            Some(ConnectionState::Disconnected(error))
        });
    }
}

impl HeartbeatSink for ConnectedIo {
    fn send_heartbeat(&self) {
        self.send(Vec::new());
    }

    fn on_timeout(&self) {
        Metrics::heartbeat_timeout();
        self.fail(ConnError::HeartbeatTimeout);
    }
}
