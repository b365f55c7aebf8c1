//! Connector registry: many tick sinks and trade connectors behind one loop.
//!
//! Sinks live on the loop thread and are driven by `RegistryCommand`s.
//! Trade connectors are created on the caller's thread so the engine can
//! use them right away, and are handed to the loop to be torn down.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::tick_sink::TickSink;
use crate::trade_connector::TradeConnector;
use hublink_conn::{ConnectionConfig, TcpTransport, Transport};
use hublink_core::Trade;
use hublink_loop::{ExecutionLoop, LoopThread};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Id of a sink or connector, unique within one registry.
pub type ConnectorId = u32;

/// Work executed on the registry loop.
pub enum RegistryCommand {
    CreateSink {
        id: ConnectorId,
        address: String,
        port: u16,
        key: String,
    },
    SendTick {
        id: ConnectorId,
        bid: f64,
        ask: f64,
    },
    FreeSink {
        id: ConnectorId,
    },
    /// Tear a trade connector down on the loop.
    ReleaseConnector {
        id: ConnectorId,
        connector: Box<TradeConnector>,
    },
}

/// Registry state touched only from loop tasks.
struct LoopSide {
    exec: Arc<ExecutionLoop>,
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    sinks: Mutex<HashMap<ConnectorId, TickSink>>,
}

impl LoopSide {
    fn handle(&self, command: RegistryCommand) {
        match command {
            RegistryCommand::CreateSink {
                id,
                address,
                port,
                key,
            } => {
                let sink = TickSink::new(
                    Arc::clone(&self.exec),
                    &address,
                    port,
                    &key,
                    self.config.clone(),
                    Arc::clone(&self.transport),
                );
                self.sinks.lock().insert(id, sink);
                debug!(id, addr = %address, port, key = %key, "Tick sink created");
            }
            RegistryCommand::SendTick { id, bid, ask } => {
                if let Some(sink) = self.sinks.lock().get(&id) {
                    sink.send_tick(bid, ask);
                }
            }
            RegistryCommand::FreeSink { id } => {
                let sink = self.sinks.lock().remove(&id);
                if sink.is_some() {
                    drop(sink);
                    debug!(id, "Tick sink freed");
                }
            }
            RegistryCommand::ReleaseConnector { id, connector } => {
                drop(connector);
                debug!(id, "Trade connector freed");
            }
        }
    }
}

/// Owns the loop thread and every sink and connector created through it.
///
/// Any call naming an unknown id does nothing and returns a default.
pub struct ConnectorRegistry {
    exec: Arc<ExecutionLoop>,
    loop_side: Arc<LoopSide>,
    next_id: AtomicU32,
    connectors: Mutex<HashMap<ConnectorId, TradeConnector>>,
    thread: Option<LoopThread>,
}

impl ConnectorRegistry {
    /// Registry dialing over plain TCP.
    pub fn new(config: ConnectionConfig) -> AppResult<Self> {
        let transport = Arc::new(TcpTransport::new(config.connect_timeout()));
        Self::with_transport(config, transport)
    }

    /// Registry dialing through `transport`, e.g. a scripted one in tests.
    pub fn with_transport(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
    ) -> AppResult<Self> {
        let exec = Arc::new(ExecutionLoop::new());
        let thread = LoopThread::spawn("hublink-registry", Arc::clone(&exec))?;

        Ok(Self {
            loop_side: Arc::new(LoopSide {
                exec: Arc::clone(&exec),
                config,
                transport,
                sinks: Mutex::new(HashMap::new()),
            }),
            exec,
            next_id: AtomicU32::new(0),
            connectors: Mutex::new(HashMap::new()),
            thread: Some(thread),
        })
    }

    /// Registry for the endpoint tunables of an app config.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Self::new(config.connection.clone())
    }

    /// Run `command` on the registry loop.
    pub fn dispatch(&self, command: RegistryCommand) {
        let loop_side = Arc::clone(&self.loop_side);
        self.exec.post(move || loop_side.handle(command));
    }

    fn allocate_id(&self) -> ConnectorId {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    // ========================================================================
    // Tick sinks
    // ========================================================================

    /// Start a tick sink on the loop. The id is usable immediately.
    pub fn create_ticks_sink(&self, address: &str, port: u16, key: &str) -> ConnectorId {
        let id = self.allocate_id();
        self.dispatch(RegistryCommand::CreateSink {
            id,
            address: address.to_string(),
            port,
            key: key.to_string(),
        });
        id
    }

    /// Stream one bid/ask pair through sink `id`.
    pub fn send_tick(&self, id: ConnectorId, bid: f64, ask: f64) {
        self.dispatch(RegistryCommand::SendTick { id, bid, ask });
    }

    /// Close sink `id` once the ticks queued before this call are handled.
    pub fn free_ticks_sink(&self, id: ConnectorId) {
        self.dispatch(RegistryCommand::FreeSink { id });
    }

    // ========================================================================
    // Trade connectors
    // ========================================================================

    /// Create a trade connector and start connecting it. Usable from the
    /// calling thread as soon as this returns.
    pub fn create_trade_connector(
        &self,
        address: &str,
        port: u16,
        key: &str,
        balance: f64,
        equity: f64,
    ) -> ConnectorId {
        let id = self.allocate_id();
        let connector = TradeConnector::new(
            Arc::clone(&self.exec),
            address,
            port,
            key,
            balance,
            equity,
            self.loop_side.config.clone(),
            Arc::clone(&self.loop_side.transport),
        );
        self.connectors.lock().insert(id, connector);
        info!(id, addr = %address, port, key = %key, "Trade connector created");
        id
    }

    /// Remove connector `id` and tear it down on the loop.
    pub fn free_trade_connector(&self, id: ConnectorId) {
        let connector = self.connectors.lock().remove(&id);
        if let Some(connector) = connector {
            self.dispatch(RegistryCommand::ReleaseConnector {
                id,
                connector: Box::new(connector),
            });
        }
    }

    /// Run `f` on a trade connector. `None` if the id is unknown.
    pub fn with_trade_connector<R>(
        &self,
        id: ConnectorId,
        f: impl FnOnce(&mut TradeConnector) -> R,
    ) -> Option<R> {
        self.connectors.lock().get_mut(&id).map(f)
    }

    /// See `TradeConnector::start_iteration`.
    pub fn start_iteration(&self, id: ConnectorId) {
        self.with_trade_connector(id, TradeConnector::start_iteration);
    }

    /// `false` when the iteration is done or the id is unknown.
    pub fn shift_to_next(&self, id: ConnectorId) -> bool {
        self.with_trade_connector(id, TradeConnector::shift_to_next)
            .unwrap_or(false)
    }

    /// Run `f` on the selected trade of a connector.
    pub fn with_current_trade<R>(
        &self,
        id: ConnectorId,
        f: impl FnOnce(&mut Trade) -> R,
    ) -> Option<R> {
        self.with_trade_connector(id, |connector| connector.with_current_trade(f))
            .flatten()
    }

    /// Free the selected trade of connector `id`.
    pub fn free_trade(&self, id: ConnectorId) {
        self.with_trade_connector(id, TradeConnector::free_trade);
    }

    /// Report the selected trade as opened.
    pub fn notify_opened(&self, id: ConnectorId) {
        self.with_trade_connector(id, |connector| connector.notify_opened());
    }

    /// Report the selected trade as closed outside the hub.
    pub fn notify_closed(&self, id: ConnectorId) {
        self.with_trade_connector(id, |connector| connector.notify_closed());
    }

    /// Store and announce a new account balance.
    pub fn update_balance(&self, id: ConnectorId, balance: f64) {
        self.with_trade_connector(id, |connector| connector.update_balance(balance));
    }

    /// Store and announce a new account equity.
    pub fn update_equity(&self, id: ConnectorId, equity: f64) {
        self.with_trade_connector(id, |connector| connector.update_equity(equity));
    }

    /// Send a note about the selected trade.
    pub fn trade_message(&self, id: ConnectorId, text: &str) {
        self.with_trade_connector(id, |connector| connector.trade_message(text));
    }

    /// Log under the connector's span only.
    pub fn log_message(&self, id: ConnectorId, text: &str) {
        self.with_trade_connector(id, |connector| connector.log_message(text));
    }

    /// Trade connectors currently registered.
    pub fn trade_connector_count(&self) -> usize {
        self.connectors.lock().len()
    }
}

impl Drop for ConnectorRegistry {
    fn drop(&mut self) {
        // Stop the loop first so no callback races the teardown below.
        drop(self.thread.take());

        let connectors: Vec<_> = self.connectors.lock().drain().map(|(_, c)| c).collect();
        let sinks: Vec<_> = self.loop_side.sinks.lock().drain().map(|(_, s)| s).collect();
        let freed = connectors.len() + sinks.len();
        drop(connectors);
        drop(sinks);
        info!(freed, "Connector registry closed");
    }
}
