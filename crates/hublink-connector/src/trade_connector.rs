//! Trade lifecycle bridge between the hub and a trading engine.
//!
//! The hub side runs on the registry loop: it answers id requests and turns
//! trade packets into ledger mutations. The engine side is driven from the
//! engine thread once per iteration; everything it reports goes through
//! tasks posted onto the same loop, so traffic for one connector keeps its
//! order.

use hublink_conn::{
    ConnectionConfig, HubSender, HubSession, SessionEvents, SessionSender, Transport,
};
use hublink_core::{Trade, TradeId};
use hublink_ledger::{LedgerProducer, TradeLedger, TradeUpdate};
use hublink_loop::{ExecutionLoop, LoopClient};
use hublink_wire::{InboundPacket, OutboundPacket};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Span};

// ============================================================================
// Hub side
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Account {
    balance: f64,
    equity: f64,
}

/// Reacts to hub traffic. Runs on the loop thread.
struct HubSide {
    key: String,
    account: Mutex<Account>,
    producer: LedgerProducer,
}

impl HubSide {
    fn new(key: &str, balance: f64, equity: f64, producer: LedgerProducer) -> Self {
        Self {
            key: key.to_string(),
            account: Mutex::new(Account { balance, equity }),
            producer,
        }
    }

    fn dispatch(&self, hub: &dyn HubSender, packet: InboundPacket) {
        match packet {
            InboundPacket::RequestNewId => {
                // Above every id handed out or announced so far.
                let id = self.producer.highest_id() + 1;
                self.producer.observe_id(id);
                debug!(trade_id = id, "Issuing trade id");
                hub.send(OutboundPacket::NewId { id }.encode());
            }
            InboundPacket::OpenTrade {
                id,
                request,
                stop,
                take_profit,
            } => {
                info!(
                    trade_id = id,
                    trade_type = %request.trade_type,
                    value = request.value,
                    stop = %stop,
                    "Open trade requested"
                );
                self.producer
                    .post_add(Trade::new(id, request, stop, take_profit));
            }
            InboundPacket::CloseRequest { id } => {
                debug!(trade_id = id, "Close requested");
                self.producer.post_modify(id, TradeUpdate::WantsClose);
            }
            InboundPacket::UpdateStopRequest { id, stop } => {
                debug!(trade_id = id, stop = %stop, "Stop update requested");
                self.producer
                    .post_modify(id, TradeUpdate::RequestedStop(stop));
            }
            InboundPacket::UpdateTakeProfitRequest { id, take_profit } => {
                debug!(trade_id = id, ?take_profit, "Take profit update requested");
                self.producer
                    .post_modify(id, TradeUpdate::RequestedTakeProfit(take_profit));
            }
        }
    }
}

impl SessionEvents for HubSide {
    fn on_restarted(&self, hub: &dyn HubSender) {
        let account = *self.account.lock();
        let register = OutboundPacket::RegisterTradeConnector {
            key: self.key.clone(),
            balance: account.balance,
            equity: account.equity,
        };
        hub.send(register.encode());
    }

    fn on_packet(&self, hub: &dyn HubSender, payload: Vec<u8>) {
        match InboundPacket::decode(&payload) {
            Ok(Some(packet)) => self.dispatch(hub, packet),
            Ok(None) => {}
            Err(e) => warn!(error = %e, len = payload.len(), "Malformed packet from hub, ignoring"),
        }
    }

    fn on_disconnected(&self, _hub: &dyn HubSender) {
        self.producer.mark_orphaned();
    }
}

// ============================================================================
// Engine side
// ============================================================================

/// One trade connector: a hub session plus the trade set the engine works
/// through.
///
/// Owned by the engine thread.
pub struct TradeConnector {
    hub: Arc<HubSide>,
    ledger: TradeLedger,
    client: LoopClient,
    sender: SessionSender,
    span: Span,
    // Last field: queued notifications are cancelled before the session closes.
    _session: HubSession,
}

impl TradeConnector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exec: Arc<ExecutionLoop>,
        address: &str,
        port: u16,
        key: &str,
        balance: f64,
        equity: f64,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let span = info_span!("trade", addr = %address, port, key = %key);
        let ledger = TradeLedger::new();
        let hub = Arc::new(HubSide::new(key, balance, equity, ledger.producer()));
        let session = HubSession::new(
            Arc::clone(&exec),
            address,
            port,
            config,
            transport,
            Arc::clone(&hub) as Arc<dyn SessionEvents>,
            span.clone(),
        );

        Self {
            hub,
            ledger,
            client: LoopClient::new(exec),
            sender: session.downgrade(),
            span,
            _session: session,
        }
    }

    pub fn key(&self) -> &str {
        &self.hub.key
    }

    pub fn balance(&self) -> f64 {
        self.hub.account.lock().balance
    }

    pub fn equity(&self) -> f64 {
        self.hub.account.lock().equity
    }

    /// Trades held right now, including ones not yet visited this iteration.
    pub fn trade_count(&self) -> usize {
        self.ledger.len()
    }

    /// Highest id at the last disconnect, if any.
    pub fn orphan_watermark(&self) -> Option<TradeId> {
        self.hub.producer.watermark()
    }

    /// Apply what the hub sent since the last iteration and snapshot the
    /// trades to walk.
    pub fn start_iteration(&mut self) {
        self.ledger.start_iteration();
    }

    /// Select the next trade. Returns `false` when the iteration is done.
    pub fn shift_to_next(&mut self) -> bool {
        self.ledger.shift_to_next()
    }

    pub fn current_trade(&self) -> Option<&Trade> {
        self.ledger.current()
    }

    /// Run `f` on the selected trade, if any.
    pub fn with_current_trade<R>(&mut self, f: impl FnOnce(&mut Trade) -> R) -> Option<R> {
        self.ledger.current_mut().map(f)
    }

    /// Forget the selected trade and tell the hub, unless it is orphaned.
    pub fn free_trade(&mut self) {
        let Some(id) = self.ledger.current_id() else {
            return;
        };
        self.ledger.remove(id);

        self.post_to_hub(move |hub, producer| {
            info!(trade_id = id, "Trade freed");
            if !producer.is_orphaned(id) {
                hub.send(OutboundPacket::FreeTrade { id }.encode());
            }
        });
    }

    /// The engine opened the selected trade.
    pub fn notify_opened(&self) {
        if let Some(id) = self.ledger.current_id() {
            self.notify_lifecycle(id, OutboundPacket::OpenedResponse { id });
        }
    }

    /// The selected trade was closed outside the hub's control.
    pub fn notify_closed(&self) {
        if let Some(id) = self.ledger.current_id() {
            self.notify_lifecycle(id, OutboundPacket::ExternallyClosed { id });
        }
    }

    pub fn update_balance(&self, balance: f64) {
        self.hub.account.lock().balance = balance;
        self.post_to_hub(move |hub, _| {
            hub.send(OutboundPacket::CurrentBalance { balance }.encode());
        });
    }

    pub fn update_equity(&self, equity: f64) {
        self.hub.account.lock().equity = equity;
        self.post_to_hub(move |hub, _| {
            hub.send(OutboundPacket::CurrentEquity { equity }.encode());
        });
    }

    /// Log a message about the selected trade and forward it to the hub.
    pub fn trade_message(&self, text: &str) {
        let Some(id) = self.ledger.current_id() else {
            return;
        };
        let text = text.to_string();
        self.post_to_hub(move |hub, _| {
            info!(trade_id = id, text = %text, "Trade message");
            hub.send(OutboundPacket::MessageAboutTrade { id, text }.encode());
        });
    }

    /// Log an engine message under this connector's span.
    pub fn log_message(&self, text: &str) {
        let text = text.to_string();
        self.post_to_hub(move |_, _| {
            info!(text = %text, "Engine message");
        });
    }

    fn notify_lifecycle(&self, id: TradeId, packet: OutboundPacket) {
        self.post_to_hub(move |hub, producer| {
            if producer.is_orphaned(id) {
                debug!(trade_id = id, packet = packet.name(), "Trade orphaned, not notifying");
                return;
            }
            debug!(trade_id = id, packet = packet.name(), "Notifying hub");
            hub.send(packet.encode());
        });
    }

    fn post_to_hub<F>(&self, f: F)
    where
        F: FnOnce(&SessionSender, &LedgerProducer) + Send + 'static,
    {
        let sender = self.sender.clone();
        let producer = self.hub.producer.clone();
        let span = self.span.clone();
        self.client.post(move || {
            let _entered = span.enter();
            f(&sender, &producer);
        });
    }
}
