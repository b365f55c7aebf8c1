//! Price tick streaming to the hub.

use hublink_conn::{
    ConnectionConfig, HubSender, HubSession, SessionEvents, SessionSender, Transport,
};
use hublink_loop::{ExecutionLoop, LoopClient};
use hublink_wire::OutboundPacket;
use std::sync::Arc;
use tracing::{info_span, trace, Span};

/// Re-registers the sink on every new connection attempt.
struct SinkEvents {
    key: String,
}

impl SessionEvents for SinkEvents {
    fn on_restarted(&self, hub: &dyn HubSender) {
        let register = OutboundPacket::RegisterTicksProvider {
            key: self.key.clone(),
        };
        hub.send(register.encode());
    }
}

/// Streams bid/ask ticks for one key. Ticks produced while there is no
/// connection are dropped, not queued.
pub struct TickSink {
    client: LoopClient,
    sender: SessionSender,
    span: Span,
    // Last field: queued ticks are cancelled before the session closes.
    _session: HubSession,
}

impl TickSink {
    pub fn new(
        exec: Arc<ExecutionLoop>,
        address: &str,
        port: u16,
        key: &str,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let span = info_span!("ticks", addr = %address, port, key = %key);
        let events = Arc::new(SinkEvents {
            key: key.to_string(),
        });
        let session = HubSession::new(
            Arc::clone(&exec),
            address,
            port,
            config,
            transport,
            events,
            span.clone(),
        );

        Self {
            client: LoopClient::new(exec),
            sender: session.downgrade(),
            span,
            _session: session,
        }
    }

    pub fn send_tick(&self, bid: f64, ask: f64) {
        let sender = self.sender.clone();
        let span = self.span.clone();
        self.client.post(move || {
            if !sender.has_connection() {
                return;
            }
            let _entered = span.enter();
            trace!(bid, ask, "Sending tick");
            sender.send(OutboundPacket::OnTick { bid, ask }.encode());
        });
    }
}
