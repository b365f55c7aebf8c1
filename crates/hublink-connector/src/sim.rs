//! Simulated trading engine used by `hublink trades`.
//!
//! Each step walks the connector's trade set the way a terminal plugin
//! would: new trades are opened at once, trades the hub wants closed are
//! freed, and requested stop / take-profit changes are applied.

use crate::registry::{ConnectorId, ConnectorRegistry};
use hublink_core::{Trade, TradeId};

/// What one engine step did to a trade.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Opened { trade_id: TradeId, ticket: i32 },
    Adjusted { trade_id: TradeId },
    Freed { trade_id: TradeId },
}

enum Decision {
    Open(i32),
    Adjust,
    Free,
    Hold,
}

pub struct SimulatedEngine<'a> {
    registry: &'a ConnectorRegistry,
    connector: ConnectorId,
    last_ticket: i32,
}

impl<'a> SimulatedEngine<'a> {
    pub fn new(registry: &'a ConnectorRegistry, connector: ConnectorId) -> Self {
        Self {
            registry,
            connector,
            last_ticket: 0,
        }
    }

    /// Run one iteration over the current trade set.
    pub fn step(&mut self) -> Vec<EngineEvent> {
        let id = self.connector;
        let mut events = Vec::new();

        self.registry.start_iteration(id);
        while self.registry.shift_to_next(id) {
            let next_ticket = self.last_ticket + 1;
            let Some((trade_id, decision)) = self
                .registry
                .with_current_trade(id, |trade| (trade.id(), decide(trade, next_ticket)))
            else {
                continue;
            };

            match decision {
                Decision::Open(ticket) => {
                    self.last_ticket = ticket;
                    self.registry.notify_opened(id);
                    self.registry
                        .trade_message(id, &format!("opened with ticket {ticket}"));
                    events.push(EngineEvent::Opened { trade_id, ticket });
                }
                Decision::Adjust => {
                    self.registry.trade_message(id, "protection levels updated");
                    events.push(EngineEvent::Adjusted { trade_id });
                }
                Decision::Free => {
                    self.registry.free_trade(id);
                    events.push(EngineEvent::Freed { trade_id });
                }
                Decision::Hold => {}
            }
        }

        events
    }
}

fn decide(trade: &mut Trade, next_ticket: i32) -> Decision {
    if trade.wants_close() {
        trade.set_opened(false);
        return Decision::Free;
    }

    if !trade.is_opened() {
        trade.set_opened(true);
        trade.set_broker_id(next_ticket);
        trade.set_best_set_delay(trade.requested_delay());
        trade.set_best_set_stop(trade.requested_stop());
        trade.set_best_set_take_profit(trade.requested_take_profit());
        return Decision::Open(next_ticket);
    }

    let stale_stop = trade.best_set_stop() != trade.requested_stop();
    let stale_take_profit = trade.best_set_take_profit() != trade.requested_take_profit();
    if !stale_stop && !stale_take_profit {
        return Decision::Hold;
    }
    trade.set_best_set_stop(trade.requested_stop());
    trade.set_best_set_take_profit(trade.requested_take_profit());
    Decision::Adjust
}

#[cfg(test)]
mod tests {
    use super::*;
    use hublink_core::{Boundary, TradeRequest, TradeType};

    fn trade() -> Trade {
        Trade::new(
            7,
            TradeRequest::new(1.0, TradeType::Buy, None),
            Boundary::new(0.9),
            None,
        )
    }

    #[test]
    fn test_new_trade_is_opened_with_requested_levels() {
        let mut trade = trade();

        assert!(matches!(decide(&mut trade, 3), Decision::Open(3)));
        assert!(trade.is_opened());
        assert_eq!(trade.broker_id(), Some(3));
        assert_eq!(trade.best_set_stop(), Boundary::new(0.9));
        assert!(matches!(decide(&mut trade, 4), Decision::Hold));
    }

    #[test]
    fn test_requested_stop_change_is_applied() {
        let mut trade = trade();
        decide(&mut trade, 1);

        trade.set_requested_stop(Boundary::new(0.95));
        assert!(matches!(decide(&mut trade, 2), Decision::Adjust));
        assert_eq!(trade.best_set_stop(), Boundary::new(0.95));
    }

    #[test]
    fn test_close_request_frees_trade() {
        let mut trade = trade();
        decide(&mut trade, 1);

        trade.mark_wants_close();
        assert!(matches!(decide(&mut trade, 2), Decision::Free));
        assert!(!trade.is_opened());
    }
}
