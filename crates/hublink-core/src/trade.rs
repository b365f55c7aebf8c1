//! Trade entity tracked by the trading engine.
//!
//! A `Trade` is created from an inbound `OpenTrade` packet and then lives
//! in the trade ledger until the engine frees it. The hub drives the
//! `requested_*` fields; the engine reports what it managed to apply in
//! the `best_set_*` fields.

use crate::types::{Boundary, TradeRequest, TradeType};

/// Hub-assigned trade identifier.
pub type TradeId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    id: TradeId,
    broker_id: Option<i32>,
    trade_type: TradeType,
    requested_value: f64,
    requested_delay: Option<Boundary>,
    best_set_delay: Option<Boundary>,
    requested_stop: Boundary,
    best_set_stop: Boundary,
    requested_take_profit: Option<Boundary>,
    best_set_take_profit: Option<Boundary>,
    wants_close: bool,
    is_opened: bool,
}

impl Trade {
    /// Fresh trade from an `OpenTrade` request. Nothing is set by the
    /// engine yet and the trade is not opened.
    pub fn new(
        id: TradeId,
        request: TradeRequest,
        stop: Boundary,
        take_profit: Option<Boundary>,
    ) -> Self {
        Self {
            id,
            broker_id: None,
            trade_type: request.trade_type,
            requested_value: request.value,
            requested_delay: request.delay,
            best_set_delay: None,
            requested_stop: stop,
            best_set_stop: Boundary::unset(),
            requested_take_profit: take_profit,
            best_set_take_profit: None,
            wants_close: false,
            is_opened: false,
        }
    }

    /// Hub-assigned id.
    pub fn id(&self) -> TradeId {
        self.id
    }

    /// Ticket assigned by the trading engine once the trade is placed.
    pub fn broker_id(&self) -> Option<i32> {
        self.broker_id
    }

    pub fn set_broker_id(&mut self, broker_id: i32) {
        self.broker_id = Some(broker_id);
    }

    /// Buy or Sell, fixed at creation.
    pub fn trade_type(&self) -> TradeType {
        self.trade_type
    }

    /// Volume the hub asked for.
    pub fn requested_value(&self) -> f64 {
        self.requested_value
    }

    /// Delay the hub asked for before placing the trade.
    pub fn requested_delay(&self) -> Option<Boundary> {
        self.requested_delay
    }

    pub fn set_requested_delay(&mut self, delay: Option<Boundary>) {
        self.requested_delay = delay;
    }

    /// Delay the engine actually applied.
    pub fn best_set_delay(&self) -> Option<Boundary> {
        self.best_set_delay
    }

    pub fn set_best_set_delay(&mut self, delay: Option<Boundary>) {
        self.best_set_delay = delay;
    }

    /// Latest stop requested by the hub.
    pub fn requested_stop(&self) -> Boundary {
        self.requested_stop
    }

    pub fn set_requested_stop(&mut self, stop: Boundary) {
        self.requested_stop = stop;
    }

    /// Stop the engine managed to set. Unset until the engine sets one.
    pub fn best_set_stop(&self) -> Boundary {
        self.best_set_stop
    }

    pub fn set_best_set_stop(&mut self, stop: Boundary) {
        self.best_set_stop = stop;
    }

    /// Latest take-profit requested by the hub. `None` clears it.
    pub fn requested_take_profit(&self) -> Option<Boundary> {
        self.requested_take_profit
    }

    pub fn set_requested_take_profit(&mut self, take_profit: Option<Boundary>) {
        self.requested_take_profit = take_profit;
    }

    /// Take-profit the engine managed to set.
    pub fn best_set_take_profit(&self) -> Option<Boundary> {
        self.best_set_take_profit
    }

    pub fn set_best_set_take_profit(&mut self, take_profit: Option<Boundary>) {
        self.best_set_take_profit = take_profit;
    }

    /// Whether the hub (or a disconnect) asked for this trade to be closed.
    pub fn wants_close(&self) -> bool {
        self.wants_close
    }

    /// Mark the trade for closing. There is no way back.
    pub fn mark_wants_close(&mut self) {
        self.wants_close = true;
    }

    /// Whether the engine has placed the trade.
    pub fn is_opened(&self) -> bool {
        self.is_opened
    }

    pub fn set_opened(&mut self, opened: bool) {
        self.is_opened = opened;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade::new(
            7,
            TradeRequest::new(0.1, TradeType::Sell, Some(Boundary::new(30.0))),
            Boundary::new(1.05),
            None,
        )
    }

    #[test]
    fn test_new_trade_defaults() {
        let trade = sample_trade();
        assert_eq!(trade.id(), 7);
        assert_eq!(trade.trade_type(), TradeType::Sell);
        assert_eq!(trade.requested_value(), 0.1);
        assert_eq!(trade.requested_delay(), Some(Boundary::new(30.0)));
        assert_eq!(trade.requested_stop(), Boundary::new(1.05));
        assert!(!trade.best_set_stop().is_valid());
        assert_eq!(trade.best_set_take_profit(), None);
        assert_eq!(trade.broker_id(), None);
        assert!(!trade.wants_close());
        assert!(!trade.is_opened());
    }

    #[test]
    fn test_engine_side_updates() {
        let mut trade = sample_trade();
        trade.set_broker_id(1001);
        trade.set_opened(true);
        trade.set_best_set_stop(Boundary::new(1.04));
        trade.set_best_set_take_profit(Some(Boundary::new(0.9)));

        assert_eq!(trade.broker_id(), Some(1001));
        assert!(trade.is_opened());
        assert_eq!(trade.best_set_stop().value(), 1.04);
        assert_eq!(trade.best_set_take_profit(), Some(Boundary::new(0.9)));
    }

    #[test]
    fn test_wants_close_is_sticky() {
        let mut trade = sample_trade();
        trade.mark_wants_close();
        trade.mark_wants_close();
        assert!(trade.wants_close());
    }
}
