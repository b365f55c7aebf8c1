use hublink_core::{Boundary, Trade, TradeId};

/// Change the hub requests for one existing trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeUpdate {
    WantsClose,
    RequestedStop(Boundary),
    RequestedTakeProfit(Option<Boundary>),
}

impl TradeUpdate {
    pub(crate) fn apply(self, trade: &mut Trade) {
        match self {
            Self::WantsClose => trade.mark_wants_close(),
            Self::RequestedStop(stop) => trade.set_requested_stop(stop),
            Self::RequestedTakeProfit(take_profit) => trade.set_requested_take_profit(take_profit),
        }
    }
}

/// Queued ledger change, applied by the engine at the next iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Add(Trade),
    Modify { id: TradeId, update: TradeUpdate },
    CloseAll,
}
