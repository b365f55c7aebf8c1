//! Trade ledger bridging the hub connection and the trading engine.
//!
//! The connection side holds a `LedgerProducer` and only enqueues
//! mutations. The engine owns the `TradeLedger`, applies the queued batch
//! once per iteration and then works on its trades without locking.

mod ledger;
mod mutation;

pub use ledger::{LedgerProducer, TradeLedger};
pub use mutation::{Mutation, TradeUpdate};
