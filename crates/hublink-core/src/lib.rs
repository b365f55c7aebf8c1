//! Core domain types for the hublink connector.
//!
//! This crate provides the types shared by the wire codec, the trade
//! ledger and the connectors:
//! - `Boundary`: a stop / take-profit / delay threshold
//! - `TradeType`: Buy or Sell
//! - `TradeRequest`: what the hub asked for when opening a trade
//! - `Trade`: a hub-assigned trade as tracked by the trading engine

pub mod error;
pub mod trade;
pub mod types;

pub use error::{CoreError, Result};
pub use trade::{Trade, TradeId};
pub use types::{Boundary, TradeRequest, TradeType};
