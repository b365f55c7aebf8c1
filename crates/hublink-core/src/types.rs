//! Value types carried by trade packets.
//!
//! Contains the trade direction, the `Boundary` threshold used for stops,
//! take-profits and delays, and the `TradeRequest` decoded from `OpenTrade`.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TradeType {
    #[default]
    Buy,
    Sell,
}

impl TradeType {
    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" => Ok(Self::Buy),
            "Sell" => Ok(Self::Sell),
            other => Err(CoreError::InvalidTradeType(other.to_string())),
        }
    }
}

/// Numeric threshold for a stop, take-profit or delay.
///
/// The hub protocol reserves direction and equality flags for boundaries,
/// but only "equals" is honored: a boundary is a plain value. An unset
/// boundary (`valid == false`) is what the engine sees before it has set
/// anything, e.g. `Trade::best_set_stop` of a fresh trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    value: f64,
    valid: bool,
}

impl Boundary {
    /// Create a set boundary.
    pub fn new(value: f64) -> Self {
        Self { value, valid: true }
    }

    /// Boundary that has not been set yet.
    pub fn unset() -> Self {
        Self {
            value: f64::MIN_POSITIVE,
            valid: false,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "{}", self.value)
        } else {
            f.write_str("unset")
        }
    }
}

/// What the hub asked for when opening a trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeRequest {
    pub value: f64,
    pub trade_type: TradeType,
    pub delay: Option<Boundary>,
}

impl TradeRequest {
    pub fn new(value: f64, trade_type: TradeType, delay: Option<Boundary>) -> Self {
        Self {
            value,
            trade_type,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_type_parse() {
        assert_eq!("Buy".parse::<TradeType>().unwrap(), TradeType::Buy);
        assert_eq!("Sell".parse::<TradeType>().unwrap(), TradeType::Sell);
        assert!("sell".parse::<TradeType>().is_err());
    }

    #[test]
    fn test_trade_type_display_matches_wire_name() {
        assert_eq!(TradeType::Sell.to_string(), "Sell");
        assert_eq!(TradeType::Buy.as_str(), "Buy");
    }

    #[test]
    fn test_boundary_unset_by_default() {
        let boundary = Boundary::default();
        assert!(!boundary.is_valid());
        assert_eq!(boundary.to_string(), "unset");
    }

    #[test]
    fn test_boundary_value() {
        let boundary = Boundary::new(1.2345);
        assert!(boundary.is_valid());
        assert_eq!(boundary.value(), 1.2345);
        assert_eq!(boundary.to_string(), "1.2345");
    }
}
