//! hublink connectors.
//!
//! Bridges a trading engine to a hublink hub:
//! - `TickSink`: streams bid/ask ticks
//! - `TradeConnector`: receives trade requests, reports their lifecycle
//! - `ConnectorRegistry`: many of both behind one loop thread
//! - `SimulatedEngine`: a stand-in trading engine for the `hublink` binary

pub mod config;
pub mod error;
pub mod registry;
pub mod sim;
pub mod tick_sink;
pub mod trade_connector;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use registry::{ConnectorId, ConnectorRegistry, RegistryCommand};
pub use sim::{EngineEvent, SimulatedEngine};
pub use tick_sink::TickSink;
pub use trade_connector::TradeConnector;
