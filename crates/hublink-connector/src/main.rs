//! hublink - Entry Point
//!
//! `ticks`: stream `bid ask` lines from stdin to the hub
//! `trades`: run a simulated trading engine against the hub

use anyhow::Result;
use clap::{Parser, Subcommand};
use hublink_connector::{AppConfig, ConnectorRegistry, EngineEvent, SimulatedEngine};
use std::io::BufRead;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Resilient connector to a hublink hub
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via HUBLINK_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send `bid ask` lines read from stdin as ticks; `q` quits
    Ticks,
    /// Run a simulated trading engine
    Trades {
        /// Engine iteration period in milliseconds
        #[arg(long, default_value_t = 1000)]
        iteration_ms: u64,
        /// Stop after this many iterations instead of running forever
        #[arg(long)]
        iterations: Option<u64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    hublink_telemetry::init_logging()?;
    info!("Starting hublink v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > HUBLINK_CONFIG env var > defaults + HUBLINK_* overrides
    let config_path = args
        .config
        .or_else(|| std::env::var("HUBLINK_CONFIG").ok());
    let config = AppConfig::load(config_path.as_deref())?;
    info!(endpoint = %config.endpoint(), key = %config.key, "Configuration loaded");

    let registry = ConnectorRegistry::from_config(&config)?;

    match args.command {
        Command::Ticks => run_ticks(&registry, &config)?,
        Command::Trades {
            iteration_ms,
            iterations,
        } => run_trades(
            &registry,
            &config,
            Duration::from_millis(iteration_ms),
            iterations,
        ),
    }

    info!("hublink stopped");
    Ok(())
}

fn run_ticks(registry: &ConnectorRegistry, config: &AppConfig) -> Result<()> {
    let sink = registry.create_ticks_sink(&config.address, config.port, &config.key);

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line == "q" {
            break;
        }
        match parse_tick(line) {
            Some((bid, ask)) => registry.send_tick(sink, bid, ask),
            None => warn!(line, "Expected `bid ask`"),
        }
    }

    registry.free_ticks_sink(sink);
    Ok(())
}

fn parse_tick(line: &str) -> Option<(f64, f64)> {
    let mut fields = line.split_whitespace();
    let bid = fields.next()?.parse().ok()?;
    let ask = fields.next()?.parse().ok()?;
    fields.next().is_none().then_some((bid, ask))
}

fn run_trades(
    registry: &ConnectorRegistry,
    config: &AppConfig,
    period: Duration,
    iterations: Option<u64>,
) {
    let connector = registry.create_trade_connector(
        &config.address,
        config.port,
        &config.key,
        config.balance,
        config.equity,
    );
    let mut engine = SimulatedEngine::new(registry, connector);

    let mut done = 0u64;
    while iterations.map_or(true, |limit| done < limit) {
        for event in engine.step() {
            match event {
                EngineEvent::Opened { trade_id, ticket } => {
                    info!(trade_id, ticket, "Trade opened");
                }
                EngineEvent::Adjusted { trade_id } => info!(trade_id, "Trade adjusted"),
                EngineEvent::Freed { trade_id } => info!(trade_id, "Trade freed"),
            }
        }
        done += 1;
        thread::sleep(period);
    }

    registry.free_trade_connector(connector);
}
