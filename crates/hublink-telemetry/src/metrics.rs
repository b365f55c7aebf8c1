//! Prometheus metrics for hub connections.
//!
//! Collectors live in the default registry and are shared by every
//! connector in the process. Nothing here serves them; `Metrics::render`
//! produces the text exposition for whoever wants it.
//!
//! # Panics
//!
//! Registration uses `unwrap()`: a failure means a duplicate metric name,
//! which is a programming error surfaced on first use.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Connection attempts started.
pub static CONNECT_ATTEMPTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "hublink_connect_attempts_total",
        "Total hub connection attempts"
    )
    .unwrap()
});

/// Connection attempts that failed before the socket was established.
pub static CONNECT_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "hublink_connect_failures_total",
        "Total failed hub connection attempts"
    )
    .unwrap()
});

/// Established connections lost.
/// Labels: reason (io/heartbeat_timeout/protocol)
pub static DISCONNECTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hublink_disconnects_total",
        "Total hub disconnects",
        &["reason"]
    )
    .unwrap()
});

pub static HEARTBEAT_TIMEOUTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "hublink_heartbeat_timeouts_total",
        "Total heartbeat timeouts"
    )
    .unwrap()
});

/// Frames on the wire, heartbeats included.
/// Labels: direction (sent/received)
pub static FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hublink_frames_total",
        "Total frames exchanged with the hub",
        &["direction"]
    )
    .unwrap()
});

/// Connections currently established.
pub static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "hublink_live_connections",
        "Hub connections currently established"
    )
    .unwrap()
});

/// Recording facade over the collectors above.
pub struct Metrics;

impl Metrics {
    pub fn connect_attempt() {
        CONNECT_ATTEMPTS_TOTAL.inc();
    }

    pub fn connect_failed() {
        CONNECT_FAILURES_TOTAL.inc();
    }

    pub fn connected() {
        LIVE_CONNECTIONS.inc();
    }

    /// An established connection was torn down, for whatever reason.
    pub fn connection_closed() {
        LIVE_CONNECTIONS.dec();
    }

    /// Record the loss of an established connection caused by a failure.
    pub fn disconnected(reason: &str) {
        DISCONNECTS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn heartbeat_timeout() {
        HEARTBEAT_TIMEOUTS_TOTAL.inc();
    }

    pub fn frame_sent() {
        FRAMES_TOTAL.with_label_values(&["sent"]).inc();
    }

    pub fn frame_received() {
        FRAMES_TOTAL.with_label_values(&["received"]).inc();
    }

    /// Text exposition of every collector in the default registry.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increase() {
        let attempts = CONNECT_ATTEMPTS_TOTAL.get();
        let sent = FRAMES_TOTAL.with_label_values(&["sent"]).get();

        Metrics::connect_attempt();
        Metrics::frame_sent();

        assert!(CONNECT_ATTEMPTS_TOTAL.get() > attempts);
        assert!(FRAMES_TOTAL.with_label_values(&["sent"]).get() > sent);
    }

    #[test]
    fn test_disconnect_counts_reason() {
        let before = DISCONNECTS_TOTAL.with_label_values(&["io"]).get();
        Metrics::disconnected("io");
        assert!(DISCONNECTS_TOTAL.with_label_values(&["io"]).get() > before);
    }

    #[test]
    fn test_live_connection_gauge_pairs() {
        Metrics::connected();
        let live = LIVE_CONNECTIONS.get();
        Metrics::connection_closed();
        assert!(LIVE_CONNECTIONS.get() < live);
    }

    #[test]
    fn test_render_lists_touched_collectors() {
        Metrics::heartbeat_timeout();
        let text = Metrics::render().unwrap();
        assert!(text.contains("hublink_heartbeat_timeouts_total"));
    }
}
