//! Keepalive for an established connection.
//!
//! A heartbeat frame goes out every interval. Timeout supervision begins
//! with the first heartbeat received from the hub: each one restarts the
//! timeout, and if the next does not arrive in time the sink is told once
//! and the monitor stops.

use hublink_loop::{ExecutionLoop, LoopClient, TaskHandle};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Receiver of heartbeat decisions.
#[cfg_attr(test, mockall::automock)]
pub trait HeartbeatSink: Send + Sync {
    /// Write one zero-length frame.
    fn send_heartbeat(&self);
    /// No heartbeat arrived within the timeout.
    fn on_timeout(&self);
}

#[derive(Default)]
struct Tasks {
    ping: Option<TaskHandle>,
    timeout: Option<TaskHandle>,
    stopped: bool,
}

/// Heartbeat monitor running on the connection's loop.
pub struct Heartbeat {
    client: LoopClient,
    interval: Duration,
    timeout: Duration,
    sink: Arc<dyn HeartbeatSink>,
    tasks: Mutex<Tasks>,
    me: Weak<Heartbeat>,
}

impl Heartbeat {
    pub fn new(
        exec: Arc<ExecutionLoop>,
        interval: Duration,
        timeout: Duration,
        sink: Arc<dyn HeartbeatSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            client: LoopClient::new(exec),
            interval,
            timeout,
            sink,
            tasks: Mutex::new(Tasks::default()),
            me: me.clone(),
        })
    }

    /// Begin sending heartbeats.
    pub fn start(&self) {
        self.schedule_ping();
    }

    /// Feed an inbound frame. Returns `true` if it was a heartbeat, which
    /// also restarts the timeout.
    pub fn is_heartbeat(&self, frame: &[u8]) -> bool {
        if !frame.is_empty() {
            return false;
        }
        self.on_heartbeat();
        true
    }

    pub fn on_heartbeat(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.stopped {
            return;
        }
        if let Some(previous) = tasks.timeout.take() {
            self.client.cancel(previous);
        }

        let me = self.me.clone();
        tasks.timeout = Some(self.client.post_delayed(self.timeout, move || {
            if let Some(heartbeat) = me.upgrade() {
                heartbeat.fire_timeout();
            }
        }));
        trace!("Heartbeat received");
    }

    /// Cancel both tasks. Idempotent.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock();
        tasks.stopped = true;
        for handle in [tasks.ping.take(), tasks.timeout.take()].into_iter().flatten() {
            self.client.cancel(handle);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tasks.lock().stopped
    }

    fn schedule_ping(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.stopped {
            return;
        }

        let me = self.me.clone();
        tasks.ping = Some(self.client.post_delayed(self.interval, move || {
            if let Some(heartbeat) = me.upgrade() {
                heartbeat.fire_ping();
            }
        }));
    }

    fn fire_ping(&self) {
        self.schedule_ping();
        self.sink.send_heartbeat();
    }

    fn fire_timeout(&self) {
        self.tasks.lock().timeout = None;
        self.stop();
        debug!(timeout_ms = self.timeout.as_millis() as u64, "Heartbeat timed out");
        self.sink.on_timeout();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hublink_loop::LoopThread;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    #[derive(Default)]
    struct CountingSink {
        pings: AtomicUsize,
        timeouts: AtomicUsize,
    }

    impl HeartbeatSink for CountingSink {
        fn send_heartbeat(&self) {
            self.pings.fetch_add(1, Ordering::SeqCst);
        }

        fn on_timeout(&self) {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn running_loop(name: &str) -> (Arc<ExecutionLoop>, LoopThread) {
        let exec = Arc::new(ExecutionLoop::new());
        let thread = LoopThread::spawn(name, exec.clone()).unwrap();
        (exec, thread)
    }

    #[test]
    fn test_frame_classification() {
        let exec = Arc::new(ExecutionLoop::new());
        let mut sink = MockHeartbeatSink::new();
        sink.expect_send_heartbeat().never();
        sink.expect_on_timeout().never();
        let heartbeat = Heartbeat::new(
            exec.clone(),
            Duration::from_secs(60),
            Duration::from_secs(60),
            Arc::new(sink),
        );

        assert!(!heartbeat.is_heartbeat(b"payload"));
        assert_eq!(exec.pending_tasks(), 0);
        assert!(heartbeat.is_heartbeat(&[]));
        assert_eq!(exec.pending_tasks(), 1, "timeout armed");
        assert!(heartbeat.is_heartbeat(&[]));
        assert_eq!(exec.pending_tasks(), 1, "timeout re-armed, not stacked");
    }

    #[test]
    fn test_sends_heartbeats_periodically() {
        let (exec, _thread) = running_loop("hb-periodic");
        let sink = Arc::new(CountingSink::default());
        let heartbeat = Heartbeat::new(
            exec,
            Duration::from_millis(10),
            Duration::from_secs(60),
            sink.clone(),
        );

        heartbeat.start();
        assert!(wait_until(Duration::from_secs(2), || {
            sink.pings.load(Ordering::SeqCst) >= 3
        }));
        heartbeat.stop();
    }

    #[test]
    fn test_timeout_fires_once_and_stops_pinging() {
        let (exec, _thread) = running_loop("hb-timeout");
        let sink = Arc::new(CountingSink::default());
        let heartbeat = Heartbeat::new(
            exec,
            Duration::from_millis(10),
            Duration::from_millis(40),
            sink.clone(),
        );

        heartbeat.start();
        heartbeat.on_heartbeat();
        assert!(wait_until(Duration::from_secs(2), || {
            sink.timeouts.load(Ordering::SeqCst) == 1
        }));
        assert!(heartbeat.is_stopped());

        let pings = sink.pings.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.pings.load(Ordering::SeqCst), pings);
        assert_eq!(sink.timeouts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_regular_heartbeats_prevent_timeout() {
        let (exec, _thread) = running_loop("hb-alive");
        let sink = Arc::new(CountingSink::default());
        let heartbeat = Heartbeat::new(
            exec,
            Duration::from_secs(60),
            Duration::from_millis(80),
            sink.clone(),
        );

        for _ in 0..10 {
            heartbeat.on_heartbeat();
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(sink.timeouts.load(Ordering::SeqCst), 0);
        heartbeat.stop();
    }

    #[test]
    fn test_no_timeout_before_first_heartbeat() {
        let (exec, _thread) = running_loop("hb-idle");
        let sink = Arc::new(CountingSink::default());
        let heartbeat = Heartbeat::new(
            exec,
            Duration::from_secs(60),
            Duration::from_millis(10),
            sink.clone(),
        );

        heartbeat.start();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(sink.timeouts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_is_idempotent_and_cancels_tasks() {
        let exec = Arc::new(ExecutionLoop::new());
        let heartbeat = Heartbeat::new(
            exec.clone(),
            Duration::from_secs(60),
            Duration::from_secs(60),
            Arc::new(CountingSink::default()),
        );
        heartbeat.start();
        heartbeat.on_heartbeat();
        assert_eq!(exec.pending_tasks(), 2);

        heartbeat.stop();
        heartbeat.stop();
        assert_eq!(exec.pending_tasks(), 0);

        heartbeat.on_heartbeat();
        assert_eq!(exec.pending_tasks(), 0);
    }
}
