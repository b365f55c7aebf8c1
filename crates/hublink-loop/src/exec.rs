//! Time-ordered cooperative task loop.
//!
//! Tasks are kept sorted by target time, ties broken by post order. One
//! thread drains the queue through `run()`; tasks run to completion and
//! never overlap. `terminate()` discards everything still queued and makes
//! `run()` return before any further task executes.

use crate::clock::{Clock, MonotonicClock};
use crate::error::{LoopError, LoopResult};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Unit of work executed on the loop thread.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle for a posted task.
///
/// Orders by target time first, then by post sequence, which is exactly
/// the queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle {
    target_ms: u64,
    seq: u64,
}

impl TaskHandle {
    /// Time (loop clock, ms) at which the task becomes runnable.
    pub fn target_ms(&self) -> u64 {
        self.target_ms
    }
}

enum Job {
    Run(Action),
    Terminate,
}

#[derive(Default)]
struct Queue {
    tasks: BTreeMap<TaskHandle, Job>,
    next_seq: u64,
}

impl Queue {
    fn push(&mut self, target_ms: u64, job: impl FnOnce(TaskHandle) -> Job) -> TaskHandle {
        let handle = TaskHandle {
            target_ms,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.tasks.insert(handle, job(handle));
        handle
    }
}

/// Single-threaded, time-ordered task queue.
///
/// Shared as `Arc<ExecutionLoop>`; it must outlive every post made to it.
/// Posting after `terminate()` is a caller error: such tasks are queued but
/// never run by the terminated `run()`.
pub struct ExecutionLoop {
    queue: Mutex<Queue>,
    wakeup: Condvar,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
}

impl ExecutionLoop {
    /// Create a loop driven by a monotonic wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            wakeup: Condvar::new(),
            clock,
            running: AtomicBool::new(false),
        }
    }

    /// Current loop time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Queue `action` to run as soon as possible.
    pub fn post<F>(&self, action: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed(Duration::ZERO, action)
    }

    /// Queue `action` to run once `delay` has elapsed.
    pub fn post_delayed<F>(&self, delay: Duration, action: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue_with(delay, move |_| Box::new(action))
    }

    /// Queue an action built from its own handle, inside the queue lock.
    ///
    /// The handle is known before any thread can pop the task.
    pub(crate) fn enqueue_with<F>(&self, delay: Duration, make: F) -> TaskHandle
    where
        F: FnOnce(TaskHandle) -> Action,
    {
        let target_ms = self.clock.now_ms().saturating_add(delay.as_millis() as u64);

        let mut queue = self.queue.lock();
        let handle = queue.push(target_ms, |handle| Job::Run(make(handle)));
        self.wakeup.notify_one();
        handle
    }

    /// Remove a task that is still queued.
    ///
    /// Returns `false` if the task already ran, is running, or was already
    /// cancelled; a running task is never interrupted.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        // Dropped after the lock is released: a task may own loop clients.
        let removed = self.queue.lock().tasks.remove(&handle);
        if removed.is_none() {
            return false;
        }
        self.wakeup.notify_one();
        true
    }

    /// Discard every queued task and make `run()` return.
    pub fn terminate(&self) {
        let discarded = {
            let mut queue = self.queue.lock();
            let discarded = mem::take(&mut queue.tasks);
            queue.push(0, |_| Job::Terminate);
            self.wakeup.notify_all();
            discarded
        };
        debug!(discarded = discarded.len(), "Execution loop terminating");
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_tasks(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Drain the queue on the calling thread until `terminate()` is observed.
    pub fn run(&self) -> LoopResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(LoopError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        trace!("Execution loop started");
        loop {
            match self.pop_next() {
                Job::Run(action) => action(),
                Job::Terminate => break,
            }
        }
        trace!("Execution loop stopped");

        Ok(())
    }

    fn pop_next(&self) -> Job {
        let mut queue = self.queue.lock();

        loop {
            let now = self.clock.now_ms();

            let wait_ms = match queue.tasks.first_entry() {
                None => None,
                Some(first) if first.key().target_ms <= now => return first.remove(),
                Some(first) => Some(first.key().target_ms - now),
            };

            match wait_ms {
                None => self.wakeup.wait(&mut queue),
                Some(ms) => {
                    self.wakeup.wait_for(&mut queue, Duration::from_millis(ms));
                }
            }
        }
    }
}

impl Default for ExecutionLoop {
    fn default() -> Self {
        Self::new()
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Action) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |n: u32| -> Action {
            let sink = sink.clone();
            Box::new(move || sink.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_runs_in_target_time_order() {
        let exec = Arc::new(ExecutionLoop::new());
        let (log, make) = recorder();

        exec.post_delayed(Duration::from_millis(60), make(3));
        exec.post_delayed(Duration::from_millis(30), make(2));
        exec.post(make(1));
        let terminator = exec.clone();
        exec.post_delayed(Duration::from_millis(90), move || terminator.terminate());

        exec.run().unwrap();

        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_equal_target_time_runs_in_post_order() {
        let exec = Arc::new(ExecutionLoop::new());
        let (log, make) = recorder();

        // Queue everything before the loop starts so all share the
        // same clock reading or a later one.
        for n in 0..50 {
            exec.post(make(n));
        }
        let terminator = exec.clone();
        exec.post(move || terminator.terminate());

        exec.run().unwrap();

        assert_eq!(*log.lock(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_before_pop_never_runs() {
        let exec = Arc::new(ExecutionLoop::new());
        let (log, make) = recorder();

        let cancelled = exec.post_delayed(Duration::from_millis(20), make(1));
        exec.post_delayed(Duration::from_millis(20), make(2));
        assert!(exec.cancel(cancelled));
        assert!(!exec.cancel(cancelled), "second cancel is a no-op");

        let terminator = exec.clone();
        exec.post_delayed(Duration::from_millis(40), move || terminator.terminate());
        exec.run().unwrap();

        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn test_cancel_after_execution_is_noop() {
        let exec = Arc::new(ExecutionLoop::new());
        let (log, make) = recorder();

        let handle = exec.post(make(1));
        let terminator = exec.clone();
        exec.post(move || terminator.terminate());
        exec.run().unwrap();

        assert!(!exec.cancel(handle));
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn test_cancel_from_running_task_cannot_interrupt_itself() {
        let exec = Arc::new(ExecutionLoop::new());
        let own_handle = Arc::new(Mutex::new(None));
        let result = Arc::new(Mutex::new(None));

        let (slot, out, inner) = (own_handle.clone(), result.clone(), exec.clone());
        let handle = exec.post(move || {
            let handle = slot.lock().expect("handle stored before run");
            *out.lock() = Some(inner.cancel(handle));
            inner.terminate();
        });
        *own_handle.lock() = Some(handle);

        exec.run().unwrap();
        assert_eq!(*result.lock(), Some(false));
    }

    #[test]
    fn test_terminate_discards_queued_tasks() {
        let exec = Arc::new(ExecutionLoop::new());
        let (log, make) = recorder();

        let terminator = exec.clone();
        exec.post(move || terminator.terminate());
        exec.post(make(1));
        exec.post_delayed(Duration::from_millis(5), make(2));

        exec.run().unwrap();

        assert!(log.lock().is_empty());
        assert_eq!(exec.pending_tasks(), 0);
    }

    #[test]
    fn test_terminate_from_other_thread_wakes_idle_loop() {
        let exec = Arc::new(ExecutionLoop::new());
        let runner = exec.clone();
        let thread = thread::spawn(move || runner.run());

        thread::sleep(Duration::from_millis(20));
        exec.terminate();

        assert!(thread.join().unwrap().is_ok());
    }

    #[test]
    fn test_post_from_other_thread_wakes_timed_wait() {
        let exec = Arc::new(ExecutionLoop::new());
        let (log, make) = recorder();

        exec.post_delayed(Duration::from_secs(60), make(99));
        let runner = exec.clone();
        let thread = thread::spawn(move || runner.run());

        thread::sleep(Duration::from_millis(20));
        exec.post(make(1));
        let terminator = exec.clone();
        exec.post(move || terminator.terminate());

        thread.join().unwrap().unwrap();
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn test_second_runner_rejected() {
        let exec = Arc::new(ExecutionLoop::new());
        let observed = Arc::new(Mutex::new(None));

        let (inner, out) = (exec.clone(), observed.clone());
        exec.post(move || {
            *out.lock() = Some(matches!(inner.run(), Err(LoopError::AlreadyRunning)));
            inner.terminate();
        });

        exec.run().unwrap();
        assert_eq!(*observed.lock(), Some(true));
    }

    /// Locks its loop queue when dropped.
    struct ReentrantDrop(Arc<ExecutionLoop>);

    impl Drop for ReentrantDrop {
        fn drop(&mut self) {
            self.0.pending_tasks();
        }
    }

    #[test]
    fn test_discarded_task_may_touch_loop_on_drop() {
        let exec = Arc::new(ExecutionLoop::new());

        let owned = ReentrantDrop(exec.clone());
        let handle = exec.post(move || drop(owned));
        assert!(exec.cancel(handle));

        let owned = ReentrantDrop(exec.clone());
        exec.post(move || drop(owned));
        exec.terminate();
        assert_eq!(exec.pending_tasks(), 1, "only the terminate marker");
    }
}
