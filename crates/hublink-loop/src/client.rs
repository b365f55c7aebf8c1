//! Lifetime-scoped access to an execution loop.

use crate::exec::{ExecutionLoop, TaskHandle};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Posts tasks to a shared loop and cancels whatever is still queued when
/// dropped.
///
/// Every posted task removes its own handle from the outstanding set as the
/// first step of its body, under the same lock `cancel_all` takes, so a task
/// is either cancelled by teardown or already running, never both.
///
/// Lock order is always outstanding set, then loop queue.
pub struct LoopClient {
    exec: Arc<ExecutionLoop>,
    outstanding: Arc<Mutex<HashSet<TaskHandle>>>,
}

impl LoopClient {
    /// Client with no outstanding tasks on `exec`.
    pub fn new(exec: Arc<ExecutionLoop>) -> Self {
        Self {
            exec,
            outstanding: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The underlying loop.
    pub fn exec(&self) -> &Arc<ExecutionLoop> {
        &self.exec
    }

    /// Queue `action` to run as soon as possible, tracked by this client.
    pub fn post<F>(&self, action: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed(Duration::ZERO, action)
    }

    /// Queue `action` after `delay`. The handle leaves the outstanding set
    /// when the task starts or is cancelled.
    pub fn post_delayed<F>(&self, delay: Duration, action: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut outstanding = self.outstanding.lock();
        let registry = Arc::clone(&self.outstanding);

        let handle = self.exec.enqueue_with(delay, move |handle| {
            Box::new(move || {
                registry.lock().remove(&handle);
                action();
            })
        });
        outstanding.insert(handle);

        handle
    }

    /// Cancel one of this client's tasks. No-op if it already started.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        let mut outstanding = self.outstanding.lock();
        if outstanding.remove(&handle) {
            self.exec.cancel(handle)
        } else {
            false
        }
    }

    /// Cancel every task this client still has queued.
    pub fn cancel_all(&self) {
        let mut outstanding = self.outstanding.lock();
        for handle in outstanding.drain() {
            self.exec.cancel(handle);
        }
    }

    /// Number of this client's tasks that have not started yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }
}

impl Drop for LoopClient {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
