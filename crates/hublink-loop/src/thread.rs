//! Execution loop bound to a dedicated OS thread.

use crate::error::LoopResult;
use crate::exec::ExecutionLoop;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Runs an `ExecutionLoop` on its own named thread.
///
/// Dropping terminates the loop and joins the thread. When the last owner
/// is dropped from a task on the loop itself the join is skipped; the
/// thread exits on its own once the task returns.
pub struct LoopThread {
    exec: Arc<ExecutionLoop>,
    handle: Option<JoinHandle<()>>,
}

impl LoopThread {
    pub fn spawn(name: impl Into<String>, exec: Arc<ExecutionLoop>) -> LoopResult<Self> {
        let name = name.into();
        let runner = Arc::clone(&exec);
        let thread_name = name.clone();

        let handle = thread::Builder::new().name(name).spawn(move || {
            debug!(thread = %thread_name, "Loop thread started");
            if let Err(e) = runner.run() {
                error!(thread = %thread_name, error = %e, "Loop thread failed to run");
            }
            debug!(thread = %thread_name, "Loop thread stopped");
        })?;

        Ok(Self {
            exec,
            handle: Some(handle),
        })
    }

    pub fn exec(&self) -> &Arc<ExecutionLoop> {
        &self.exec
    }

    /// Whether the caller is running on this loop's thread.
    pub fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id())
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.exec.terminate();

        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("Loop thread panicked");
        }
    }
}
