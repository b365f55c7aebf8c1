//! Cooperative task scheduling for hublink.
//!
//! Provides:
//! - `ExecutionLoop`: a time-ordered task queue drained by one thread
//! - `LoopClient`: post / cancel access that cancels its own outstanding
//!   tasks when dropped
//! - `LoopThread`: runs a loop on a named OS thread, terminates and joins
//!   it on drop
//! - `Clock`: injectable millisecond clock

pub mod client;
pub mod clock;
pub mod error;
pub mod exec;
pub mod thread;

pub use client::LoopClient;
pub use clock::{Clock, MonotonicClock};
pub use error::{LoopError, LoopResult};
pub use exec::{Action, ExecutionLoop, TaskHandle};
pub use thread::LoopThread;
