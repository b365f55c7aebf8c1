//! Execution loop error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Execution loop is already being run by another thread")]
    AlreadyRunning,

    #[error("Failed to spawn loop thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type LoopResult<T> = Result<T, LoopError>;
