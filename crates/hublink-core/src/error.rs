//! Error types for hublink-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid trade type: {0}")]
    InvalidTradeType(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
