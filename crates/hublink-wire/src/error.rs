//! Codec error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Truncated payload: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid double text: {0:?}")]
    InvalidDouble(String),

    #[error("Frame too large: {len} bytes exceeds limit {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WireResult<T> = Result<T, WireError>;
