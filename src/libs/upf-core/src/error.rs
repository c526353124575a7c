//! Buffer error types

use thiserror::Error;

/// Errors raised by the buffer and pool layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Access outside the bounds of a view
    #[error("buffer access out of bounds: offset {offset} + length {len} exceeds view length {limit}")]
    Bounds {
        offset: usize,
        len: usize,
        limit: usize,
    },

    /// Buffer pool has no free buffer
    #[error("buffer pool exhausted")]
    Exhausted,
}

/// Result alias for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;
