//! Network decoding/encoding error types

use thiserror::Error;
use upf_core::BufferError;

/// Errors raised while dissecting or composing packets.
#[derive(Error, Debug)]
pub enum NetError {
    /// View access outside its bounds
    #[error(transparent)]
    Bounds(#[from] BufferError),

    /// Buffer shorter than the protocol's minimum header
    #[error("{layer} data too short: need {needed} bytes, have {available}")]
    TooShort {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    /// Header magic/version/structure invalid
    #[error("malformed {layer} data: {reason}")]
    Malformed {
        layer: &'static str,
        reason: &'static str,
    },

    /// Payload exceeds the encapsulation capacity
    #[error("payload of {len} bytes exceeds encapsulation capacity of {max}")]
    TooLarge { len: usize, max: usize },

    /// Valid but uncovered variant
    #[error("unsupported {0}")]
    Unsupported(&'static str),

    /// Underlying source/sink error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for network operations.
pub type NetResult<T> = Result<T, NetError>;
