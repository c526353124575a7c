//! S1AP decoding error types

use thiserror::Error;

/// Errors raised while decoding or building S1AP messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum S1apError {
    /// Ran out of bits while decoding
    #[error("PER buffer underflow: need {needed} bits, have {available}")]
    BufferUnderflow { needed: usize, available: usize },

    /// Value outside its ASN.1 constraint
    #[error("value {value} not in range {min}..={max}")]
    ConstraintViolation { value: i64, min: i64, max: i64 },

    /// CHOICE index outside the root alternatives
    #[error("invalid choice index {index} (max {max})")]
    InvalidChoiceIndex { index: usize, max: usize },

    /// Structurally invalid PDU
    #[error("malformed S1AP data: {0}")]
    Malformed(&'static str),

    /// A mandatory information element is absent
    #[error("missing mandatory IE: {0}")]
    MissingIe(&'static str),

    /// Valid but uncovered variant (e.g. an IPv6 transport address)
    #[error("unsupported {0}")]
    Unsupported(&'static str),
}

/// Result alias for S1AP operations.
pub type S1apResult<T> = Result<T, S1apError>;
