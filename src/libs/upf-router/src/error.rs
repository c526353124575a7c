//! Router error types

use thiserror::Error;
use upf_net::NetError;

/// Errors raised by the routing layer.
#[derive(Error, Debug)]
pub enum RouterError {
    /// A matching rule failed to parse
    #[error("invalid matching rule: {0}")]
    InvalidRule(String),

    /// An underlying dissection or composition error
    #[error(transparent)]
    Net(#[from] NetError),
}

/// Result alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;
