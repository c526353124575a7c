//! UPF core utilities
//!
//! This crate provides the packet buffer layer shared by every other crate
//! in the workspace: reference-counted packet buffers with bounds-checked
//! read/write views, a fixed-size buffer pool, and logging setup.

pub mod buffer;
pub mod error;
pub mod log;
pub mod pool;

pub use buffer::{BufferView, BufferWritableView};
pub use error::{BufferError, BufferResult};
pub use pool::BufferPool;
