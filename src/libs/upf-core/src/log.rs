//! Logging setup

pub use log::{debug, error, info, trace, warn};

/// Initialize the process-wide logger from the environment (`RUST_LOG`).
pub fn init() {
    let _ = env_logger::Builder::from_default_env().try_init();
}
