//! Logging utilities
//!
//! The renderer logs through the `log` facade; applications pick the backend.
//! These helpers install `env_logger`, which honours `RUST_LOG` when set.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with a default level
///
/// `RUST_LOG` still takes precedence when present. Calling this more than once
/// is harmless; later calls leave the first logger installed.
pub fn init_with_level(level: LevelFilter) {
    let result = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
    if result.is_err() {
        log::debug!("Logger already initialized, keeping existing configuration");
    }
}
