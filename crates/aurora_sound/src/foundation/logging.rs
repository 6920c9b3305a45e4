//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with a default filter
///
/// `RUST_LOG` still wins when it is set, so a release build can be debugged
/// without recompiling.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second initialization (tests, embedding apps) is not an error for us
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
