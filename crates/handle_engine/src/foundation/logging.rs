//! Logging setup
//!
//! The engine logs through the `log` facade; applications pick the backend.
//! These helpers install `env_logger`, honouring `RUST_LOG` when set.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize the logging system with `level` as the default filter
///
/// `RUST_LOG` still wins when present. Calling this more than once is
/// harmless; later calls are ignored.
pub fn init_with_level(level: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    let result = env_logger::Builder::new()
        .parse_filters(&filter)
        .format_timestamp_millis()
        .try_init();
    if result.is_ok() {
        log::debug!("Logging initialized with filter '{}'", filter);
    }
}

/// Route log output through the test harness
#[cfg(test)]
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
