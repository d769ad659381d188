//! `tracing` subscriber setup.
//!
//! Library code only emits events; binaries and test harnesses call [`init`]
//! to get them printed. The filter is read from `PIXEL_TRANSFER_LOG`, then
//! `RUST_LOG`, and defaults to `warn`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PIXEL_TRANSFER_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install a global fmt subscriber. Later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_thread_names(true)
        .try_init();
}

/// Like [`init`], but writes through the test harness's captured output.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}
