use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Builds the filter for broker logs.
///
/// `RUST_LOG` wins when set; otherwise the configured level (or directive
/// list such as `info,aasb_broker::broker=trace`) is used. An unparseable
/// level falls back to `info`.
pub fn filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing for the demo binary and tests.
///
/// Executor worker threads are named after their direction, so thread names
/// are included in every line.
pub fn init(settings: &LoggingSettings) {
    // try_init so tests and the binary can both call this without panicking
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(settings))
        .with_thread_names(true)
        .try_init();
}
