use std::fs::OpenOptions;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber: stderr filtered by `MURMUR_LOG`
/// (default `info`), plus a debug-level file layer when `MURMUR_LOG_FILE`
/// is set. Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("MURMUR_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);
    let registry = tracing_subscriber::registry().with(stderr_layer);

    let file_layer = std::env::var("MURMUR_LOG_FILE").ok().and_then(|log_path| {
        match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG),
            ),
            Err(e) => {
                eprintln!("Could not open log file {}: {}", log_path, e);
                None
            }
        }
    });

    if registry.with(file_layer).try_init().is_err() {
        tracing::debug!("Tracing already initialized");
    }
}
