//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Initialise `tracing-subscriber` from `RUST_LOG` (default `info`).
///
/// `WHEELHOUSE_LOG_FORMAT=json` switches to newline-delimited JSON. Logs
/// always go to stderr: stdout carries bus messages.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("WHEELHOUSE_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
