//! Logging setup.
//!
//! stdout carries the IPC stream, so every log line goes to stderr.
//! - `GRADEBOOKD_LOG` sets the filter (default `info`).
//! - `GRADEBOOKD_LOG_FORMAT=json` switches to JSON lines.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("GRADEBOOKD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false);

    match std::env::var("GRADEBOOKD_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
