//! Global `tracing` subscriber setup.
//!
//! Verbosity is configured with upper-case level names (`ERROR`, `INFO`,
//! `DEBUG`); anything unrecognised falls back to `INFO`. `RUST_LOG` always
//! wins when it is set.

use tracing_subscriber::EnvFilter;

/// Output format for the stderr log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Map a verbosity name to an `EnvFilter` directive.
pub fn filter_directive(verbosity: &str) -> &'static str {
    match verbosity.trim().to_ascii_uppercase().as_str() {
        "ERROR" => "error",
        "WARN" | "WARNING" => "warn",
        "DEBUG" => "debug",
        "TRACE" => "trace",
        _ => "info",
    }
}

/// Initialize the global tracing subscriber writing to stderr.
///
/// Call once at startup. Subsequent calls are no-ops.
pub fn init_subscriber(verbosity: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails only when a global subscriber already exists
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
