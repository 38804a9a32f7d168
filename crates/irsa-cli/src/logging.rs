//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::commands::LogFormat;

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
///
/// Logs go to stderr so that command output on stdout stays machine readable.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
