//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*, util::TryInitError};

use crate::config::LogFormat;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects `debug` over `info`.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init(format: LogFormat, verbose: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .try_init(),
    }
}
