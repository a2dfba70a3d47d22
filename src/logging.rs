//! Console logging setup

use tracing_subscriber::EnvFilter;

use crate::cli::VerbosityLevel;
use crate::error::{Result, ServerError};

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flags;
/// colours are used only when stderr is a terminal.
pub fn init(verbosity: VerbosityLevel) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .try_init()
        .map_err(|err| ServerError::Logging(err.to_string()))
}
