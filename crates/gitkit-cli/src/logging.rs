//! Log output for the CLI.
//!
//! Logs go to stderr: `info-refs` and `upload-pack` write protocol bytes to
//! stdout, which must stay clean.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
pub fn init(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
