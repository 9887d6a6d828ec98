use tracing_subscriber::EnvFilter;

use crate::error::{Result, SyncError};

/// Installs the global tracing subscriber. Logs go to standard error so that
/// standard output carries nothing but the report. `RUST_LOG` takes
/// precedence over `verbosity`.
pub fn init(verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| SyncError::Logging(err.to_string()))
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
