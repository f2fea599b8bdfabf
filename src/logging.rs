//! Diagnostic logging setup. Task lines and the report go through the
//! event sink instead; this only covers `tracing` output on stderr.

use std::io;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Default filter directive for the given `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber once. `RUST_LOG` wins over `verbosity`;
/// `quiet` limits output to warnings and errors.
pub fn init(verbosity: u8, quiet: bool) {
    INIT.call_once(|| {
        let directive = if quiet {
            "warn"
        } else {
            default_directive(verbosity)
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_ansi(false)
            .with_thread_names(true)
            .with_target(false)
            .init();
    });
}
