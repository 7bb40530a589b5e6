//! Tracing setup shared by the binaries.
use std::io::IsTerminal;

use tracing_subscriber::{fmt, EnvFilter};

/// Install a stderr fmt subscriber. `RUST_LOG` takes precedence over
/// `level`; stdout stays free for JSON output. Calling twice is harmless.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("coffee_core={level},{level}")));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}
