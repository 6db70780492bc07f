//! Console logging setup

use std::io;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LEVEL_ENV: &str = "BITAXE_THERMOSTAT_LOG";
const ALT_LEVEL_ENV: &str = "RUST_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LEVEL_ENV)
        .or_else(|_| EnvFilter::try_from_env(ALT_LEVEL_ENV))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber writing to stdout.
/// Fails if one is already installed.
pub fn init() -> io::Result<()> {
    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .try_init()
        .map_err(io::Error::other)
}
