//! Process-start wiring kept out of the library core: logging and configuration.

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::AgentError;

/// Install the stderr fmt subscriber. `RUST_LOG` replaces the default `info` filter.
///
/// Does nothing when a global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

/// Initialise logging, then load `.env`, the config file and the environment.
pub fn init() -> Result<Config, AgentError> {
    init_tracing();
    let config = Config::load()?;
    tracing::info!("paper-agent configured");
    Ok(config)
}
