use std::io::IsTerminal;

use anyhow::anyhow;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the fmt subscriber for native hosts. The filter comes from
/// configuration only; a second call keeps the first subscriber.
pub fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_new(cfg.filter.trim())
        .map_err(|e| anyhow!("invalid log filter '{}': {e}", cfg.filter))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
