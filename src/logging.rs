use tracing_subscriber::EnvFilter;
use crate::error::{AppError, Result};

/// Installs the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| AppError::Config(format!("build log filter: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Config(format!("initialize tracing subscriber: {}", e)))?;

    Ok(())
}
