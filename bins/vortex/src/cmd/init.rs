//! `vortex init` — writes a default `config.yml` for local testing.

use vortex_core::config::{ConfigError, Configuration};

pub fn run() -> anyhow::Result<()> {
    super::install_default_logging();

    let current_dir = std::env::current_dir()?;
    match Configuration::init_default_file(&current_dir) {
        Ok(()) => {
            tracing::info!("Configuration initialized!");
            Ok(())
        }
        Err(ConfigError::AlreadyExists) => {
            tracing::error!("Configuration already exists!");
            Ok(())
        }
        Err(err) => {
            tracing::error!(%err, "Could not initialize configuration!");
            Err(err.into())
        }
    }
}
