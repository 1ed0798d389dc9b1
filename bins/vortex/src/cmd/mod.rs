pub mod init;
pub mod serve;

/// A bare `info`-level console subscriber, used by subcommands that run before
/// (or without ever needing) the configured log level — `init` never reads
/// `config.yml`, so it has nothing to parse a level out of.
fn install_default_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
