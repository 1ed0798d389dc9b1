//! `vortex serve` — loads configuration, wires up the pipeline, and runs until
//! a shutdown signal arrives.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vortex_core::config::Configuration;
use vortex_io::{KafkaSource, MongoSink};

pub async fn run() -> anyhow::Result<()> {
    let current_dir = std::env::current_dir()?;
    let (config, file_found) = Configuration::load(&current_dir)?;

    install_logging(&config)?;

    if !file_found {
        tracing::info!("Configuration file not found but environment variables will be taken into account!");
    }
    tracing::info!("Starting vortex...");

    let source = Arc::new(KafkaSource::new(&config.kafka)?);
    let (record_rx, commit) = source.run();

    let registry = vortex_transforms::default_registry();
    let sink = Arc::new(MongoSink::connect(config.mongo.clone(), registry, commit).await?);

    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            if let Err(err) = vortex_io::metrics::serve(port).await {
                tracing::error!(%err, "Metrics server exited");
            }
        });
    }

    let mut sink_task = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move { sink.run(record_rx).await })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            tracing::info!("Received shutdown signal, terminating...");
            source.stop();
            sink.stop();
        }
        result = &mut sink_task => {
            return Ok(result??);
        }
    }

    sink_task.await??;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::warn!(%err, "Could not install SIGTERM handler");
            std::future::pending().await
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

/// Installs the global `tracing` subscriber at the configured level. At debug
/// level, switches to a pretty, ANSI console writer (mirroring the original's
/// `zerolog.ConsoleWriter` swap); otherwise logs structured JSON, suited for
/// collection by a log shipper.
fn install_logging(config: &Configuration) -> anyhow::Result<()> {
    let level = config.parsed_log_level()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);

    if level == tracing::Level::DEBUG || level == tracing::Level::TRACE {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }

    Ok(())
}
