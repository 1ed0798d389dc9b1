//! A tiny service for sending data from Kafka to MongoDB.

mod cmd;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vortex")]
#[command(about = "A tiny service for sending data from Kafka to MongoDB")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initializes a new configuration file for local testing
    Init,
    /// Starts the actual service
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init => cmd::init::run(),
        Command::Serve => cmd::serve::run().await,
    }
}
