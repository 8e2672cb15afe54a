mod commands;

use anyhow::Result;
use architect_broker::BrokerConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "architect-broker")]
#[command(version, about = "Offline request broker for The Inner Architect", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "BROKER_CONFIG", default_value = "broker.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the configured generation and run the proxy
    Serve {
        /// Port to listen on (overrides [server].port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Replay queued actions selected by a sync tag
    Sync {
        /// sync-user-data, sync-exercise-progress or sync-all
        tag: String,
    },

    /// Run one periodic sync task
    PeriodicSync {
        /// check-reminders or update-content
        tag: String,
    },

    /// List queued actions
    Pending {
        /// Include actions that were already synced
        #[arg(short, long)]
        all: bool,
    },

    /// List cache generations in the configured backend
    Generations,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = BrokerConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve { port } => commands::serve::execute(config, port).await?,
        Commands::Sync { tag } => commands::sync::execute(config, &tag).await?,
        Commands::PeriodicSync { tag } => commands::sync::execute_periodic(config, &tag).await?,
        Commands::Pending { all } => commands::pending::execute(config, all).await?,
        Commands::Generations => commands::generations::execute(config).await?,
    }

    Ok(())
}
