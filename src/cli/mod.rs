use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use fxsignal::config::Config;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "fxsignal",
    about = "Indicator-driven FX alert bot",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the broker and run the scan loop and chat command bot until Ctrl-C
    Run,

    /// Score today's candidate instruments once and print the breakdown
    Scan {
        /// Send the strongest signal to the alert chat
        #[arg(long)]
        send: bool,
    },

    /// Validate configuration and print a redacted summary
    CheckConfig,
}

/// Execute CLI command with loaded configuration
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run => {
            info!("Starting alert bot");
            commands::run_bot(config).await?;
        }
        Commands::Scan { send } => {
            info!("Running one-off scan");
            commands::scan(config, send).await?;
        }
        Commands::CheckConfig => {
            commands::check_config(&config)?;
        }
    }
    Ok(())
}
