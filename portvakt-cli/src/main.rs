//! ## portvakt
//! **Operational entrypoint**
//!
//! Runs the intrusion-response daemon, and provides the two maintenance
//! commands an operator needs around it: tearing down leftover firewall
//! state after an unclean exit, and inspecting the persisted ban records.

use clap::Parser;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run_daemon(cli.config, args).await,
        Commands::Teardown => commands::teardown(cli.config),
        Commands::List => commands::list_bans(cli.config),
    }
}
