//! deputize - Keep on-call access in line with PagerDuty
//!
//! Reads who is on call from PagerDuty schedules and reconciles:
//! - LDAP group membership
//! - Gitlab group membership
//! - Slack channel topics

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;
mod logging;
mod output;

use error::CliResult;

/// deputize - On-call access reconciliation
#[derive(Parser)]
#[command(name = "deputize")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every enabled sink with the current on-call roster
    Oncall(commands::oncall::OncallArgs),

    /// Validate the config file and the credentials it needs
    CheckConfig(commands::check_config::CheckConfigArgs),

    /// Print version and build information
    Version(commands::version::VersionArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Oncall(args) => commands::oncall::execute(args).await,
        Commands::CheckConfig(args) => commands::check_config::execute(args).await,
        Commands::Version(args) => {
            commands::version::execute(args);
            Ok(())
        }
    }
}
