//! edirelay CLI — the main entry point.
//!
//! Commands:
//! - `outbound` — Send documents from the pickup folder to their partners
//! - `inbound`  — Collect new documents from every enabled partner
//! - `check`    — Validate configuration and preview archive destinations
//!
//! Each invocation performs a single run and exits; scheduling is left to
//! cron, systemd timers or the Windows Task Scheduler.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use edirelay_config::{DEFAULT_MASTER_CONFIG, DEFAULT_PARTNERS_CONFIG};

mod commands;
mod logging;

#[derive(Parser)]
#[command(
    name = "edirelay",
    about = "edirelay — X12 EDI routing over FTP/SFTP",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Locations of the two configuration files.
#[derive(Args, Debug, Clone)]
pub struct ConfigPaths {
    /// Master settings file (folders, archive templates, logging)
    #[arg(
        short = 'm',
        long = "master-config",
        env = "EDIRELAY_MASTER_CONFIG",
        default_value = DEFAULT_MASTER_CONFIG
    )]
    pub master_config: PathBuf,

    /// Trading partner list
    #[arg(
        short = 'p',
        long = "partners-config",
        env = "EDIRELAY_PARTNERS_CONFIG",
        default_value = DEFAULT_PARTNERS_CONFIG
    )]
    pub partners_config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Send pickup-folder documents to the partner named in their ISA header
    Outbound {
        #[command(flatten)]
        paths: ConfigPaths,
    },

    /// Download new documents from every enabled partner
    Inbound {
        #[command(flatten)]
        paths: ConfigPaths,
    },

    /// Validate configuration and show where documents would be archived
    Check {
        #[command(flatten)]
        paths: ConfigPaths,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Outbound { paths } => commands::outbound::run(&paths, cli.verbose).await?,
        Commands::Inbound { paths } => commands::inbound::run(&paths, cli.verbose).await?,
        Commands::Check { paths } => commands::check::run(&paths, cli.verbose)?,
    }

    Ok(())
}
