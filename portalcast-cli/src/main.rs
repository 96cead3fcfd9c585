//! Portalcast CLI
//!
//! Drive the KWin screencast bridge from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # List outputs the compositor announces
//! portalcast screens
//!
//! # Capture an output with an embedded cursor
//! portalcast cast --output 42 --cursor embedded
//!
//! # Write a default config file
//! portalcast config init
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Portalcast - KWin screencast and fake-input bridge
#[derive(Parser)]
#[command(name = "portalcast")]
#[command(version)]
#[command(about = "KWin screencast and fake-input bridge for desktop portals", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List outputs available for capture
    #[command(alias = "ls")]
    Screens,

    /// Show which compositor capabilities are bound
    Info,

    /// Start a capture stream and hold it until interrupted
    Cast(commands::CastArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("portalcast={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Screens => commands::screens().await?,
        Commands::Info => commands::info().await?,
        Commands::Cast(args) => commands::cast(args).await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
