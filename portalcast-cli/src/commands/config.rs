//! Config command - manage the configuration file

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use portalcast_core::config::{ConfigFile, sample_config};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    let path = ConfigFile::default_path();

    match args.command {
        ConfigCommand::Path => {
            let state = if path.exists() { "exists" } else { "does not exist" };
            println!("{} ({})", path.display(), state);
        }
        ConfigCommand::Show => {
            let file = if path.exists() {
                println!("Configuration file: {}\n", path.display());
                ConfigFile::load_from(path.clone()).context("Failed to load config file")?
            } else {
                println!("No configuration file at {}, showing defaults.\n", path.display());
                ConfigFile::default()
            };

            println!("[negotiation]");
            println!("  timeout_ms      = {}", file.negotiation.timeout_ms);
            println!("[connection]");
            println!("  join_timeout_ms = {}", file.connection.join_timeout_ms);
            println!("[input]");
            println!("  application     = {}", file.input.application);
            println!("  reason          = {}", file.input.reason);
            println!("[notifications]");
            println!("  enabled         = {}", file.notifications.enabled);
            println!("  app_name        = {}", file.notifications.app_name);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }

            ConfigFile::default()
                .save_to(path.clone())
                .context("Failed to write config file")?;
            println!("Created configuration file: {}", path.display());
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
