//! `binswap config`: inspect or create the configuration file.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use super::common::CliConfig;
use crate::config::UpdaterConfig;

/// Manage the updater configuration.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommands {
    /// Print the effective configuration (default)
    Show,
    /// Print the configuration file location
    Path,
    /// Write a configuration file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let path = match &cli.config_path {
            Some(path) => path.clone(),
            None => UpdaterConfig::default_path()?,
        };

        match self.command {
            Some(ConfigSubcommands::Show) | None => Self::show(path).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", path.display());
                Ok(())
            }
            Some(ConfigSubcommands::Init {
                force,
            }) => Self::init(path, force).await,
        }
    }

    async fn show(path: PathBuf) -> Result<()> {
        let config = UpdaterConfig::load_with_optional(Some(path.clone())).await?;

        println!("{}", "binswap configuration".bold());
        if path.exists() {
            println!("Location: {}\n", path.display());
        } else {
            println!("Location: {} {}\n", path.display(), "(not created, using defaults)".dimmed());
        }
        println!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }

    async fn init(path: PathBuf, force: bool) -> Result<()> {
        if path.exists() && !force {
            println!("{} Config already exists at: {}", "✗".red(), path.display());
            println!("  Use --force to overwrite");
            return Ok(());
        }

        UpdaterConfig::default().save_to(&path).await?;
        println!("{} Created config at: {}", "✓".green(), path.display());
        println!("\n{}", "Next steps:".yellow());
        println!("  1. Set [product] name and install_dir");
        println!("  2. Point [remote] owner, repo and download_url at your releases");
        Ok(())
    }
}
