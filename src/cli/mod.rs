//! Command-line interface for binswap.
//!
//! ```text
//! binswap [--verbose|--quiet] [--config PATH] [--no-progress] <command>
//!
//!   check   [--current N] [--dry-run]   run one update check
//!   prune   [--current N]               delete builds older than N
//!   status  [--offline] [--json]        local inventory and remote findings
//!   config  show|path|init              inspect or create the config file
//! ```
//!
//! Logging goes to stderr. `RUST_LOG` takes precedence over `--verbose` and
//! `--quiet`.

mod check;
pub mod common;
mod config;
mod prune;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use common::CliConfig;

/// Main CLI structure.
#[derive(Parser, Debug)]
#[command(
    name = "binswap",
    about = "In-place self-update engine for standalone executables",
    version,
    long_about = "binswap keeps versioned builds ({product}_v{N}) side by side, discovers newer \
                  builds from a source repository, and hands off to them through a detached \
                  swap script once the running binary exits."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "BINSWAP_CONFIG")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check for a newer build and switch to it
    Check(check::CheckCommand),
    /// Delete local builds older than the running one
    Prune(prune::PruneCommand),
    /// Show local builds and remote findings
    Status(status::StatusCommand),
    /// Inspect or create the configuration file
    Config(config::ConfigCommand),
}

impl Cli {
    /// Install logging and run the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        init_logging(&config.log_level);
        self.execute_with_config(config).await
    }

    /// Derive [`CliConfig`] from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Prune(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Config(cmd) => cmd.execute(&config).await,
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
