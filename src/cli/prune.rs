//! `binswap prune`: delete installed builds older than the running one.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use super::common::{CliConfig, build_orchestrator, resolve_current_build};
use crate::upgrade::{BuildNumber, DryRunLauncher};

/// Remove obsolete local builds.
#[derive(Args, Debug)]
pub struct PruneCommand {
    /// Keep this build and everything newer (default: the running build)
    #[arg(long)]
    current: Option<BuildNumber>,
}

impl PruneCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_config().await?;
        let context = config.context()?;
        let current = resolve_current_build(self.current, &context)?;
        let install_dir = context.install_dir.clone();

        // Pruning never hands off, so the launcher is inert
        let orchestrator =
            build_orchestrator(&config, context, Arc::new(DryRunLauncher::new()), false)?;
        let report = orchestrator.prune_obsolete_local_builds(current).await;

        if report.removed.is_empty() && report.skipped.is_empty() {
            println!("Nothing older than build {} in {}", current, install_dir.display());
            return Ok(());
        }

        for path in &report.removed {
            println!("{} Removed {}", "✓".green(), path.display());
        }
        for (path, reason) in &report.skipped {
            println!("{} Kept {} ({})", "⚠".yellow(), path.display(), reason);
        }
        Ok(())
    }
}
