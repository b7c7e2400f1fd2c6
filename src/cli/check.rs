//! `binswap check`: run one update check and hand off if a newer build exists.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::sync::Arc;

use super::common::{CliConfig, build_orchestrator, resolve_current_build};
use crate::upgrade::{
    BuildNumber, DetachedLauncher, DryRunLauncher, PlanLauncher, ScriptFlavor, SwapPlan,
    UpdateOutcome,
};

/// How `--dry-run` prints the swap plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanFormat {
    /// Script for the current platform
    Native,
    /// POSIX shell script
    Sh,
    /// Windows batch script
    Cmd,
    /// JSON step list
    Json,
}

/// Check for a newer build and switch to it.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Build number of the running binary (default: parsed from its file name)
    #[arg(long)]
    current: Option<BuildNumber>,

    /// Do everything up to the handoff, then print the swap plan instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Output format of the plan printed by --dry-run
    #[arg(long, value_enum, default_value = "native")]
    plan_format: PlanFormat,
}

impl CheckCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_config().await?;
        let context = config.context()?;
        let current = resolve_current_build(self.current, &context)?;

        let dry_run = Arc::new(DryRunLauncher::new());
        let launcher: Arc<dyn PlanLauncher> = if self.dry_run {
            dry_run.clone()
        } else {
            Arc::new(DetachedLauncher::default())
        };
        let orchestrator = build_orchestrator(&config, context, launcher, cli.show_progress())?;

        match orchestrator.check_for_update(current).await {
            UpdateOutcome::NoUpdate => {
                println!("{} Build {} is up to date", "✓".green(), current);
            }
            UpdateOutcome::Failed => {
                println!(
                    "{} Update attempt failed; staying on build {} (run with --verbose for details)",
                    "⚠".yellow(),
                    current
                );
            }
            UpdateOutcome::SwitchInProgress {
                build,
                target,
            } => {
                if self.dry_run {
                    println!(
                        "{} Would switch from build {} to {} ({})",
                        "→".cyan(),
                        current,
                        build,
                        target.display()
                    );
                    for plan in dry_run.plans() {
                        println!("{}", render_plan(&plan, self.plan_format)?);
                    }
                } else {
                    println!("{} Switching to build {} at {}", "→".cyan(), build, target.display());
                    std::process::exit(0);
                }
            }
        }

        Ok(())
    }
}

fn render_plan(plan: &SwapPlan, format: PlanFormat) -> Result<String> {
    Ok(match format {
        PlanFormat::Native => plan.render(ScriptFlavor::native()),
        PlanFormat::Sh => plan.render(ScriptFlavor::Sh),
        PlanFormat::Cmd => plan.render(ScriptFlavor::Cmd),
        PlanFormat::Json => plan.to_json()?,
    })
}
