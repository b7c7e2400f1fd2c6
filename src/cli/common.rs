//! Helpers shared by the CLI commands.

use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::UpdaterConfig;
use crate::upgrade::{
    BuildNumber, DownloadManager, PlanLauncher, ProcessLivenessProbe, RemoteVersionProber,
    UpdateContext, UpdateOrchestrator, resolve_build_number,
};
use crate::utils::progress::is_progress_disabled;

/// Settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// `--no-progress`
    pub no_progress: bool,
    /// `--config`
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Whether download progress bars should be drawn.
    pub fn show_progress(&self) -> bool {
        !self.no_progress && !is_progress_disabled()
    }

    pub async fn load_config(&self) -> Result<UpdaterConfig> {
        UpdaterConfig::load_with_optional(self.config_path.clone()).await
    }
}

/// Wire the default collaborators into an orchestrator.
pub fn build_orchestrator(
    config: &UpdaterConfig,
    context: UpdateContext,
    launcher: Arc<dyn PlanLauncher>,
    show_progress: bool,
) -> Result<UpdateOrchestrator> {
    let client = config.http_client()?;
    let prober = RemoteVersionProber::from_config(&config.remote, client.clone());
    let downloader =
        DownloadManager::new(client, config.remote.download_timeout()).with_progress(show_progress);

    Ok(UpdateOrchestrator::new(
        context,
        Arc::new(prober),
        Arc::new(downloader),
        Arc::new(ProcessLivenessProbe),
        launcher,
    ))
}

/// The build to treat as running: `explicit` if given, else the number in the
/// running executable's file name.
pub fn resolve_current_build(
    explicit: Option<BuildNumber>,
    context: &UpdateContext,
) -> Result<BuildNumber> {
    if let Some(build) = explicit {
        return Ok(build);
    }

    let image = context
        .current_image
        .as_ref()
        .ok_or_else(|| anyhow!("Cannot locate the running executable; pass --current"))?;
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Running executable has no file name")?;

    context
        .naming
        .parse(&file_name)
        .or_else(|| resolve_build_number(&file_name))
        .ok_or_else(|| anyhow!("No build number in executable name '{file_name}'; pass --current"))
}
