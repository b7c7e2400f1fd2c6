//! The update state machine.
//!
//! ```text
//! Init → ResolveLocal ─┬─ (newer local build) ─────────────────────→ SwitchLocal ─┐
//!                      └→ ResolveRemote → Decide ─┬→ NoOp                         │
//!                                                 ├→ SwitchLocal ─────────────────┤
//!                                                 └→ Download → Verify → Stage ───┴→ Handoff
//! ```
//!
//! [`UpdateOrchestrator::check_for_update`] never returns an error. Failures
//! degrade to [`UpdateOutcome::NoUpdate`] (nothing could be learned) or
//! [`UpdateOutcome::Failed`] (an attempt was started and abandoned), and the
//! caller keeps running either way.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::core::UpdateError;
use crate::upgrade::build_number::BuildNumber;
use crate::upgrade::download::ArtifactFetcher;
use crate::upgrade::inventory::{BinaryNaming, LocalInventory, PruneReport};
use crate::upgrade::launcher::PlanLauncher;
use crate::upgrade::liveness::{Liveness, LivenessProbe};
use crate::upgrade::remote::RemoteProbe;
use crate::upgrade::swap_plan::{SwapPlan, SwapRequest, SwapTimings};
use crate::upgrade::verification::ArtifactVerifier;
use crate::utils::fs::{make_executable, move_file, remove_quietly};

/// Result of one update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Already on the latest known build, or nothing could be learned.
    NoUpdate,
    /// A swap plan is running; the caller must exit now.
    SwitchInProgress {
        /// Build being switched to
        build: BuildNumber,
        /// Binary that will be launched
        target: PathBuf,
    },
    /// An update was attempted and abandoned. The caller keeps running.
    Failed,
}

/// Phases of an update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    ResolveLocal,
    ResolveRemote,
    Decide,
    NoOp,
    SwitchLocal,
    Download,
    Verify,
    Stage,
    Handoff,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything the orchestrator needs to know about the installation.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    /// Directory holding every versioned binary
    pub install_dir: PathBuf,
    /// File naming convention
    pub naming: BinaryNaming,
    /// The running executable, if known
    pub current_image: Option<PathBuf>,
    /// Download URL with `{build}` and `{file}` placeholders
    pub download_url: String,
    /// Arguments passed to the relaunched binary
    pub relaunch_args: Vec<String>,
    /// Swap plan delays
    pub timings: SwapTimings,
}

impl UpdateContext {
    /// Context with default timings, no relaunch arguments and no download URL.
    pub fn new(install_dir: impl Into<PathBuf>, naming: BinaryNaming) -> Self {
        Self {
            install_dir: install_dir.into(),
            naming,
            current_image: None,
            download_url: String::new(),
            relaunch_args: Vec::new(),
            timings: SwapTimings::default(),
        }
    }

    pub fn with_current_image(mut self, image: impl Into<PathBuf>) -> Self {
        self.current_image = Some(image.into());
        self
    }

    pub fn with_download_url(mut self, template: impl Into<String>) -> Self {
        self.download_url = template.into();
        self
    }

    pub fn with_relaunch_args(mut self, args: Vec<String>) -> Self {
        self.relaunch_args = args;
        self
    }

    pub fn with_timings(mut self, timings: SwapTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Canonical path of a build, e.g. `install_dir/scraper_v12`.
    pub fn target_path(&self, build: BuildNumber) -> PathBuf {
        self.install_dir.join(self.naming.file_name(build))
    }

    /// Staging path used while downloading a build.
    pub fn staging_path(&self, build: BuildNumber) -> PathBuf {
        self.install_dir.join(self.naming.partial_file_name(build))
    }

    /// Concrete download URL for a build.
    pub fn download_url_for(&self, build: BuildNumber) -> String {
        self.download_url
            .replace("{build}", &build.to_string())
            .replace("{file}", &self.naming.file_name(build))
    }
}

/// Mutable state of one check.
struct UpdateTask {
    phase: Phase,
    current: BuildNumber,
}

impl UpdateTask {
    fn new(current: BuildNumber) -> Self {
        Self {
            phase: Phase::Init,
            current,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!("Update phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}

/// Runs update checks against injected collaborators.
pub struct UpdateOrchestrator {
    context: UpdateContext,
    remote: Arc<dyn RemoteProbe>,
    fetcher: Arc<dyn ArtifactFetcher>,
    liveness: Arc<dyn LivenessProbe>,
    launcher: Arc<dyn PlanLauncher>,
}

impl UpdateOrchestrator {
    pub fn new(
        context: UpdateContext,
        remote: Arc<dyn RemoteProbe>,
        fetcher: Arc<dyn ArtifactFetcher>,
        liveness: Arc<dyn LivenessProbe>,
        launcher: Arc<dyn PlanLauncher>,
    ) -> Self {
        Self {
            context,
            remote,
            fetcher,
            liveness,
            launcher,
        }
    }

    pub fn context(&self) -> &UpdateContext {
        &self.context
    }

    /// Scan the install directory.
    pub async fn inventory(&self) -> Result<LocalInventory, UpdateError> {
        LocalInventory::scan(
            &self.context.install_dir,
            &self.context.naming,
            self.context.current_image.as_deref(),
        )
        .await
    }

    /// Check for a newer build and, if one is available, hand off to it.
    ///
    /// `current` is the build of the running binary. On
    /// [`UpdateOutcome::SwitchInProgress`] the caller must exit immediately so the
    /// swap plan can replace it.
    pub async fn check_for_update(&self, current: BuildNumber) -> UpdateOutcome {
        let mut task = UpdateTask::new(current);
        match self.drive(&mut task).await {
            Ok(outcome) => {
                debug!("Update check finished in phase {}: {:?}", task.phase, outcome);
                outcome
            }
            Err(e) if e.is_transport() => {
                warn!("Transfer failed during {}, retrying on the next check: {}", task.phase, e);
                UpdateOutcome::Failed
            }
            Err(e) => {
                warn!("Update attempt failed during {}: {}", task.phase, e);
                UpdateOutcome::Failed
            }
        }
    }

    /// Delete local builds strictly older than `current`, never the running image.
    pub async fn prune_obsolete_local_builds(&self, current: BuildNumber) -> PruneReport {
        match self.inventory().await {
            Ok(inventory) => inventory.prune_older_than(current).await,
            Err(e) => {
                warn!("Cannot scan {} for pruning: {}", self.context.install_dir.display(), e);
                PruneReport::default()
            }
        }
    }

    async fn drive(&self, task: &mut UpdateTask) -> Result<UpdateOutcome, UpdateError> {
        task.enter(Phase::ResolveLocal);
        let inventory = self.inventory().await.unwrap_or_else(|e| {
            warn!("Local scan failed, treating as empty: {}", e);
            LocalInventory::default()
        });

        // The running image may carry a newer number than the caller reported
        if let Some(image) = inventory.current_image().filter(|r| r.build > task.current) {
            debug!("Running image is build {}, caller reported {}", image.build, task.current);
            task.current = image.build;
        }

        if let Some(local) = inventory.highest().filter(|r| r.build > task.current) {
            info!("Found newer local build {} (running {})", local.build, task.current);
            task.enter(Phase::SwitchLocal);
            return self.handoff(task, local.build, local.path.clone(), None).await;
        }

        task.enter(Phase::ResolveRemote);
        let remote = self.remote.latest_build().await;

        task.enter(Phase::Decide);
        let remote = match remote {
            Some(build) if build > task.current => build,
            Some(build) => {
                info!("Build {} is current (latest published: {})", task.current, build);
                task.enter(Phase::NoOp);
                return Ok(UpdateOutcome::NoUpdate);
            }
            None => {
                debug!("Latest published build is unknown");
                task.enter(Phase::NoOp);
                return Ok(UpdateOutcome::NoUpdate);
            }
        };

        let target = self.context.target_path(remote);
        match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_file() => {
                info!("Build {} is already staged at {}", remote, target.display());
                task.enter(Phase::SwitchLocal);
                return self.handoff(task, remote, target, None).await;
            }
            Ok(_) => {
                return Err(UpdateError::fs(
                    "stage build",
                    &target,
                    io::Error::other("target exists and is not a regular file"),
                ));
            }
            Err(_) => {}
        }

        info!("Updating from build {} to {}", task.current, remote);
        task.enter(Phase::Download);
        let staging = self.context.staging_path(remote);
        let url = self.context.download_url_for(remote);
        let downloaded = self.fetcher.fetch(&url, &staging).await?;

        task.enter(Phase::Verify);
        if let Err(e) = self.verify(&staging, downloaded.declared_len).await {
            remove_quietly(&staging).await;
            return Err(e);
        }

        task.enter(Phase::Stage);
        let staged = match move_file(&staging, &target).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Cannot stage {} ({}); the swap plan will move it", target.display(), e);
                Some(staging)
            }
        };

        self.handoff(task, remote, target, staged).await
    }

    async fn verify(&self, staging: &Path, declared_len: Option<u64>) -> Result<(), UpdateError> {
        ArtifactVerifier::verify(staging, declared_len).await?;
        make_executable(staging).await
    }

    async fn handoff(
        &self,
        task: &mut UpdateTask,
        build: BuildNumber,
        target: PathBuf,
        staged: Option<PathBuf>,
    ) -> Result<UpdateOutcome, UpdateError> {
        task.enter(Phase::Handoff);

        let old_image = self.context.current_image.as_deref();
        let old_liveness = match old_image {
            Some(image) => self.liveness.probe(image).await,
            None => Liveness::NotRunning,
        };

        let plan = SwapPlan::for_handoff(&SwapRequest {
            old_image,
            old_liveness,
            fallback_pid: std::process::id(),
            staged: staged.as_deref(),
            target: &target,
            relaunch_args: &self.context.relaunch_args,
            timings: self.context.timings,
        });
        self.launcher.launch(&plan).await?;

        info!("Switching to build {} at {}", build, target.display());
        Ok(UpdateOutcome::SwitchInProgress {
            build,
            target,
        })
    }
}
