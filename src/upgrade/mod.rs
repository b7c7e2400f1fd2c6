//! Self-update engine.
//!
//! A binary built with binswap keeps every installed build side by side as
//! `{product}_v{N}[.{ext}]` in one directory. On startup it calls
//! [`UpdateOrchestrator::check_for_update`] with its own build number and, if a
//! newer build is available locally or remotely, hands off to it and exits.
//!
//! # Architecture Overview
//!
//! ## Core Components
//!
//! - **[`UpdateOrchestrator`]**: the state machine driving one check
//! - **[`LocalInventory`]**: versioned binaries present in the install directory
//! - **[`RemoteVersionProber`]**: latest published build, from three sources
//! - **[`DownloadManager`]**: streaming download into a hidden staging file
//! - **[`ProcessLivenessProbe`]**: whether the old image is still executing
//! - **[`SwapPlan`]** / **[`DetachedLauncher`]**: the continuation that swaps the
//!   binaries after this process exits
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Resolve local
//!    ├── Scan install_dir for {product}_v{N}
//!    └── Newer local build? → switch to it, no network at all
//!
//! 2. Resolve remote
//!    ├── Commit history, contents API, raw marker (in that order)
//!    └── Keep the maximum build any source reports
//!
//! 3. Decide
//!    ├── Remote unknown or not newer → no update
//!    └── Target already on disk → switch to it, no download
//!
//! 4. Download → Verify → Stage
//!    ├── Stream into .{product}_v{N}.part
//!    ├── Check size, log SHA-256, set executable bit
//!    └── Rename into {product}_v{N}
//!
//! 5. Handoff
//!    ├── Probe liveness of the running image
//!    ├── Build and launch the swap plan (wait, remove old, move, relaunch)
//!    └── Return SwitchInProgress; the caller exits
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use binswap::config::UpdaterConfig;
//! use binswap::upgrade::{
//!     BuildNumber, DetachedLauncher, DownloadManager, ProcessLivenessProbe,
//!     RemoteVersionProber, UpdateOrchestrator, UpdateOutcome,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load().await?;
//! let client = config.http_client()?;
//! let orchestrator = UpdateOrchestrator::new(
//!     config.context()?,
//!     Arc::new(RemoteVersionProber::from_config(&config.remote, client.clone())),
//!     Arc::new(DownloadManager::new(client, Duration::from_secs(300))),
//!     Arc::new(ProcessLivenessProbe),
//!     Arc::new(DetachedLauncher::default()),
//! );
//!
//! let current = BuildNumber::new(12).expect("non-zero");
//! if let UpdateOutcome::SwitchInProgress { .. } = orchestrator.check_for_update(current).await {
//!     std::process::exit(0);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Known Limitations
//!
//! There is no lock on the install directory. Two instances racing through the
//! same update converge through the existing-target check, but may both
//! download the artifact.

/// Build number type and free-text resolution.
pub mod build_number;
/// Streaming downloads into a staging file.
pub mod download;
/// Versioned binaries in the install directory.
pub mod inventory;
pub mod launcher;
/// Process-table lookups for a binary image.
pub mod liveness;
/// The update state machine.
pub mod orchestrator;
/// Latest published build from remote sources.
pub mod remote;
pub mod swap_plan;
/// Size checks and digests for downloaded artifacts.
pub mod verification;

#[cfg(test)]
mod tests;

pub use build_number::{BuildNumber, resolve_build_number};
pub use download::{ArtifactFetcher, DownloadManager, DownloadedFile};
pub use inventory::{BinaryNaming, LocalBinaryRecord, LocalInventory, PruneReport};
pub use launcher::{DetachedLauncher, DryRunLauncher, PlanLauncher};
pub use liveness::{Liveness, LivenessProbe, ProcessLivenessProbe};
pub use orchestrator::{Phase, UpdateContext, UpdateOrchestrator, UpdateOutcome};
pub use remote::{ProbeReport, RemoteProbe, RemoteVersionProber, RemoteVersionRecord};
pub use swap_plan::{ScriptFlavor, SwapPlan, SwapStep, SwapTimings};
pub use verification::ArtifactVerifier;
