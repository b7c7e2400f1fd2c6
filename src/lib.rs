//! binswap - in-place self-update engine for standalone executables
//!
//! A binary that embeds binswap installs every build next to the others as
//! `{product}_v{N}[.{ext}]`. On startup it asks the engine whether a newer build
//! exists, locally or in its source repository; if so, the engine fetches it,
//! hands off to a detached swap script and tells the caller to exit. The script
//! waits for the old process to go away, swaps the files and starts the new
//! build.
//!
//! # Architecture Overview
//!
//! - Build numbers are positive integers, recovered from file names, commit
//!   messages and marker files by the same resolver
//! - Remote discovery is best-effort: three sources, each under a timeout, and
//!   the highest build any of them reports wins
//! - Nothing is replaced in-process; the post-exit continuation is a data-only
//!   swap plan rendered to a shell or batch script
//! - No error ever reaches the caller of an update check; failures degrade to
//!   "no update" or "failed" and the application keeps running
//!
//! # Core Modules
//!
//! - [`upgrade`] - the update engine (inventory, probing, download, swap plan, orchestrator)
//! - [`config`] - `~/.binswap/config.toml` loading and defaults
//! - [`core`] - error types and user-facing error reporting
//! - [`cli`] - the `binswap` command-line tool
//! - [`utils`] - file moves and progress bars
//! - [`constants`] - shared defaults
//!
//! # Embedding
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use binswap::config::UpdaterConfig;
//! use binswap::upgrade::{
//!     BuildNumber, DetachedLauncher, DownloadManager, ProcessLivenessProbe,
//!     RemoteVersionProber, UpdateOrchestrator, UpdateOutcome,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = UpdaterConfig::load().await?;
//!     let client = config.http_client()?;
//!     let orchestrator = UpdateOrchestrator::new(
//!         config.context()?,
//!         Arc::new(RemoteVersionProber::from_config(&config.remote, client.clone())),
//!         Arc::new(DownloadManager::new(client, config.remote.download_timeout())),
//!         Arc::new(ProcessLivenessProbe),
//!         Arc::new(DetachedLauncher::default()),
//!     );
//!
//!     let build: BuildNumber = env!("CARGO_PKG_VERSION_PATCH").parse().map_err(anyhow::Error::msg)?;
//!     if let UpdateOutcome::SwitchInProgress { .. } = orchestrator.check_for_update(build).await {
//!         return Ok(());
//!     }
//!
//!     // normal application logic
//!     Ok(())
//! }
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! binswap check --current 12          # check and hand off
//! binswap check --current 12 --dry-run --plan-format json
//! binswap prune                       # delete builds older than the running one
//! binswap status --offline
//! binswap config init
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
