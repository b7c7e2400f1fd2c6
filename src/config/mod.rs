//! Configuration management for binswap.
//!
//! # Configuration File
//!
//! **Location:**
//! - Unix/macOS: `~/.binswap/config.toml`
//! - Windows: `%LOCALAPPDATA%\binswap\config.toml`
//! - Overrides: `--config <path>`, then `BINSWAP_CONFIG`
//!
//! The file has three sections:
//!
//! - `[product]` - binary naming and install directory
//! - `[remote]` - repository coordinates, probe timeouts, download URL template
//! - `[swap]` - swap plan delays and relaunch arguments
//!
//! A missing file, or a missing field, falls back to the built-in defaults.
//!
//! # Examples
//!
//! ```rust,no_run
//! use binswap::config::UpdaterConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load().await?;
//! let context = config.context()?;
//! println!("Installing into {}", context.install_dir.display());
//! # Ok(())
//! # }
//! ```

mod global;

pub use global::{ProductConfig, RemoteConfig, SwapConfig, UpdaterConfig};
