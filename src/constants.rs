//! Global constants used throughout the binswap codebase.
//!
//! Timeouts, cadences and file-naming fragments that several modules share.
//! Values that operators may want to change live in [`crate::config`] instead;
//! these are the defaults it falls back to.

use std::time::Duration;

/// Per-source timeout for remote version probes (5 seconds).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall timeout for a binary download (5 minutes).
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Minimum interval between two progress updates during a download.
///
/// Caps progress output at 10 updates per second.
pub const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Number of commit-log entries fetched by the commit-history probe.
pub const DEFAULT_COMMIT_COUNT: u32 = 10;

/// Delay before the swap plan touches anything, letting the parent start exiting.
pub const DEFAULT_SWAP_INITIAL_DELAY_MS: u64 = 1500;

/// First poll interval while waiting for the old process to exit.
pub const DEFAULT_SWAP_POLL_INITIAL_MS: u64 = 250;

/// Poll interval cap; the interval doubles until it reaches this value.
pub const DEFAULT_SWAP_POLL_MAX_MS: u64 = 2000;

/// Upper bound on the wait for the old process; the plan proceeds regardless afterwards.
pub const DEFAULT_SWAP_MAX_WAIT_SECS: u64 = 30;

/// Suffix of in-flight download files. Never matches the inventory naming rule.
pub const PARTIAL_SUFFIX: &str = ".part";

/// File name prefix of generated swap scripts in the temp directory.
pub const SWAP_SCRIPT_PREFIX: &str = "binswap-swap-";

/// Environment variable that disables progress bars.
pub const NO_PROGRESS_ENV: &str = "BINSWAP_NO_PROGRESS";

/// Environment variable that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "BINSWAP_CONFIG";
