//! Utility modules shared across binswap.
//!
//! - [`fs`] - file moves with a copy fallback, quiet removal, permissions
//! - [`progress`] - download progress bars and rate limiting

pub mod fs;
pub mod progress;

pub use fs::{make_executable, move_file, remove_quietly};
pub use progress::{ProgressBar, ProgressStyle, RateLimiter};
