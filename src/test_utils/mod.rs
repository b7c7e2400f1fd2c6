//! Test utilities for binswap
//!
//! Shared by unit tests and, through the `test-utils` feature, by the
//! integration tests:
//!
//! - [`fakes`] - scripted stand-ins for the orchestrator's collaborators
//! - [`fixtures`] - temporary install directories and a local HTTP stub server

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeFetcher, FakeRemote, FixedLiveness, RecordingLauncher};
pub use fixtures::{InstallDirFixture, StubResponse, StubServer};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging once per process.
///
/// With `level` set, logs at that level; otherwise follows `RUST_LOG` and stays
/// silent when it is unset.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
