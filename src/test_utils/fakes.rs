//! Scripted collaborators for [`UpdateOrchestrator`](crate::upgrade::UpdateOrchestrator).
//!
//! Each fake counts its calls so tests can assert that a phase was skipped.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::UpdateError;
use crate::upgrade::remote::BoxFuture;
use crate::upgrade::{
    ArtifactFetcher, BuildNumber, DownloadedFile, Liveness, LivenessProbe, PlanLauncher,
    RemoteProbe, SwapPlan,
};

/// Remote probe returning a fixed answer.
#[derive(Debug, Default)]
pub struct FakeRemote {
    latest: Option<BuildNumber>,
    calls: AtomicUsize,
}

impl FakeRemote {
    /// Probe that reports `build` as the latest published build.
    pub fn reporting(build: u64) -> Self {
        Self {
            latest: BuildNumber::new(build),
            calls: AtomicUsize::new(0),
        }
    }

    /// Probe for which every source failed.
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteProbe for FakeRemote {
    fn latest_build(&self) -> BoxFuture<'_, Option<BuildNumber>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { self.latest })
    }
}

#[derive(Debug, Clone)]
enum FetchBehavior {
    Serve(Vec<u8>),
    /// Write `partial` bytes while declaring `declared` bytes
    Truncate {
        partial: Vec<u8>,
        declared: u64,
    },
    Fail(String),
}

/// Fetcher writing canned bytes into the staging path.
#[derive(Debug)]
pub struct FakeFetcher {
    behavior: FetchBehavior,
    urls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    /// Fetch succeeds with `body`, declaring its exact length.
    pub fn serving(body: impl Into<Vec<u8>>) -> Self {
        Self::with(FetchBehavior::Serve(body.into()))
    }

    /// Fetch writes `partial` but the server declared `declared` bytes. The
    /// staged file is left behind for the verifier to reject.
    pub fn truncating(partial: impl Into<Vec<u8>>, declared: u64) -> Self {
        Self::with(FetchBehavior::Truncate {
            partial: partial.into(),
            declared,
        })
    }

    /// Fetch fails with a network error.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with(FetchBehavior::Fail(reason.into()))
    }

    fn with(behavior: FetchBehavior) -> Self {
        Self {
            behavior,
            urls: Mutex::new(Vec::new()),
        }
    }

    /// URLs requested so far.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.urls().len()
    }
}

impl ArtifactFetcher for FakeFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        staging: &'a Path,
    ) -> BoxFuture<'a, Result<DownloadedFile, UpdateError>> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }

        Box::pin(async move {
            let (bytes, declared) = match &self.behavior {
                FetchBehavior::Serve(body) => (body, body.len() as u64),
                FetchBehavior::Truncate {
                    partial,
                    declared,
                } => (partial, *declared),
                FetchBehavior::Fail(reason) => {
                    return Err(UpdateError::network("download", reason));
                }
            };

            tokio::fs::write(staging, bytes)
                .await
                .map_err(|e| UpdateError::fs("write staging file", staging, e))?;
            Ok(DownloadedFile {
                path: staging.to_path_buf(),
                len: bytes.len() as u64,
                declared_len: Some(declared),
            })
        })
    }
}

/// Liveness probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedLiveness(pub Liveness);

impl FixedLiveness {
    pub fn running(pid: u32) -> Self {
        Self(Liveness::Running {
            pid: Some(pid),
        })
    }

    pub fn stopped() -> Self {
        Self(Liveness::NotRunning)
    }
}

impl LivenessProbe for FixedLiveness {
    fn probe<'a>(&'a self, _image: &'a Path) -> BoxFuture<'a, Liveness> {
        Box::pin(async move { self.0 })
    }
}

/// Launcher that records plans instead of running them.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    plans: Mutex<Vec<SwapPlan>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher whose every launch fails.
    pub fn failing() -> Self {
        Self {
            plans: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn plans(&self) -> Vec<SwapPlan> {
        self.plans.lock().map(|plans| plans.clone()).unwrap_or_default()
    }
}

impl PlanLauncher for RecordingLauncher {
    fn launch<'a>(&'a self, plan: &'a SwapPlan) -> BoxFuture<'a, Result<(), UpdateError>> {
        Box::pin(async move {
            if self.fail {
                return Err(UpdateError::Launch {
                    reason: "launch disabled in test".to_string(),
                });
            }
            if let Ok(mut plans) = self.plans.lock() {
                plans.push(plan.clone());
            }
            Ok(())
        })
    }
}
