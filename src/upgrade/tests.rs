#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use super::super::*;
    use crate::test_utils::fixtures::build_number;
    use crate::test_utils::{
        FakeFetcher, FakeRemote, FixedLiveness, InstallDirFixture, RecordingLauncher,
        init_test_logging,
    };
    use crate::core::UpdateError;
    use crate::upgrade::remote::BoxFuture;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    struct Harness {
        dir: InstallDirFixture,
        remote: Arc<FakeRemote>,
        fetcher: Arc<FakeFetcher>,
        launcher: Arc<RecordingLauncher>,
        orchestrator: UpdateOrchestrator,
    }

    fn harness(
        dir: InstallDirFixture,
        current_image: Option<u64>,
        remote: FakeRemote,
        fetcher: FakeFetcher,
        launcher: RecordingLauncher,
    ) -> Harness {
        init_test_logging(None);
        let remote = Arc::new(remote);
        let fetcher = Arc::new(fetcher);
        let launcher = Arc::new(launcher);
        let orchestrator = UpdateOrchestrator::new(
            dir.context(current_image),
            remote.clone(),
            fetcher.clone(),
            Arc::new(FixedLiveness::running(4242)),
            launcher.clone(),
        );
        Harness {
            dir,
            remote,
            fetcher,
            launcher,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_newer_local_build_skips_network() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(5);
        let newer = dir.add_build(7);
        let h = harness(
            dir,
            Some(5),
            FakeRemote::reporting(99),
            FakeFetcher::failing("offline"),
            RecordingLauncher::new(),
        );

        let outcome = h.orchestrator.check_for_update(build_number(5)).await;

        assert_eq!(
            outcome,
            UpdateOutcome::SwitchInProgress {
                build: build_number(7),
                target: newer.clone(),
            }
        );
        assert_eq!(h.remote.calls(), 0);
        assert_eq!(h.fetcher.calls(), 0);

        let plans = h.launcher.plans();
        assert_eq!(plans.len(), 1);
        assert!(matches!(
            plans[0].steps().last(),
            Some(SwapStep::Launch { program, .. }) if *program == newer
        ));
    }

    #[tokio::test]
    async fn test_remote_not_newer_is_no_update() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(9);
        let h = harness(
            dir,
            Some(9),
            FakeRemote::reporting(9),
            FakeFetcher::serving(b"unused".to_vec()),
            RecordingLauncher::new(),
        );

        assert_eq!(h.orchestrator.check_for_update(build_number(9)).await, UpdateOutcome::NoUpdate);
        assert_eq!(h.remote.calls(), 1);
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h.launcher.plans().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_remote_is_no_update() {
        let dir = InstallDirFixture::new("tool");
        let h = harness(
            dir,
            None,
            FakeRemote::unreachable(),
            FakeFetcher::serving(b"unused".to_vec()),
            RecordingLauncher::new(),
        );

        assert_eq!(h.orchestrator.check_for_update(build_number(3)).await, UpdateOutcome::NoUpdate);
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_download_stage_and_handoff() {
        let dir = InstallDirFixture::new("tool");
        let old = dir.add_build(5);
        let h = harness(
            dir,
            Some(5),
            FakeRemote::reporting(6),
            FakeFetcher::serving(b"#!/bin/sh\necho six\n".to_vec()),
            RecordingLauncher::new(),
        );

        let outcome = h.orchestrator.check_for_update(build_number(5)).await;

        let target = h.dir.build_path(6);
        assert_eq!(
            outcome,
            UpdateOutcome::SwitchInProgress {
                build: build_number(6),
                target: target.clone(),
            }
        );
        assert_eq!(h.fetcher.urls(), vec!["http://127.0.0.1:9/releases/v6/tool_v6".to_string()]);
        assert_eq!(std::fs::read(&target).unwrap(), b"#!/bin/sh\necho six\n");
        assert_eq!(h.dir.file_names(), vec!["tool_v5", "tool_v6"]);

        let plan = &h.launcher.plans()[0];
        assert!(plan.steps().contains(&SwapStep::RemoveFile {
            path: old,
        }));
        assert!(plan.steps().iter().any(|s| matches!(s, SwapStep::WaitForExit { pid: 4242, .. })));
        assert!(!plan.steps().iter().any(|s| matches!(s, SwapStep::MoveFile { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_staged_artifact_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = InstallDirFixture::new("tool");
        let h = harness(
            dir,
            None,
            FakeRemote::reporting(2),
            FakeFetcher::serving(b"binary".to_vec()),
            RecordingLauncher::new(),
        );

        h.orchestrator.check_for_update(build_number(1)).await;

        let mode = std::fs::metadata(h.dir.build_path(2)).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[tokio::test]
    async fn test_truncated_download_fails_cleanly() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(5);
        let h = harness(
            dir,
            Some(5),
            FakeRemote::reporting(6),
            FakeFetcher::truncating(vec![0u8; 60], 100),
            RecordingLauncher::new(),
        );

        assert_eq!(h.orchestrator.check_for_update(build_number(5)).await, UpdateOutcome::Failed);
        assert_eq!(h.dir.file_names(), vec!["tool_v5"]);
        assert!(h.launcher.plans().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_during_download() {
        let dir = InstallDirFixture::new("tool");
        let h = harness(
            dir,
            None,
            FakeRemote::reporting(6),
            FakeFetcher::failing("connection reset"),
            RecordingLauncher::new(),
        );

        assert_eq!(h.orchestrator.check_for_update(build_number(5)).await, UpdateOutcome::Failed);
        assert!(h.dir.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_second_invocation_reuses_staged_target() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(5);
        let h = harness(
            dir,
            Some(5),
            FakeRemote::reporting(6),
            FakeFetcher::serving(b"six".to_vec()),
            RecordingLauncher::new(),
        );

        // First run reaches handoff, but the caller never exits
        let first = h.orchestrator.check_for_update(build_number(5)).await;
        assert!(matches!(first, UpdateOutcome::SwitchInProgress { .. }));
        assert_eq!(h.remote.calls(), 1);
        assert_eq!(h.fetcher.calls(), 1);

        let second = h.orchestrator.check_for_update(build_number(5)).await;
        assert_eq!(
            second,
            UpdateOutcome::SwitchInProgress {
                build: build_number(6),
                target: h.dir.build_path(6),
            }
        );
        assert_eq!(h.remote.calls(), 1);
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_current_build_present_is_no_update() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(8);
        let h = harness(
            dir,
            Some(8),
            FakeRemote::reporting(8),
            FakeFetcher::serving(b"unused".to_vec()),
            RecordingLauncher::new(),
        );
        assert_eq!(h.orchestrator.check_for_update(build_number(8)).await, UpdateOutcome::NoUpdate);
        assert!(h.launcher.plans().is_empty());
    }

    #[tokio::test]
    async fn test_local_shortcut_without_known_image() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(3);
        let h = harness(
            dir,
            None,
            FakeRemote::reporting(3),
            FakeFetcher::serving(b"unused".to_vec()),
            RecordingLauncher::new(),
        );

        let outcome = h.orchestrator.check_for_update(build_number(2)).await;

        assert!(matches!(outcome, UpdateOutcome::SwitchInProgress { build, .. } if build.get() == 3));
        assert_eq!(h.fetcher.calls(), 0);
        let plan = &h.launcher.plans()[0];
        assert!(!plan.steps().iter().any(|s| matches!(s, SwapStep::WaitForExit { .. })));
        assert!(!plan.steps().iter().any(|s| matches!(s, SwapStep::RemoveFile { .. })));
    }

    #[tokio::test]
    async fn test_launch_failure_is_failed_and_keeps_target() {
        let dir = InstallDirFixture::new("tool");
        let h = harness(
            dir,
            None,
            FakeRemote::reporting(4),
            FakeFetcher::serving(b"four".to_vec()),
            RecordingLauncher::failing(),
        );

        assert_eq!(h.orchestrator.check_for_update(build_number(3)).await, UpdateOutcome::Failed);
        assert!(h.dir.build_path(4).exists());
    }

    #[tokio::test]
    async fn test_scan_failure_is_treated_as_empty() {
        init_test_logging(None);
        let dir = InstallDirFixture::new("tool");
        let context = UpdateContext::new(dir.path().join("missing"), dir.naming().clone());
        let remote = Arc::new(FakeRemote::reporting(1));
        let orchestrator = UpdateOrchestrator::new(
            context,
            remote.clone(),
            Arc::new(FakeFetcher::failing("unused")),
            Arc::new(FixedLiveness::stopped()),
            Arc::new(RecordingLauncher::new()),
        );

        assert_eq!(orchestrator.check_for_update(build_number(1)).await, UpdateOutcome::NoUpdate);
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_prune_never_deletes_current_image() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(2);
        dir.add_build(3);
        dir.add_build(8);
        let h = harness(
            dir,
            Some(2),
            FakeRemote::unreachable(),
            FakeFetcher::failing("unused"),
            RecordingLauncher::new(),
        );

        let report = h.orchestrator.prune_obsolete_local_builds(build_number(8)).await;

        assert_eq!(report.removed, vec![h.dir.build_path(3)]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(h.dir.file_names(), vec!["tool_v2", "tool_v8"]);
    }

    #[tokio::test]
    async fn test_prune_missing_directory() {
        let dir = InstallDirFixture::new("tool");
        let context = UpdateContext::new(dir.path().join("missing"), dir.naming().clone());
        let orchestrator = UpdateOrchestrator::new(
            context,
            Arc::new(FakeRemote::unreachable()),
            Arc::new(FakeFetcher::failing("unused")),
            Arc::new(FixedLiveness::stopped()),
            Arc::new(RecordingLauncher::new()),
        );

        let report = orchestrator.prune_obsolete_local_builds(build_number(8)).await;
        assert!(report.removed.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_context_paths() {
        let dir = InstallDirFixture::new("scraper");
        let context = dir.context(None).with_download_url("https://dl/{build}/{file}");
        assert_eq!(context.download_url_for(build_number(12)), "https://dl/12/scraper_v12");
        assert_eq!(context.staging_path(build_number(12)), dir.path().join(".scraper_v12.part"));
        assert_eq!(context.target_path(build_number(12)), dir.path().join("scraper_v12"));
    }

    #[tokio::test]
    async fn test_running_image_newer_than_reported_build() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(5);
        dir.add_build(7);
        let h = harness(
            dir,
            Some(7),
            FakeRemote::reporting(7),
            FakeFetcher::serving(b"unused".to_vec()),
            RecordingLauncher::new(),
        );

        let outcome = h.orchestrator.check_for_update(build_number(5)).await;

        assert_eq!(outcome, UpdateOutcome::NoUpdate);
        assert!(h.launcher.plans().is_empty());
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_running_image_still_updates_past_itself() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(5);
        dir.add_build(7);
        let h = harness(
            dir,
            Some(7),
            FakeRemote::reporting(8),
            FakeFetcher::serving(b"eight".to_vec()),
            RecordingLauncher::new(),
        );

        let outcome = h.orchestrator.check_for_update(build_number(5)).await;

        assert!(matches!(outcome, UpdateOutcome::SwitchInProgress { build, .. } if build.get() == 8));
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_directory_at_target_is_not_a_staged_build() {
        let dir = InstallDirFixture::new("tool");
        dir.add_build(5);
        std::fs::create_dir(dir.build_path(6)).unwrap();
        let h = harness(
            dir,
            Some(5),
            FakeRemote::reporting(6),
            FakeFetcher::serving(b"unused".to_vec()),
            RecordingLauncher::new(),
        );

        let outcome = h.orchestrator.check_for_update(build_number(5)).await;

        assert_eq!(outcome, UpdateOutcome::Failed);
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h.launcher.plans().is_empty());
        assert!(h.dir.build_path(6).is_dir());
    }

    /// Writes the artifact, then lets a directory take over the target path
    /// before the orchestrator can move the artifact there.
    struct ContestedFetcher {
        target: PathBuf,
    }

    impl ArtifactFetcher for ContestedFetcher {
        fn fetch<'a>(
            &'a self,
            _url: &'a str,
            staging: &'a Path,
        ) -> BoxFuture<'a, Result<DownloadedFile, UpdateError>> {
            Box::pin(async move {
                std::fs::write(staging, b"six").unwrap();
                std::fs::create_dir(&self.target).unwrap();
                std::fs::write(self.target.join("occupied"), b"x").unwrap();
                Ok(DownloadedFile {
                    path: staging.to_path_buf(),
                    len: 3,
                    declared_len: Some(3),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_failed_stage_moves_artifact_in_swap_plan() {
        init_test_logging(None);
        let dir = InstallDirFixture::new("tool");
        dir.add_build(5);
        let target = dir.build_path(6);
        let launcher = Arc::new(RecordingLauncher::new());
        let orchestrator = UpdateOrchestrator::new(
            dir.context(Some(5)),
            Arc::new(FakeRemote::reporting(6)),
            Arc::new(ContestedFetcher {
                target: target.clone(),
            }),
            Arc::new(FixedLiveness::running(4242)),
            launcher.clone(),
        );

        let outcome = orchestrator.check_for_update(build_number(5)).await;

        assert!(matches!(outcome, UpdateOutcome::SwitchInProgress { build, .. } if build.get() == 6));
        let staging = dir.path().join(".tool_v6.part");
        assert_eq!(std::fs::read(&staging).unwrap(), b"six");

        let plan = &launcher.plans()[0];
        assert!(plan.steps().contains(&SwapStep::MoveFile {
            from: staging,
            to: target,
        }));
    }
}
