use binswap::config::RemoteConfig;
use binswap::test_utils::fixtures::build_number;
use binswap::test_utils::{
    FixedLiveness, InstallDirFixture, RecordingLauncher, StubResponse, StubServer,
    init_test_logging,
};
use binswap::upgrade::{
    DownloadManager, RemoteVersionProber, SwapStep, UpdateOrchestrator, UpdateOutcome,
};
use std::sync::Arc;
use std::time::Duration;

struct Setup {
    dir: InstallDirFixture,
    server: StubServer,
    launcher: Arc<RecordingLauncher>,
    orchestrator: UpdateOrchestrator,
}

async fn setup(artifact: StubResponse, marker: &str) -> Setup {
    init_test_logging(None);
    let dir = InstallDirFixture::new("tool");
    dir.add_build(5);

    let server = StubServer::start(vec![
        ("/acme/tool/main/VERSION", StubResponse::ok(marker.to_string())),
        ("/releases/tool_v7", artifact),
    ])
    .await;

    let remote = RemoteConfig {
        owner: "acme".to_string(),
        repo: "tool".to_string(),
        api_base: server.base_url(),
        raw_base: server.base_url(),
        ..Default::default()
    };
    let client = reqwest::Client::new();
    let context = dir
        .context(Some(5))
        .with_download_url(format!("{}/releases/{{file}}", server.base_url()))
        .with_relaunch_args(vec!["--resume".to_string()]);
    let launcher = Arc::new(RecordingLauncher::new());

    let orchestrator = UpdateOrchestrator::new(
        context,
        Arc::new(RemoteVersionProber::from_config(&remote, client.clone())),
        Arc::new(DownloadManager::new(client, Duration::from_secs(10)).with_progress(false)),
        Arc::new(FixedLiveness::running(31337)),
        launcher.clone(),
    );

    Setup {
        dir,
        server,
        launcher,
        orchestrator,
    }
}

#[tokio::test]
async fn test_remote_update_end_to_end() {
    let s = setup(StubResponse::ok(b"#!/bin/sh\necho seven\n".to_vec()), "v7\n").await;

    let outcome = s.orchestrator.check_for_update(build_number(5)).await;

    let target = s.dir.build_path(7);
    assert_eq!(
        outcome,
        UpdateOutcome::SwitchInProgress {
            build: build_number(7),
            target: target.clone(),
        }
    );
    assert_eq!(std::fs::read(&target).unwrap(), b"#!/bin/sh\necho seven\n");
    assert_eq!(s.dir.file_names(), vec!["tool_v5", "tool_v7"]);

    let plans = s.launcher.plans();
    let steps = plans[0].steps();
    assert!(matches!(steps[0], SwapStep::Sleep { .. }));
    assert!(matches!(steps[1], SwapStep::WaitForExit { pid: 31337, .. }));
    assert_eq!(
        steps[2],
        SwapStep::RemoveFile {
            path: s.dir.build_path(5)
        }
    );
    assert_eq!(
        steps[3],
        SwapStep::Launch {
            program: target,
            args: vec!["--resume".to_string()],
        }
    );
}

/// A caller that ignores SwitchInProgress must not trigger another download.
#[tokio::test]
async fn test_repeated_check_is_idempotent() {
    let s = setup(StubResponse::ok(b"seven".to_vec()), "7").await;

    let first = s.orchestrator.check_for_update(build_number(5)).await;
    let hits_after_first = s.server.hits().len();
    let second = s.orchestrator.check_for_update(build_number(5)).await;

    assert_eq!(first, second);
    assert_eq!(s.server.hits().len(), hits_after_first);
    assert_eq!(s.launcher.plans().len(), 2);
}

#[tokio::test]
async fn test_truncated_remote_artifact_fails_without_leftovers() {
    let s = setup(StubResponse::truncated(vec![0u8; 60], 100), "v7").await;

    let outcome = s.orchestrator.check_for_update(build_number(5)).await;

    assert_eq!(outcome, UpdateOutcome::Failed);
    assert_eq!(s.dir.file_names(), vec!["tool_v5"]);
    assert!(s.launcher.plans().is_empty());
}

#[tokio::test]
async fn test_remote_older_than_current() {
    let s = setup(StubResponse::ok(b"unused".to_vec()), "v4").await;

    assert_eq!(s.orchestrator.check_for_update(build_number(5)).await, UpdateOutcome::NoUpdate);
    assert!(!s.server.hits().iter().any(|h| h.starts_with("/releases/")));
}
