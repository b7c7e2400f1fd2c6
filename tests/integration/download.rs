use binswap::core::UpdateError;
use binswap::test_utils::{StubResponse, StubServer};
use binswap::upgrade::DownloadManager;
use std::time::Duration;
use tempfile::TempDir;

fn manager() -> DownloadManager {
    DownloadManager::new(reqwest::Client::new(), Duration::from_secs(10)).with_progress(false)
}

#[tokio::test]
async fn test_download_complete_artifact() -> anyhow::Result<()> {
    let body = vec![7u8; 4096];
    let server = StubServer::start(vec![("/tool_v6", StubResponse::ok(body.clone()))]).await;
    let temp = TempDir::new()?;
    let staging = temp.path().join(".tool_v6.part");

    let file = manager().download(&server.url("/tool_v6"), &staging).await?;

    assert_eq!(file.len, 4096);
    assert_eq!(file.declared_len, Some(4096));
    assert_eq!(std::fs::read(&staging)?, body);
    Ok(())
}

/// The connection closes at 60% of the declared length.
#[tokio::test]
async fn test_truncated_download_leaves_nothing() -> anyhow::Result<()> {
    let server =
        StubServer::start(vec![("/tool_v6", StubResponse::truncated(vec![1u8; 600], 1000))]).await;
    let temp = TempDir::new()?;
    let staging = temp.path().join(".tool_v6.part");

    let result = manager().download(&server.url("/tool_v6"), &staging).await;

    let err = result.expect_err("truncated body must fail");
    assert!(err.is_transport(), "unexpected error: {err}");
    assert!(!staging.exists());
    assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_is_network_error() -> anyhow::Result<()> {
    let server = StubServer::start(vec![]).await;
    let temp = TempDir::new()?;
    let staging = temp.path().join(".tool_v6.part");

    let result = manager().download(&server.url("/tool_v6"), &staging).await;

    assert!(matches!(result, Err(UpdateError::Network { .. })));
    assert!(!staging.exists());
    Ok(())
}
