use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use binswap::config::RemoteConfig;
use binswap::test_utils::{StubResponse, StubServer, init_test_logging};
use binswap::upgrade::RemoteVersionProber;

fn remote_config(server: &StubServer) -> RemoteConfig {
    RemoteConfig {
        owner: "acme".to_string(),
        repo: "tool".to_string(),
        api_base: server.base_url(),
        raw_base: server.base_url(),
        ..Default::default()
    }
}

fn contents_body(marker: &str) -> String {
    format!(r#"{{"name": "VERSION", "content": "{}\n", "encoding": "base64"}}"#, STANDARD.encode(marker))
}

/// Only the commit history answers; the other two sources fail.
#[tokio::test]
async fn test_commit_history_alone_is_enough() {
    init_test_logging(None);
    let server = StubServer::start(vec![
        (
            "/repos/acme/tool/commits",
            StubResponse::ok(
                r#"[{"commit": {"message": "Build 12: faster sync"}}, {"commit": {"message": "Build 11"}}]"#,
            ),
        ),
        ("/repos/acme/tool/contents/VERSION", StubResponse::status(404)),
        ("/acme/tool/main/VERSION", StubResponse::status(500)),
    ])
    .await;

    let prober = RemoteVersionProber::from_config(&remote_config(&server), reqwest::Client::new());
    let report = prober.probe_all().await;

    assert_eq!(report.latest().map(|b| b.get()), Some(12));
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].source, "metadata");
    assert_eq!(report.failures[1].source, "raw");
}

/// When sources disagree the highest build wins, whichever source reported it.
#[tokio::test]
async fn test_highest_build_across_sources() {
    init_test_logging(None);
    let server = StubServer::start(vec![
        ("/repos/acme/tool/commits", StubResponse::ok(r#"[{"commit": {"message": "docs"}}]"#)),
        ("/repos/acme/tool/contents/VERSION", StubResponse::ok(contents_body("v15"))),
        ("/acme/tool/main/VERSION", StubResponse::ok("9\n")),
    ])
    .await;

    let prober = RemoteVersionProber::from_config(&remote_config(&server), reqwest::Client::new());
    let report = prober.probe_all().await;

    assert_eq!(report.latest().map(|b| b.get()), Some(15));
    let sources: Vec<&str> = report.records.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["metadata", "raw"]);
}

#[tokio::test]
async fn test_raw_request_defeats_caches() {
    let server = StubServer::start(vec![("/acme/tool/main/VERSION", StubResponse::ok("4"))]).await;

    let prober = RemoteVersionProber::from_config(&remote_config(&server), reqwest::Client::new());
    prober.probe_all().await;

    let hits = server.hits();
    assert!(hits.iter().any(|h| h.starts_with("/acme/tool/main/VERSION?nocache=")), "{hits:?}");
    assert!(hits.iter().any(|h| h == "/repos/acme/tool/commits?sha=main&per_page=10"), "{hits:?}");
    assert!(hits.iter().any(|h| h == "/repos/acme/tool/contents/VERSION?ref=main"), "{hits:?}");
}

#[tokio::test]
async fn test_all_sources_failing_yields_unknown() {
    let server = StubServer::start(vec![]).await;

    let prober = RemoteVersionProber::from_config(&remote_config(&server), reqwest::Client::new());
    let report = prober.probe_all().await;

    assert!(report.latest().is_none());
    assert_eq!(report.failures.len(), 3);
}
