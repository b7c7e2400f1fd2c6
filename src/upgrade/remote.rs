//! Remote version discovery.
//!
//! The latest published build is learned from three independent sources, tried
//! in a fixed order, each under its own timeout:
//!
//! 1. [`CommitHistorySource`] - recent commit messages (`Build 128: ...`)
//! 2. [`ContentsSource`] - the base64-encoded version marker from the contents API
//! 3. [`RawMarkerSource`] - the same marker file fetched raw, with caches defeated
//!
//! A failing source (transport error, bad status, malformed payload, no match)
//! is logged and skipped. [`RemoteVersionProber`] then reports the **maximum**
//! build seen across every source that produced data: when sources disagree the
//! latest known build wins, regardless of which source reported it.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, CACHE_CONTROL, PRAGMA};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RemoteConfig;
use crate::core::UpdateError;
use crate::upgrade::build_number::{BuildNumber, resolve_build_number};

/// Boxed future returned by the object-safe traits of this module.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One build number recovered from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteVersionRecord {
    /// The build number found
    pub build: BuildNumber,
    /// Name of the source that reported it
    pub source: String,
    /// The text the number was extracted from
    pub raw_evidence: String,
}

/// A single remote endpoint able to report build numbers.
pub trait VersionSource: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// How long this source may take before it is abandoned.
    fn timeout(&self) -> Duration;

    /// Query the source. An empty result is never returned as `Ok`.
    fn probe(&self) -> BoxFuture<'_, Result<Vec<RemoteVersionRecord>, UpdateError>>;
}

/// Anything that can tell the orchestrator the latest published build.
pub trait RemoteProbe: Send + Sync {
    /// The latest known build, or `None` if nothing could be learned.
    fn latest_build(&self) -> BoxFuture<'_, Option<BuildNumber>>;
}

/// A source that produced nothing, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    /// Name of the failing source
    pub source: String,
    /// Rendered error
    pub error: String,
}

/// Everything learned from one probing pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    /// Every build number recovered, in source order
    pub records: Vec<RemoteVersionRecord>,
    /// Sources that were skipped
    pub failures: Vec<SourceFailure>,
}

impl ProbeReport {
    /// The highest build across all sources.
    pub fn latest(&self) -> Option<BuildNumber> {
        self.records.iter().map(|r| r.build).max()
    }
}

/// Probes every configured source in order and keeps the maximum.
pub struct RemoteVersionProber {
    sources: Vec<Box<dyn VersionSource>>,
}

impl RemoteVersionProber {
    /// Create a prober over explicit sources, probed in the given order.
    pub fn new(sources: Vec<Box<dyn VersionSource>>) -> Self {
        Self {
            sources,
        }
    }

    /// The standard three-source prober for a repository.
    pub fn from_config(config: &RemoteConfig, client: reqwest::Client) -> Self {
        let api = config.api_base.trim_end_matches('/');
        let raw = config.raw_base.trim_end_matches('/');
        let (owner, repo, branch) = (&config.owner, &config.repo, &config.branch);

        let commits_url = format!(
            "{api}/repos/{owner}/{repo}/commits?sha={branch}&per_page={}",
            config.commit_count
        );
        let contents_url =
            format!("{api}/repos/{owner}/{repo}/contents/{}?ref={branch}", config.version_file);
        let raw_url = format!("{raw}/{owner}/{repo}/{branch}/{}", config.version_file);

        Self::new(vec![
            Box::new(CommitHistorySource::new(
                client.clone(),
                commits_url,
                Duration::from_secs(config.commit_timeout_secs),
            )),
            Box::new(ContentsSource::new(
                client.clone(),
                contents_url,
                Duration::from_secs(config.metadata_timeout_secs),
            )),
            Box::new(RawMarkerSource::new(
                client,
                raw_url,
                Duration::from_secs(config.raw_timeout_secs),
            )),
        ])
    }

    /// Probe every source once. Never fails; failures land in the report.
    pub async fn probe_all(&self) -> ProbeReport {
        let mut report = ProbeReport::default();

        for source in &self.sources {
            let outcome = match tokio::time::timeout(source.timeout(), source.probe()).await {
                Ok(result) => result,
                Err(_) => Err(UpdateError::Network {
                    operation: format!("{} probe", source.name()),
                    reason: format!("timed out after {:?}", source.timeout()),
                }),
            };

            match outcome {
                Ok(records) if !records.is_empty() => {
                    debug!(
                        "Source {} reported builds {:?}",
                        source.name(),
                        records.iter().map(|r| r.build.get()).collect::<Vec<_>>()
                    );
                    report.records.extend(records);
                }
                Ok(_) => {
                    debug!("Source {} returned no build numbers", source.name());
                    report.failures.push(SourceFailure {
                        source: source.name().to_string(),
                        error: "no build numbers found".to_string(),
                    });
                }
                Err(e) => {
                    debug!("Skipping source {}: {}", source.name(), e);
                    report.failures.push(SourceFailure {
                        source: source.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        match report.latest() {
            Some(latest) => info!("Latest remote build: {}", latest),
            None => debug!("No remote source produced a build number"),
        }
        report
    }
}

impl RemoteProbe for RemoteVersionProber {
    fn latest_build(&self) -> BoxFuture<'_, Option<BuildNumber>> {
        Box::pin(async move { self.probe_all().await.latest() })
    }
}

async fn fetch_text(request: reqwest::RequestBuilder, operation: &str) -> Result<String, UpdateError> {
    let response = request.send().await.map_err(|e| UpdateError::network(operation, e))?;
    let response = response.error_for_status().map_err(|e| UpdateError::network(operation, e))?;
    response.text().await.map_err(|e| UpdateError::network(operation, e))
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().chars().take(120).collect()
}

#[derive(Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
}

/// Extract build numbers from a GitHub-style commit listing.
///
/// Each commit message contributes at most one build number.
///
/// # Errors
///
/// [`UpdateError::Parse`] if the JSON is malformed or no message carries a number.
pub fn parse_commit_listing(body: &str) -> Result<Vec<RemoteVersionRecord>, UpdateError> {
    let entries: Vec<CommitEntry> = serde_json::from_str(body).map_err(|e| UpdateError::Parse {
        origin: CommitHistorySource::NAME.to_string(),
        reason: e.to_string(),
    })?;

    let records: Vec<RemoteVersionRecord> = entries
        .iter()
        .filter_map(|entry| {
            resolve_build_number(&entry.commit.message).map(|build| RemoteVersionRecord {
                build,
                source: CommitHistorySource::NAME.to_string(),
                raw_evidence: first_line(&entry.commit.message),
            })
        })
        .collect();

    if records.is_empty() {
        return Err(UpdateError::Parse {
            origin: CommitHistorySource::NAME.to_string(),
            reason: format!("no build number in {} commit messages", entries.len()),
        });
    }
    Ok(records)
}

#[derive(Deserialize)]
struct ContentsPayload {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Decode a contents-API payload (`{"content": "<base64>", "encoding": "base64"}`).
///
/// # Errors
///
/// [`UpdateError::Parse`] on malformed JSON, an unsupported encoding, invalid
/// base64, or a marker without a build number.
pub fn parse_contents_payload(body: &str) -> Result<RemoteVersionRecord, UpdateError> {
    let parse_err = |reason: String| UpdateError::Parse {
        origin: ContentsSource::NAME.to_string(),
        reason,
    };

    let payload: ContentsPayload =
        serde_json::from_str(body).map_err(|e| parse_err(e.to_string()))?;

    let text = match payload.encoding.as_deref() {
        Some("base64") => {
            let compact: String =
                payload.content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let bytes = STANDARD.decode(compact).map_err(|e| parse_err(e.to_string()))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None | Some("") | Some("utf-8") => payload.content,
        Some(other) => return Err(parse_err(format!("unsupported encoding '{other}'"))),
    };

    let build = resolve_build_number(&text)
        .ok_or_else(|| parse_err(format!("no build number in '{}'", first_line(&text))))?;
    Ok(RemoteVersionRecord {
        build,
        source: ContentsSource::NAME.to_string(),
        raw_evidence: first_line(&text),
    })
}

/// Parse a plain-text version marker.
///
/// # Errors
///
/// [`UpdateError::Parse`] if the text holds no build number.
pub fn parse_marker(body: &str) -> Result<RemoteVersionRecord, UpdateError> {
    let build = resolve_build_number(body).ok_or_else(|| UpdateError::Parse {
        origin: RawMarkerSource::NAME.to_string(),
        reason: format!("no build number in '{}'", first_line(body)),
    })?;
    Ok(RemoteVersionRecord {
        build,
        source: RawMarkerSource::NAME.to_string(),
        raw_evidence: first_line(body),
    })
}

/// Heuristic source: build numbers mentioned in recent commit messages.
pub struct CommitHistorySource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl CommitHistorySource {
    /// Source name in reports.
    pub const NAME: &'static str = "commit-history";

    /// `url` must return a JSON array of `{"commit": {"message": ...}}` entries.
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

impl VersionSource for CommitHistorySource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn probe(&self) -> BoxFuture<'_, Result<Vec<RemoteVersionRecord>, UpdateError>> {
        Box::pin(async move {
            let request = self.client.get(&self.url).header(ACCEPT, "application/vnd.github+json");
            let body = fetch_text(request, "commit history probe").await?;
            parse_commit_listing(&body)
        })
    }
}

/// Structured source: the encoded version marker from a contents endpoint.
pub struct ContentsSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ContentsSource {
    /// Source name in reports.
    pub const NAME: &'static str = "metadata";

    /// `url` must return a contents-API JSON document.
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

impl VersionSource for ContentsSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn probe(&self) -> BoxFuture<'_, Result<Vec<RemoteVersionRecord>, UpdateError>> {
        Box::pin(async move {
            let request = self.client.get(&self.url).header(ACCEPT, "application/vnd.github+json");
            let body = fetch_text(request, "metadata probe").await?;
            parse_contents_payload(&body).map(|record| vec![record])
        })
    }
}

/// Fallback source: the raw marker file, fetched past any cache.
pub struct RawMarkerSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RawMarkerSource {
    /// Source name in reports.
    pub const NAME: &'static str = "raw";

    /// `url` must serve the marker as plain text. A `nocache` query parameter is
    /// appended on every request.
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

impl VersionSource for RawMarkerSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn probe(&self) -> BoxFuture<'_, Result<Vec<RemoteVersionRecord>, UpdateError>> {
        Box::pin(async move {
            let nocache = chrono::Utc::now().timestamp_millis().to_string();
            let request = self
                .client
                .get(&self.url)
                .query(&[("nocache", nocache.as_str())])
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
            let body = fetch_text(request, "raw marker probe").await?;
            parse_marker(&body).map(|record| vec![record])
        })
    }
}
