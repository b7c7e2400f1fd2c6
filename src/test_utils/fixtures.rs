//! Filesystem and network fixtures.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::upgrade::{BinaryNaming, BuildNumber, SwapTimings, UpdateContext};

/// A temporary install directory holding versioned binaries.
pub struct InstallDirFixture {
    _temp: TempDir,
    root: PathBuf,
    naming: BinaryNaming,
}

impl InstallDirFixture {
    /// Empty install directory for extension-less `product` binaries.
    ///
    /// The root is canonicalized so paths compare equal to inventory records.
    pub fn new(product: &str) -> Self {
        let temp = TempDir::new().unwrap_or_else(|e| panic!("Failed to create temp dir: {e}"));
        let root = std::fs::canonicalize(temp.path()).unwrap_or_else(|_| temp.path().to_path_buf());
        Self {
            _temp: temp,
            root,
            naming: BinaryNaming::new(product, ""),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> &BinaryNaming {
        &self.naming
    }

    /// Path a build would have, whether or not it exists.
    pub fn build_path(&self, build: u64) -> PathBuf {
        self.root.as_path().join(self.naming.file_name(build_number(build)))
    }

    /// Create the binary for `build` and return its path.
    pub fn add_build(&self, build: u64) -> PathBuf {
        let path = self.build_path(build);
        std::fs::write(&path, format!("#!/bin/sh\necho build {build}\n"))
            .unwrap_or_else(|e| panic!("Failed to write {}: {e}", path.display()));
        path
    }

    /// File names currently in the directory, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.root.as_path())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Context with near-zero swap delays. `current_image` is the binary of
    /// `current_build` when given.
    pub fn context(&self, current_build: Option<u64>) -> UpdateContext {
        let timings = SwapTimings {
            initial_delay: Duration::from_millis(10),
            poll_initial: Duration::from_millis(10),
            poll_max: Duration::from_millis(20),
            max_wait: Duration::from_millis(100),
        };
        let context = UpdateContext::new(self.root.as_path(), self.naming.clone())
            .with_download_url("http://127.0.0.1:9/releases/v{build}/{file}")
            .with_timings(timings);
        match current_build {
            Some(build) => context.with_current_image(self.build_path(build)),
            None => context,
        }
    }
}

/// Panicking constructor for test build numbers.
pub fn build_number(n: u64) -> BuildNumber {
    BuildNumber::new(n).unwrap_or_else(|| panic!("build number must be non-zero, got {n}"))
}

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    body: Vec<u8>,
    declared_len: Option<usize>,
}

impl StubResponse {
    /// `200 OK` with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            declared_len: None,
        }
    }

    /// Empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            declared_len: None,
        }
    }

    /// `200 OK` announcing `declared_len` bytes but sending only `body`, then
    /// closing the connection.
    pub fn truncated(body: impl Into<Vec<u8>>, declared_len: usize) -> Self {
        Self {
            status: 200,
            body: body.into(),
            declared_len: Some(declared_len),
        }
    }
}

/// Minimal HTTP/1.1 server on `127.0.0.1` serving canned responses by path.
///
/// Unknown paths get `404`. Query strings are ignored for routing but kept in
/// the hit log.
pub struct StubServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(routes: Vec<(&str, StubResponse)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("Failed to bind stub server: {e}"));
        let addr = listener.local_addr().unwrap_or_else(|e| panic!("No local addr: {e}"));
        let routes: Arc<HashMap<String, StubResponse>> =
            Arc::new(routes.into_iter().map(|(path, resp)| (path.to_string(), resp)).collect());
        let hits = Arc::new(Mutex::new(Vec::new()));

        let server_hits = Arc::clone(&hits);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&server_hits);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, &routes, &hits).await;
                });
            }
        });

        Self {
            addr,
            hits,
            handle,
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:40123`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL of `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Request targets received so far, including query strings.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().map(|hits| hits.clone()).unwrap_or_default()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    routes: &HashMap<String, StubResponse>,
    hits: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let path = target.split('?').next().unwrap_or("/").to_string();
    if let Ok(mut hits) = hits.lock() {
        hits.push(target);
    }

    let response = routes.get(&path).cloned().unwrap_or_else(|| StubResponse::status(404));
    let reason = match response.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let declared = response.declared_len.unwrap_or(response.body.len());
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status, reason, declared
    );

    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.flush().await?;
    stream.shutdown().await
}
