//! Updater configuration file (`~/.binswap/config.toml`).
//!
//! Every field has a default, so a missing file or a partial one is always
//! usable. The file location can be overridden with `--config` or the
//! `BINSWAP_CONFIG` environment variable.
//!
//! ```toml
//! [product]
//! name = "scraper"
//! install_dir = "~/tools/scraper"
//!
//! [remote]
//! owner = "acme"
//! repo = "scraper"
//! download_url = "https://github.com/{owner}/{repo}/releases/download/v{build}/{file}"
//!
//! [swap]
//! relaunch_args = ["--resume"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_COMMIT_COUNT, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_SWAP_INITIAL_DELAY_MS, DEFAULT_SWAP_MAX_WAIT_SECS, DEFAULT_SWAP_POLL_INITIAL_MS,
    DEFAULT_SWAP_POLL_MAX_MS,
};
use crate::upgrade::{BinaryNaming, SwapTimings, UpdateContext};

fn default_product_name() -> String {
    "binswap".to_string()
}

fn default_owner() -> String {
    "binswap".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_version_file() -> String {
    "VERSION".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}

const fn default_commit_count() -> u32 {
    DEFAULT_COMMIT_COUNT
}

const fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_download_url() -> String {
    "https://github.com/{owner}/{repo}/releases/download/v{build}/{file}".to_string()
}

const fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
}

fn default_user_agent() -> String {
    format!("binswap-updater/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_initial_delay_ms() -> u64 {
    DEFAULT_SWAP_INITIAL_DELAY_MS
}

const fn default_poll_initial_ms() -> u64 {
    DEFAULT_SWAP_POLL_INITIAL_MS
}

const fn default_poll_max_ms() -> u64 {
    DEFAULT_SWAP_POLL_MAX_MS
}

const fn default_max_wait_secs() -> u64 {
    DEFAULT_SWAP_MAX_WAIT_SECS
}

/// The `[product]` section: what the binaries are called and where they live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductConfig {
    /// File name prefix, `{name}_v{N}`
    #[serde(default = "default_product_name")]
    pub name: String,

    /// File extension; the platform's executable extension when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Install directory, tilde and `$VAR` expanded. Defaults to the directory of
    /// the running executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            name: default_product_name(),
            extension: None,
            install_dir: None,
        }
    }
}

impl ProductConfig {
    pub fn naming(&self) -> BinaryNaming {
        match &self.extension {
            Some(ext) => BinaryNaming::new(self.name.clone(), ext),
            None => BinaryNaming::for_platform(self.name.clone()),
        }
    }

    /// Resolve the install directory.
    ///
    /// # Errors
    ///
    /// Fails if `install_dir` references an undefined variable, or if it is unset
    /// and the running executable's location cannot be determined.
    pub fn resolve_install_dir(&self) -> Result<PathBuf> {
        match &self.install_dir {
            Some(raw) => {
                let expanded = shellexpand::full(raw)
                    .with_context(|| format!("Failed to expand install_dir '{raw}'"))?;
                Ok(PathBuf::from(expanded.as_ref()))
            }
            None => {
                let exe = std::env::current_exe()
                    .context("Failed to locate the running executable")?;
                exe.parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| anyhow::anyhow!("Executable {} has no parent", exe.display()))
            }
        }
    }
}

/// The `[remote]` section: where published builds are discovered and fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_product_name")]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Path of the version marker file in the repository
    #[serde(default = "default_version_file")]
    pub version_file: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_raw_base")]
    pub raw_base: String,
    /// Number of recent commits scanned for build numbers
    #[serde(default = "default_commit_count")]
    pub commit_count: u32,
    #[serde(default = "default_probe_timeout_secs")]
    pub commit_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub raw_timeout_secs: u64,
    /// Artifact URL with `{owner}`, `{repo}`, `{build}` and `{file}` placeholders
    #[serde(default = "default_download_url")]
    pub download_url: String,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            repo: default_product_name(),
            branch: default_branch(),
            version_file: default_version_file(),
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            commit_count: default_commit_count(),
            commit_timeout_secs: default_probe_timeout_secs(),
            metadata_timeout_secs: default_probe_timeout_secs(),
            raw_timeout_secs: default_probe_timeout_secs(),
            download_url: default_download_url(),
            download_timeout_secs: default_download_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl RemoteConfig {
    /// The download URL with `{owner}` and `{repo}` filled in.
    pub fn download_template(&self) -> String {
        self.download_url.replace("{owner}", &self.owner).replace("{repo}", &self.repo)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// The `[swap]` section: timings of the post-exit swap plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Arguments passed to the relaunched binary
    #[serde(default)]
    pub relaunch_args: Vec<String>,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
            max_wait_secs: default_max_wait_secs(),
            relaunch_args: Vec::new(),
        }
    }
}

impl SwapConfig {
    pub fn timings(&self) -> SwapTimings {
        SwapTimings {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            poll_initial: Duration::from_millis(self.poll_initial_ms),
            poll_max: Duration::from_millis(self.poll_max_ms.max(self.poll_initial_ms)),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

/// Complete updater configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default)]
    pub product: ProductConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub swap: SwapConfig,
}

impl UpdaterConfig {
    /// Load from the default location, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, else from [`default_path`](Self::default_path).
    /// A missing file yields the defaults.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Write the configuration as TOML, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// `BINSWAP_CONFIG` if set, else `~/.binswap/config.toml`
    /// (`%LOCALAPPDATA%\binswap\config.toml` on Windows).
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("binswap")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".binswap")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// HTTP client shared by the prober and the downloader.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.remote.user_agent)
            .build()
            .context("Failed to build HTTP client")
    }

    /// Build the orchestrator context for this installation.
    pub fn context(&self) -> Result<UpdateContext> {
        let install_dir = self.product.resolve_install_dir()?;
        let mut context = UpdateContext::new(install_dir, self.product.naming())
            .with_download_url(self.remote.download_template())
            .with_relaunch_args(self.swap.relaunch_args.clone())
            .with_timings(self.swap.timings());

        // Only a binary following the naming convention is the product's own image;
        // the standalone CLI must never schedule itself for removal.
        match std::env::current_exe() {
            Ok(exe) if Self::is_product_image(&exe, &context.naming) => {
                context = context.with_current_image(exe);
            }
            Ok(exe) => {
                tracing::debug!("{} is not a versioned build, no image to replace", exe.display());
            }
            Err(e) => tracing::warn!("Cannot locate the running executable: {}", e),
        }
        Ok(context)
    }

    fn is_product_image(exe: &Path, naming: &BinaryNaming) -> bool {
        exe.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| naming.parse(name))
            .is_some()
    }
}
