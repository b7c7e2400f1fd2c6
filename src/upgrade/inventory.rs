//! Local binary inventory.
//!
//! Every installed build lives next to the others as `{product}_v{N}[.{ext}]`.
//! [`LocalInventory::scan`] lists them (non-recursively), tags each with its build
//! number and flags the one backing the running process. The same listing drives
//! pruning of obsolete builds.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::constants::PARTIAL_SUFFIX;
use crate::core::UpdateError;
use crate::upgrade::build_number::{BuildNumber, resolve_build_number};

/// Naming convention for versioned binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryNaming {
    product: String,
    extension: String,
}

impl BinaryNaming {
    /// Create a naming rule. The extension may be given with or without its dot,
    /// or empty for extension-less executables.
    pub fn new(product: impl Into<String>, extension: impl AsRef<str>) -> Self {
        Self {
            product: product.into(),
            extension: extension.as_ref().trim_start_matches('.').to_string(),
        }
    }

    /// Naming rule for the current platform's executable extension.
    pub fn for_platform(product: impl Into<String>) -> Self {
        Self::new(product, std::env::consts::EXE_EXTENSION)
    }

    /// The product name used as file prefix.
    pub fn product(&self) -> &str {
        &self.product
    }

    /// The file extension without its dot (may be empty).
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Canonical file name for a build, e.g. `scraper_v12.exe`.
    pub fn file_name(&self, build: BuildNumber) -> String {
        if self.extension.is_empty() {
            format!("{}_v{}", self.product, build)
        } else {
            format!("{}_v{}.{}", self.product, build, self.extension)
        }
    }

    /// Hidden in-flight download name for a build, e.g. `.scraper_v12.exe.part`.
    pub fn partial_file_name(&self, build: BuildNumber) -> String {
        format!(".{}{}", self.file_name(build), PARTIAL_SUFFIX)
    }

    /// Build number of a file name that follows the convention, if any.
    pub fn parse(&self, file_name: &str) -> Option<BuildNumber> {
        let rest = file_name.strip_prefix(&self.product)?.strip_prefix('_')?;
        let digits = if self.extension.is_empty() {
            rest.strip_prefix('v')?
        } else {
            let (stem, ext) = rest.rsplit_once('.')?;
            if !ext.eq_ignore_ascii_case(&self.extension) {
                return None;
            }
            stem.strip_prefix('v')?
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        resolve_build_number(rest)
    }
}

/// One versioned binary found in the install directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalBinaryRecord {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Build number parsed from the file name
    pub build: BuildNumber,
    /// Whether this file backs the running process
    pub is_current_image: bool,
}

/// Result of a prune pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PruneReport {
    /// Files that were deleted
    pub removed: Vec<PathBuf>,
    /// Files that were left in place, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Snapshot of the versioned binaries in one directory, highest build first.
#[derive(Debug, Clone, Default)]
pub struct LocalInventory {
    records: Vec<LocalBinaryRecord>,
}

impl LocalInventory {
    /// Scan `dir` for binaries following `naming`.
    ///
    /// `current_image` is the path of the running executable; the record whose
    /// canonical path equals its canonical path is flagged. Entries that cannot
    /// be inspected are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::FileSystem`] if the directory itself cannot be read.
    pub async fn scan(
        dir: &Path,
        naming: &BinaryNaming,
        current_image: Option<&Path>,
    ) -> Result<Self, UpdateError> {
        let current = match current_image {
            Some(path) => fs::canonicalize(path).await.ok(),
            None => None,
        };

        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| UpdateError::fs("scan install directory", dir, e))?;

        let mut records = Vec::new();
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| UpdateError::fs("scan install directory", dir, e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(build) = naming.parse(name) else {
                continue;
            };

            let path = entry.path();
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }

            let canonical = fs::canonicalize(&path).await.unwrap_or_else(|_| path.clone());
            let is_current_image = current.as_deref() == Some(canonical.as_path());
            records.push(LocalBinaryRecord {
                path: canonical,
                build,
                is_current_image,
            });
        }

        records.sort_by(|a, b| b.build.cmp(&a.build).then_with(|| a.path.cmp(&b.path)));

        // Canonical paths are unique, but keep the flag exclusive regardless.
        let mut seen_current = false;
        for record in &mut records {
            if record.is_current_image {
                record.is_current_image = !seen_current;
                seen_current = true;
            }
        }

        debug!("Found {} versioned binaries in {}", records.len(), dir.display());
        Ok(Self {
            records,
        })
    }

    /// All records, highest build first.
    pub fn records(&self) -> &[LocalBinaryRecord] {
        &self.records
    }

    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record with the highest build number.
    pub fn highest(&self) -> Option<&LocalBinaryRecord> {
        self.records.first()
    }

    /// The record backing the running process, if it lives in the scanned directory.
    pub fn current_image(&self) -> Option<&LocalBinaryRecord> {
        self.records.iter().find(|r| r.is_current_image)
    }

    /// The record for a specific build.
    pub fn find(&self, build: BuildNumber) -> Option<&LocalBinaryRecord> {
        self.records.iter().find(|r| r.build == build)
    }

    /// Delete every binary strictly older than `current`, except the running image.
    ///
    /// Deletion failures (typically a file still locked by another instance) are
    /// recorded in the report and do not stop the pass.
    pub async fn prune_older_than(&self, current: BuildNumber) -> PruneReport {
        let mut report = PruneReport::default();

        for record in self.records.iter().filter(|r| r.build < current) {
            if record.is_current_image {
                debug!("Keeping {} (running image)", record.path.display());
                report.skipped.push((record.path.clone(), "running image".to_string()));
                continue;
            }

            match fs::remove_file(&record.path).await {
                Ok(()) => {
                    info!("Removed obsolete build {} at {}", record.build, record.path.display());
                    report.removed.push(record.path.clone());
                }
                Err(e) => {
                    warn!("Could not remove {}: {}", record.path.display(), e);
                    report.skipped.push((record.path.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
