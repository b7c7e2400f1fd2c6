use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::core::UpdateError;

/// A downloaded file that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// Where the verified file currently lives
    pub path: PathBuf,
    /// Size on disk in bytes
    pub len: u64,
    /// `sha256:<hex>` digest, recorded for diagnostics
    pub sha256: String,
}

/// Integrity checks for a freshly downloaded binary.
///
/// Verification is about completeness, not authenticity: the file must be
/// non-empty and, when the server declared a length, exactly that long. The
/// SHA-256 digest is computed so it can be logged and compared by hand; nothing
/// is published to compare it against.
pub struct ArtifactVerifier;

impl ArtifactVerifier {
    /// Compute the SHA256 checksum of a file, formatted as `sha256:<hex>`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use binswap::upgrade::verification::ArtifactVerifier;
    /// use std::path::Path;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let checksum = ArtifactVerifier::compute_sha256(Path::new("/opt/tool/tool_v12")).await?;
    /// println!("{checksum}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn compute_sha256(file_path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let contents = fs::read(file_path)
            .await
            .map_err(|e| UpdateError::fs("read staged artifact", file_path, e))?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let result = hasher.finalize();

        Ok(format!("sha256:{result:x}"))
    }

    /// Check that a staged file is complete.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Verification`] if the file is empty or its size differs
    ///   from `declared_len`
    /// - [`UpdateError::FileSystem`] if the file cannot be read
    pub async fn verify(
        file_path: &Path,
        declared_len: Option<u64>,
    ) -> Result<StagedArtifact, UpdateError> {
        let metadata = fs::metadata(file_path)
            .await
            .map_err(|e| UpdateError::fs("inspect staged artifact", file_path, e))?;
        let len = metadata.len();

        if len == 0 {
            return Err(UpdateError::Verification {
                reason: format!("{} is empty", file_path.display()),
            });
        }

        match declared_len {
            Some(expected) if expected != len => {
                return Err(UpdateError::Verification {
                    reason: format!("expected {expected} bytes, received {len}"),
                });
            }
            _ => {}
        }

        let sha256 = Self::compute_sha256(file_path).await?;
        info!("Verified {} ({} bytes, {})", file_path.display(), len, sha256);

        Ok(StagedArtifact {
            path: file_path.to_path_buf(),
            len,
            sha256,
        })
    }
}
