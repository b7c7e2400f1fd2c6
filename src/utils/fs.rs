//! File system helpers for staging and swapping binaries.
//!
//! All helpers are async (`tokio::fs`) and return [`UpdateError`] with the
//! operation and path attached.

use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::core::UpdateError;

/// Move a file, preferring an atomic rename.
///
/// Falls back to copy-then-delete when the rename fails (for example across
/// file systems). On fallback the copy keeps the source's permissions.
///
/// # Errors
///
/// Returns [`UpdateError::FileSystem`] if both the rename and the copy fail.
/// If only the final removal of `from` fails, the move is considered done.
pub async fn move_file(from: &Path, to: &Path) -> Result<(), UpdateError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                "Rename {} -> {} failed ({}), copying instead",
                from.display(),
                to.display(),
                rename_err
            );
            fs::copy(from, to).await.map_err(|e| UpdateError::fs("copy file", to, e))?;
            remove_quietly(from).await;
            Ok(())
        }
    }
}

/// Remove a file, ignoring every error. Returns whether the file is gone.
pub async fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            debug!("Could not remove {}: {}", path.display(), e);
            false
        }
    }
}

/// Mark a file as executable for everyone who can read it (Unix only).
///
/// # Errors
///
/// Returns [`UpdateError::FileSystem`] if the permissions cannot be read or set.
pub async fn make_executable(path: &Path) -> Result<(), UpdateError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(path)
            .await
            .map_err(|e| UpdateError::fs("read permissions", path, e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)
            .await
            .map_err(|e| UpdateError::fs("set executable permissions", path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
