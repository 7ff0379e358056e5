//! Single-instance lock file handling.
//!
//! Running two consumers against the same queue directory would race
//! on capture files, so the daemon takes an exclusive lock marker on
//! startup. Finding an existing marker is a normal condition (another
//! instance is active), not an error: the caller logs and exits
//! successfully.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

/// Guard for the daemon lock file.
///
/// The file is removed when the guard is dropped.
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Try to acquire the lock marker at `path`.
    ///
    /// Returns `Ok(None)` if the marker already exists, meaning another
    /// instance holds the queue.
    ///
    /// # Security
    ///
    /// - Uses `create_new(true)` to atomically create the file (prevents TOCTOU races)
    /// - Verifies the created file is a regular file (prevents symlink attacks)
    /// - Creates parent directory with restrictive permissions (0o700)
    pub fn acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                let mut builder = fs::DirBuilder::new();
                builder.mode(0o700).recursive(true);
                builder.create(parent)?;
            }
            #[cfg(not(unix))]
            {
                fs::create_dir_all(parent)?;
            }
        }

        let pid = std::process::id();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing_pid =
                    fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
                tracing::info!(
                    path = %path.display(),
                    holder_pid = existing_pid.trim(),
                    "lock file held by another instance"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata()?;
        if !metadata.is_file() {
            let _ = fs::remove_file(path);
            return Err(anyhow::anyhow!(
                "lock file {} is not a regular file (possible symlink attack)",
                path.display()
            ));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        writeln!(file, "{}", pid)?;

        tracing::info!(pid = pid, path = %path.display(), "lock file acquired");
        Ok(Some(Self {
            path: path.to_owned(),
        }))
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove lock file"
            );
        } else {
            tracing::info!(path = %self.path.display(), "lock file removed");
        }
    }
}
