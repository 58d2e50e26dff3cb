//! Copies files produced in the sandbox back to a local directory.
//!
//! The remote working directory is treated as a read-only snapshot:
//! nothing is deleted on the sandbox side.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ExecutorError, Result};
use crate::sandbox::{RemoteFileEntry, SandboxSession};

/// Copies every visible top-level file of the sandbox working directory
/// into `local_dir`, overwriting same-named files.
///
/// Returns the written paths in the order the provider listed them.
/// `local_dir` must already exist; it is never created here.
pub async fn sync_files(session: &SandboxSession, local_dir: &Path) -> Result<Vec<PathBuf>> {
    ensure_local_dir(local_dir).await?;

    let working_dir = session.handle()?.working_dir.clone();
    let entries = session.list_directory(&working_dir).await?;

    let mut written = Vec::new();
    for entry in entries {
        if !should_sync(&entry) {
            debug!("Skipping sandbox entry {}", entry.name);
            continue;
        }

        let remote_path = session.handle()?.path_for(&entry.name);
        let content = session.read_file(&remote_path).await?;

        let local_path = local_dir.join(&entry.name);
        tokio::fs::write(&local_path, &content).await?;
        debug!(
            "Synced {remote_path} → {} ({} bytes)",
            local_path.display(),
            content.len()
        );
        written.push(local_path);
    }

    if !written.is_empty() {
        info!(
            "Synced {} file(s) from sandbox to {}",
            written.len(),
            local_dir.display()
        );
    }
    Ok(written)
}

/// Fails with `InvalidArgument` unless `dir` is an existing directory.
pub async fn ensure_local_dir(dir: &Path) -> Result<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ExecutorError::InvalidArgument(format!(
            "{} is not a directory",
            dir.display()
        ))),
        Err(_) => Err(ExecutorError::InvalidArgument(format!(
            "local directory {} does not exist",
            dir.display()
        ))),
    }
}

/// Hidden entries and directories stay in the sandbox. So do names a
/// misbehaving provider might report with a path separator in them.
fn should_sync(entry: &RemoteFileEntry) -> bool {
    if entry.name.starts_with('.') || entry.is_directory {
        return false;
    }
    if entry.name.is_empty() || entry.name.contains(['/', '\\']) {
        warn!("Ignoring sandbox entry with unsafe name: {:?}", entry.name);
        return false;
    }
    true
}
