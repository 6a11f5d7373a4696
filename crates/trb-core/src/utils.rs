use std::{
    fs,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::Result;

// ============== Request Workspaces ==============

/// Name prefix of per-request temp directories.
pub const WORKSPACE_PREFIX: &str = "tg_rename_";

/// Scratch directory owned by one rename request.
///
/// Removed when dropped, which covers success, failure and task cancellation.
#[derive(Debug)]
pub struct RequestWorkspace {
    dir: TempDir,
}

impl RequestWorkspace {
    pub fn create(parent: &Path) -> Result<Self> {
        fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)?;
        debug!(path = %dir.path().display(), "created request workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for `name` inside the workspace. `name` must already be a bare
    /// file name (see `command::validate_file_name`).
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Remove workspaces left behind by an interrupted run. Returns how many were
/// removed; entries that cannot be removed are logged and skipped.
pub fn sweep_stale_workspaces(parent: &Path) -> Result<usize> {
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(WORKSPACE_PREFIX) {
            continue;
        }
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale workspace"),
        }
    }
    Ok(removed)
}
