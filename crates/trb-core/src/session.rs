//! User-session credential sources and on-disk session hygiene.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::Result;

pub const SESSION_EXTENSION: &str = "session";

/// Where the user-mode session credential comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionSource {
    /// Base64-encoded session blob (`SESSION_STRING`).
    String(String),
    /// A session file; `import_from` is copied over `path` before use.
    File {
        path: PathBuf,
        import_from: Option<PathBuf>,
    },
}

impl fmt::Debug for SessionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionSource::String(_) => f.write_str("SessionSource::String(<redacted>)"),
            SessionSource::File { path, import_from } => f
                .debug_struct("SessionSource::File")
                .field("path", path)
                .field("import_from", import_from)
                .finish(),
        }
    }
}

impl SessionSource {
    /// Priority: session string, then an existing `SESSION_FILE_PATH`, then an
    /// existing `<session_name>.session` in `work_dir`.
    pub fn resolve(
        session_string: Option<String>,
        session_file_path: Option<&Path>,
        work_dir: &Path,
        session_name: &str,
    ) -> Option<Self> {
        if let Some(s) = session_string {
            return Some(SessionSource::String(s));
        }

        let local = session_file_in(work_dir, session_name);
        if let Some(p) = session_file_path.filter(|p| p.is_file()) {
            return Some(SessionSource::File {
                path: local,
                import_from: Some(p.to_path_buf()),
            });
        }

        if local.is_file() {
            return Some(SessionSource::File {
                path: local,
                import_from: None,
            });
        }

        None
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionSource::String(_) => "string",
            SessionSource::File { .. } => "file",
        }
    }

    /// Copy an imported session file into place. A failed copy is logged and
    /// the existing local file (if any) is used instead.
    pub fn stage(&self) -> Result<()> {
        let SessionSource::File {
            path,
            import_from: Some(src),
        } = self
        else {
            return Ok(());
        };

        match fs::copy(src, path) {
            Ok(_) => info!(dst = %path.display(), "copied provided session file into working dir"),
            Err(e) => warn!(src = %src.display(), "failed to copy session file: {e}"),
        }
        Ok(())
    }
}

pub fn session_file_in(dir: &Path, session_name: &str) -> PathBuf {
    dir.join(format!("{session_name}.{SESSION_EXTENSION}"))
}

/// Remove leftover `*.session` files so a bot-mode run never loads a user
/// session. Returns the removed file names.
pub fn remove_stale_session_files(dir: &Path) -> Vec<String> {
    let Ok(rd) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut removed = Vec::new();
    for ent in rd.flatten() {
        let path = ent.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXTENSION) {
            continue;
        }
        let name = ent.file_name().to_string_lossy().to_string();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(file = %name, "removed leftover session file");
                removed.push(name);
            }
            Err(e) => warn!(file = %name, "could not remove session file: {e}"),
        }
    }
    removed.sort();
    removed
}
