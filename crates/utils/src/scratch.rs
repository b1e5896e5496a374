use std::{
    env, io,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use tempfile::TempDir;

const SCRATCH_DIR_ENV: &str = "HERALD_SCRATCH_DIR";

/// Root under which per-run scratch directories are created.
///
/// Resolution order: `HERALD_SCRATCH_DIR`, the platform cache directory, the
/// system temp directory.
pub fn scratch_root() -> PathBuf {
    if let Ok(dir) = env::var(SCRATCH_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    ProjectDirs::from("ai", "herald", "herald")
        .map(|dirs| dirs.cache_dir().join("scratch"))
        .unwrap_or_else(|| env::temp_dir().join("herald-scratch"))
}

/// Creates a fresh directory under `root` that is removed when the returned
/// handle is dropped.
pub fn scoped_dir(root: &Path, prefix: &str) -> io::Result<TempDir> {
    std::fs::create_dir_all(root)?;
    tempfile::Builder::new().prefix(prefix).tempdir_in(root)
}
