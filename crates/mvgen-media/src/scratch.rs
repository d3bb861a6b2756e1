//! Per-job scratch directories.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::warn;

use crate::error::MediaResult;

/// Working directory for one job; removed on drop or [`ScratchDir::close`].
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under `root`.
    pub fn new_in(root: impl AsRef<Path>, prefix: &str) -> MediaResult<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory now, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_removed_on_close() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new_in(root.path(), "job-").unwrap();
        std::fs::write(scratch.file("clip_000.mp4"), b"x").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.starts_with(root.path()));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("job-"));

        scratch.close();
        assert!(!path.exists());
    }
}
