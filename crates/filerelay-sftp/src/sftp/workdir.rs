// ── Per-run local work directory ─────────────────────────────────────────────

use crate::sftp::error::{TransferError, TransferResult};
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Scratch directory for staged key material and write-connector content.
/// Removed by [`WorkDir::cleanup`], or on drop when cleanup was skipped.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    removed: bool,
}

impl WorkDir {
    /// Create `<root>/filerelay_<id>`; `root` defaults to the OS temp dir.
    pub fn create(root: Option<&str>) -> TransferResult<Self> {
        let base = match root {
            Some(r) if !r.trim().is_empty() => PathBuf::from(r),
            _ => std::env::temp_dir(),
        };
        let path = base.join(format!("filerelay_{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path).map_err(|e| {
            TransferError::operation(format!(
                "Failed to create work directory '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!("Work directory created at {}", path.display());
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `bytes` to a fresh file inside the work directory.
    pub fn stage(&self, prefix: &str, bytes: &[u8]) -> TransferResult<PathBuf> {
        let file = self
            .path
            .join(format!("{}_{}", prefix, uuid::Uuid::new_v4().simple()));
        std::fs::write(&file, bytes).map_err(|e| {
            TransferError::operation(format!("Failed to stage '{}': {}", file.display(), e))
        })?;
        Ok(file)
    }

    /// Remove the directory and everything in it.
    pub fn cleanup(mut self) -> TransferResult<()> {
        self.removed = true;
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!("Work directory {} removed", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove work directory {}: {}", self.path.display(), e);
                Err(TransferError::operation(format!(
                    "Failed to remove work directory '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_stage_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(root.path().to_str()).unwrap();
        let dir = wd.path().to_path_buf();
        assert!(dir.starts_with(root.path()));

        let staged = wd.stage("content", b"hello").unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"hello");

        wd.cleanup().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let wd = WorkDir::create(root.path().to_str()).unwrap();
            wd.stage("k", b"x").unwrap();
            wd.path().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn blank_root_falls_back_to_temp() {
        let wd = WorkDir::create(Some("  ")).unwrap();
        assert!(wd.path().starts_with(std::env::temp_dir()));
    }
}
