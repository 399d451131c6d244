use fs2::FileExt;
use repowatch_core::{PipelineError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive lock on one repository's working copy, backed by a sibling
/// `<dir>.lock` file. Released when dropped.
#[derive(Debug)]
pub struct WorkingCopyLock {
    _file: File,
    path: PathBuf,
}

impl WorkingCopyLock {
    /// Try to take the lock without blocking.
    pub fn acquire(lock_path: &Path, repo: &str) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::Clone {
                repo: repo.to_string(),
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|e| PipelineError::Clone {
                repo: repo.to_string(),
                reason: format!("cannot open lock file {}: {e}", lock_path.display()),
            })?;

        file.try_lock_exclusive().map_err(|_| PipelineError::Locked {
            repo: repo.to_string(),
        })?;

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clones").join("acme-widgets.lock");

        let lock = WorkingCopyLock::acquire(&path, "acme/widgets").unwrap();
        let err = WorkingCopyLock::acquire(&path, "acme/widgets").unwrap_err();
        assert!(matches!(err, PipelineError::Locked { .. }));
        drop(lock);
        let again = WorkingCopyLock::acquire(&path, "acme/widgets").unwrap();
        assert_eq!(again.path(), path);
    }
}
