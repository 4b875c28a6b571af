//! Single-writer guard for one destination identity's journal.

use crate::{BackerError, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Held for the duration of a run; the lock file is removed on drop.
#[derive(Debug)]
pub struct JournalLock {
    path: PathBuf,
}

impl JournalLock {
    /// Create the lock file, failing if another run holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(BackerError::JournalLocked(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JournalLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove journal lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock.usb-a");

        let lock = JournalLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(
            JournalLock::acquire(&path),
            Err(BackerError::JournalLocked(_))
        ));

        drop(lock);
        assert!(!path.exists());
        assert!(JournalLock::acquire(&path).is_ok());
    }
}
