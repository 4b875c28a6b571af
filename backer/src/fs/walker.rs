//! Source tree scanning.
//!
//! Walks each configured source root and records the path of every regular
//! file relative to that root. Directory entries are visited in file name
//! order so the catalog is stable for a given filesystem state.

use crate::config::BackupConfig;
use crate::{BackerError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Catalog of one configured source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    /// Root directory on the source side
    pub root: PathBuf,

    /// Directory name this root is mirrored into under the destination home
    pub mirror_name: OsString,

    /// File paths relative to `root`, in traversal order
    pub files: Vec<PathBuf>,
}

impl SourceRoot {
    /// Same root and mirror name, no files.
    pub fn empty_like(&self) -> Self {
        Self {
            root: self.root.clone(),
            mirror_name: self.mirror_name.clone(),
            files: Vec::new(),
        }
    }

    pub fn source_path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

/// Number of files across all catalogs.
pub fn total_files(roots: &[SourceRoot]) -> usize {
    roots.iter().map(|r| r.files.len()).sum()
}

/// Returns the path relative to `root` if the entry is a regular file
/// (or a symlink resolving to one).
fn relative_file(entry: &DirEntry, root: &Path) -> Result<Option<PathBuf>> {
    if entry.file_type().is_dir() {
        return Ok(None);
    }

    if entry.path_is_symlink() {
        // Symlinks to directories and broken symlinks are skipped
        match std::fs::metadata(entry.path()) {
            Ok(resolved) if resolved.is_file() => {}
            Ok(_) => {
                debug!("Skipping symlink to non-file: {}", entry.path().display());
                return Ok(None);
            }
            Err(e) => {
                debug!("Skipping broken symlink {}: {}", entry.path().display(), e);
                return Ok(None);
            }
        }
    } else if !entry.file_type().is_file() {
        debug!("Skipping special file: {}", entry.path().display());
        return Ok(None);
    }

    let relative = entry
        .path()
        .strip_prefix(root)
        .map_err(|_| {
            BackerError::Config(format!(
                "cannot relativize path {} in {}",
                entry.path().display(),
                root.display()
            ))
        })?
        .to_path_buf();

    if relative.as_os_str().is_empty() {
        return Err(BackerError::Config(format!(
            "source root {} is not a directory",
            root.display()
        )));
    }

    Ok(Some(relative))
}

/// Walk a directory tree with a callback for each file found.
pub fn walk_directory_with_callback<F>(root: &Path, mut callback: F) -> Result<()>
where
    F: FnMut(PathBuf),
{
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| BackerError::Scan {
            root: root.to_path_buf(),
            source,
        })?;

        if let Some(relative) = relative_file(&entry, root)? {
            callback(relative);
        }
    }

    Ok(())
}

/// Scan every configured root. A root without any file is an error: it most
/// likely points at an unmounted drive.
pub fn scan_sources(
    backups: &[BackupConfig],
    progress_every: usize,
) -> Result<Vec<SourceRoot>> {
    let mut sources = Vec::with_capacity(backups.len());
    let mut scanned = 0usize;

    for backup in backups {
        let mirror_name = backup.mirror_name().ok_or_else(|| {
            BackerError::Config(format!(
                "cannot derive a destination directory name for {}",
                backup.root.display()
            ))
        })?;

        info!("Scanning {}", backup.root.display());

        let mut files = Vec::new();
        walk_directory_with_callback(&backup.root, |relative| {
            files.push(relative);
            scanned += 1;
            if progress_every > 0 && scanned % progress_every == 0 {
                debug!("Scanned {} files...", scanned);
            }
        })?;

        if files.is_empty() {
            return Err(BackerError::EmptySource(backup.root.clone()));
        }

        info!("Scanned {}: {} files", backup.root.display(), files.len());

        sources.push(SourceRoot {
            root: backup.root.clone(),
            mirror_name,
            files,
        });
    }

    info!("Scanned {} files.", total_files(&sources));
    Ok(sources)
}
