//! Moving conflicting destination files out of the way.

use crate::{BackerError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix appended to a conflicting file, followed by a small integer
pub const COLLISION_MARKER: &str = ".$backer";

/// First free `<path>.$backer<N>` for N in `1..=max_attempts`.
pub fn collision_path(path: &Path, max_attempts: u32) -> Result<PathBuf> {
    for n in 1..=max_attempts {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!("{}{}", COLLISION_MARKER, n));
        let candidate = PathBuf::from(name);

        match fs::symlink_metadata(&candidate) {
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
            Err(source) => {
                return Err(BackerError::DestinationStat {
                    path: candidate,
                    source,
                })
            }
        }
    }

    Err(BackerError::RenameExhausted {
        path: path.to_path_buf(),
        attempts: max_attempts,
    })
}

/// Rename `path` to its first free collision name and return the new path.
pub fn rename_aside(path: &Path, max_attempts: u32) -> Result<PathBuf> {
    let target = collision_path(path, max_attempts)?;
    fs::rename(path, &target).map_err(|source| BackerError::Rename {
        from: path.to_path_buf(),
        to: target.clone(),
        source,
    })?;
    Ok(target)
}
