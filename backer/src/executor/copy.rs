//! Copying one file into place.
//!
//! Bytes are streamed into a temporary file in the destination's staging
//! directory, synced, given the source's modification time and only then
//! moved to the final name. The staging file has a fixed name, so its length
//! never depends on the destination file name. The final name is never
//! overwritten: if something appeared there in the meantime the copy fails.
//! Until the move succeeds the temporary file is owned by a guard that
//! deletes it, so an error or a cancellation never leaves a file that looks
//! finished.

use crate::fs::metadata::apply_mod_time;
use crate::{BackerError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Temporary file removed on drop unless it was moved into place
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn create(path: PathBuf) -> io::Result<(Self, File)> {
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok((Self { path, armed: true }, file))
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove partial file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Move `from` to `to`, failing if `to` exists.
fn persist_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(from) {
                warn!("Failed to remove {} after linking: {}", from.display(), e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            // Filesystems without hard links (FAT, exFAT): check, then rename
            debug!("Hard link into place failed ({}), falling back to rename", e);
            match fs::symlink_metadata(to) {
                Ok(_) => Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} appeared during the copy", to.display()),
                )),
                Err(e) if e.kind() == io::ErrorKind::NotFound => fs::rename(from, to),
                Err(e) => Err(e),
            }
        }
    }
}

/// Copy `source` to `destination` through the temporary file `partial` and
/// set the result's modification time to `mod_time`. `partial` must be on the
/// same filesystem as `destination`. Returns the number of bytes copied.
pub fn copy_file(
    source: &Path,
    destination: &Path,
    partial: &Path,
    mod_time: SystemTime,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<u64> {
    let copy_err = |source: io::Error| BackerError::Copy {
        path: destination.to_path_buf(),
        source,
    };

    let mut reader = File::open(source).map_err(|e| BackerError::SourceStat {
        path: source.to_path_buf(),
        source: e,
    })?;

    for dir in [destination.parent(), partial.parent()].into_iter().flatten() {
        fs::create_dir_all(dir).map_err(copy_err)?;
    }

    match fs::remove_file(partial) {
        Ok(()) => debug!("Removed stale partial file {}", partial.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(copy_err(e)),
    }

    let (mut guard, mut writer) = PartialFile::create(partial.to_path_buf()).map_err(copy_err)?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(BackerError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(copy_err(e)),
        };
        writer.write_all(&buf[..n]).map_err(copy_err)?;
        copied += n as u64;
    }

    writer.sync_all().map_err(copy_err)?;
    drop(writer);

    apply_mod_time(&guard.path, mod_time).map_err(copy_err)?;
    persist_no_clobber(&guard.path, destination).map_err(copy_err)?;
    guard.disarm();

    Ok(copied)
}
