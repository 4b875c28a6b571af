//! File fingerprints used to decide whether a file is already backed up.
//!
//! A fingerprint is the pair (size, modification time). Two fingerprints are
//! equal only if both parts match exactly, down to the nanosecond.

use crate::{BackerError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Size and modification time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileFingerprint {
    /// File size in bytes
    pub size: u64,

    /// Last modified time
    pub mod_time: DateTime<Utc>,
}

impl FileFingerprint {
    pub fn new(size: u64, mod_time: DateTime<Utc>) -> Self {
        Self { size, mod_time }
    }

    /// Build a fingerprint from already fetched metadata.
    pub fn from_metadata(metadata: &fs::Metadata) -> io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            mod_time: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    /// Stat a path (following symlinks) and fingerprint it.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        Self::from_metadata(&fs::metadata(path)?)
    }

    /// RFC 3339 timestamp with as many fractional digits as needed.
    pub fn mod_time_rfc3339(&self) -> String {
        self.mod_time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn mod_time_as_system_time(&self) -> SystemTime {
        SystemTime::from(self.mod_time)
    }
}

/// Fingerprint a source file. A source that vanished or cannot be read is fatal.
pub fn source_fingerprint(path: &Path) -> Result<FileFingerprint> {
    FileFingerprint::from_path(path).map_err(|source| BackerError::SourceStat {
        path: path.to_path_buf(),
        source,
    })
}

/// Fingerprint a destination file, `None` if nothing exists there yet.
pub fn destination_fingerprint(path: &Path) -> Result<Option<FileFingerprint>> {
    match FileFingerprint::from_path(path) {
        Ok(fp) => Ok(Some(fp)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(BackerError::DestinationStat {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Fingerprint the destination and the source of one file, in that order.
pub fn fingerprint_pair(
    destination: &Path,
    source: &Path,
) -> Result<(Option<FileFingerprint>, FileFingerprint)> {
    let dst = destination_fingerprint(destination)?;
    let src = source_fingerprint(source)?;
    Ok((dst, src))
}

/// Set the modification time of `path`, leaving its access time untouched.
pub fn apply_mod_time(path: &Path, mod_time: SystemTime) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::from_system_time(mod_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_fingerprint_from_path() -> io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let fp = FileFingerprint::from_path(temp_file.path())?;
        assert_eq!(fp.size, 12);

        Ok(())
    }

    #[test]
    fn test_mod_time_roundtrips_with_nanoseconds() -> io::Result<()> {
        let temp_file = NamedTempFile::new()?;
        let when = SystemTime::UNIX_EPOCH + Duration::new(1_600_000_000, 123_456_789);
        apply_mod_time(temp_file.path(), when)?;

        let fp = FileFingerprint::from_path(temp_file.path())?;
        let parsed = DateTime::parse_from_rfc3339(&fp.mod_time_rfc3339())
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, fp.mod_time);

        Ok(())
    }

    #[test]
    fn test_fingerprint_equality_is_exact() {
        let t = DateTime::<Utc>::from(SystemTime::UNIX_EPOCH + Duration::from_secs(100));
        let later = t + chrono::Duration::nanoseconds(1);

        assert_eq!(FileFingerprint::new(10, t), FileFingerprint::new(10, t));
        assert_ne!(FileFingerprint::new(10, t), FileFingerprint::new(11, t));
        assert_ne!(FileFingerprint::new(10, t), FileFingerprint::new(10, later));
    }

    #[test]
    fn test_missing_destination_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let fp = destination_fingerprint(&dir.path().join("absent")).unwrap();
        assert!(fp.is_none());
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = source_fingerprint(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, BackerError::SourceStat { .. }));
    }
}
