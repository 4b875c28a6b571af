//! Completion journal.
//!
//! Records every file the engine has finished copying for one destination
//! identity, so a later run can trust earlier progress without touching the
//! destination. Two files live in the journal directory:
//!
//! - `db.<id>.csv`, the durable local log carried across runs,
//! - `work.<id>.csv`, appended to while a run copies files.
//!
//! At the start of a run the previous work log is merged into the local log.
//! The merge treats the journal as a map keyed by path where later rows win:
//! work-log rows replace local rows with the same key, and a later work-log
//! row replaces an earlier one. A crash at any point before the final rename
//! leaves the previous local log and the work log intact, so merging again is
//! always safe.

pub mod lock;
pub mod record;

pub use lock::JournalLock;
pub use record::JournalRecord;

use crate::fs::FileFingerprint;
use crate::{BackerError, Result};
use record::split_records;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Journal contents: key → fingerprint recorded at completion
pub type JournalMap = BTreeMap<String, FileFingerprint>;

/// Journal key of a cataloged file: `<mirror name>/<relative path>` with `/` separators.
pub fn journal_key(mirror_name: &OsStr, relative: &Path) -> String {
    let mut key = mirror_name.to_string_lossy().into_owned();
    for component in relative.components() {
        key.push('/');
        key.push_str(&component.as_os_str().to_string_lossy());
    }
    key
}

/// Destination ids are opaque. Bytes outside `[A-Za-z0-9._-]` are
/// percent-encoded, so distinct ids always get distinct file names.
fn file_stem(destination_id: &str) -> String {
    let mut stem = String::with_capacity(destination_id.len());
    for b in destination_id.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => stem.push(b as char),
            _ => stem.push_str(&format!("%{:02X}", b)),
        }
    }
    stem
}

/// Journal files of one destination identity
#[derive(Debug, Clone)]
pub struct Journal {
    local_path: PathBuf,
    work_path: PathBuf,
    lock_path: PathBuf,
}

impl Journal {
    pub fn new(dir: &Path, destination_id: &str) -> Self {
        let stem = file_stem(destination_id);
        Self {
            local_path: dir.join(format!("db.{}.csv", stem)),
            work_path: dir.join(format!("work.{}.csv", stem)),
            lock_path: dir.join(format!("lock.{}", stem)),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn work_path(&self) -> &Path {
        &self.work_path
    }

    /// Take the single-writer lock for this identity.
    pub fn lock(&self) -> Result<JournalLock> {
        JournalLock::acquire(&self.lock_path)
    }

    /// Read the durable local log. A missing file is an empty journal; any
    /// malformed row is an error.
    pub fn read_local(&self) -> Result<JournalMap> {
        let mut map = JournalMap::new();
        for record in read_records(&self.local_path, false)? {
            map.insert(record.key, record.fingerprint);
        }
        Ok(map)
    }

    /// Read the work log left by a previous run, in append order. An
    /// unparsable final row without a line break is a torn write from an
    /// interrupted run and is dropped.
    pub fn read_work(&self) -> Result<Vec<JournalRecord>> {
        read_records(&self.work_path, true)
    }

    /// Local log with the pending work log applied, without writing anything.
    pub fn merged_view(&self) -> Result<JournalMap> {
        let mut map = self.read_local()?;
        for record in self.read_work()? {
            map.insert(record.key, record.fingerprint);
        }
        Ok(map)
    }

    /// Fold the previous run's work log into the local log and return the result.
    ///
    /// The combined log is written to a temporary sibling, synced and renamed
    /// over the local log; only then is the work log removed.
    pub fn merge(&self) -> Result<JournalMap> {
        let work = self.read_work()?;
        if work.is_empty() && !self.work_path.exists() {
            debug!("No work log to merge at {}", self.work_path.display());
            return self.read_local();
        }

        let mut map = self.read_local()?;
        let before = map.len();
        let pending = work.len();
        for record in work {
            map.insert(record.key, record.fingerprint);
        }

        self.write_local(&map)?;
        fs::remove_file(&self.work_path)?;

        info!(
            "Merged {} work log rows into {} ({} entries, {} new)",
            pending,
            self.local_path.display(),
            map.len(),
            map.len() - before
        );
        Ok(map)
    }

    fn write_local(&self, map: &JournalMap) -> Result<()> {
        if let Some(parent) = self.local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.local_path.with_extension("csv.tmp");
        let mut body = String::new();
        for (key, fingerprint) in map {
            body.push_str(&JournalRecord::new(key.clone(), *fingerprint).to_line());
        }

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(body.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.local_path)?;
        Ok(())
    }

    /// Start a fresh, empty work log for the current run.
    pub fn open_work_log(&self) -> Result<WorkLog> {
        if let Some(parent) = self.work_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.work_path)?;

        Ok(WorkLog {
            file,
            appended: 0,
        })
    }
}

fn read_records(path: &Path, tolerate_torn_tail: bool) -> Result<Vec<JournalRecord>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for raw in split_records(&text) {
        match JournalRecord::from_fields(&raw.fields) {
            Ok(record) => records.push(record),
            Err(reason) if tolerate_torn_tail && !raw.terminated => {
                warn!(
                    "Dropping incomplete last row of {}:{} ({})",
                    path.display(),
                    raw.line,
                    reason
                );
            }
            Err(reason) => {
                return Err(BackerError::Journal {
                    path: path.to_path_buf(),
                    line: raw.line,
                    reason,
                });
            }
        }
    }
    Ok(records)
}

/// Append handle on the current run's work log
#[derive(Debug)]
pub struct WorkLog {
    file: File,
    appended: usize,
}

impl WorkLog {
    /// Record one completed file and make it durable before returning.
    pub fn append(&mut self, key: &str, fingerprint: &FileFingerprint) -> Result<()> {
        let line = JournalRecord::new(key, *fingerprint).to_line();
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;
        self.appended += 1;
        Ok(())
    }

    /// Rows appended by this handle
    pub fn appended(&self) -> usize {
        self.appended
    }
}
