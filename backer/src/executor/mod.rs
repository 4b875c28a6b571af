//! Backup executor - copies every file in the missing set.
//!
//! Files are handled one at a time, in source-root then catalog order:
//! - destination and source are fingerprinted again, since time has passed
//!   since classification;
//! - an existing destination file of the same size is compared byte for byte
//!   and, if identical, only journaled;
//! - any other existing destination file is renamed aside;
//! - the source is copied into place and the completion is journaled.
//!
//! The first error stops the run. Everything journaled before it stays
//! journaled, so the next run resumes past it.

pub mod conflict;
pub mod copy;

use crate::config::CopyConfig;
use crate::destination::Destination;
use crate::fs::compare::files_identical;
use crate::fs::metadata::{apply_mod_time, fingerprint_pair};
use crate::fs::walker::total_files;
use crate::fs::{FileFingerprint, SourceRoot};
use crate::journal::{journal_key, WorkLog};
use crate::transfer::progress::{format_bytes, ProgressTracker};
use crate::{BackerError, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Bytes were copied
    Copied(u64),
    /// The destination already held the same bytes
    Identical(u64),
}

/// Execution result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub copied_files: usize,
    pub copied_bytes: u64,
    pub identical_files: usize,
    pub identical_bytes: u64,
    /// Conflicting destination files, at their new names
    pub renamed: Vec<PathBuf>,
}

/// Main backup executor
pub struct BackupExecutor {
    destination: Destination,
    work_log: WorkLog,
    options: CopyConfig,
    cancel_token: CancellationToken,
}

impl BackupExecutor {
    /// Create a new backup executor (no cancellation support)
    pub fn new(destination: Destination, work_log: WorkLog, options: CopyConfig) -> Self {
        Self::with_cancel(destination, work_log, options, CancellationToken::new())
    }

    /// Create a new backup executor with cancellation support
    pub fn with_cancel(
        destination: Destination,
        work_log: WorkLog,
        options: CopyConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            destination,
            work_log,
            options,
            cancel_token,
        }
    }

    /// Back up every file of `missing`. `bytes_to_copy` only feeds progress reporting.
    pub fn execute(&mut self, missing: &[SourceRoot], bytes_to_copy: u64) -> Result<ExecutionStats> {
        let total = total_files(missing);
        let mut tracker = ProgressTracker::new(bytes_to_copy, total, self.options.progress_every);
        let mut stats = ExecutionStats::default();

        info!(
            "Backing up {} files ({}) to {}",
            total,
            format_bytes(bytes_to_copy),
            self.destination.home().display()
        );

        for source in missing {
            for relative in &source.files {
                if self.cancel_token.is_cancelled() {
                    info!(
                        "Backup cancelled after {}/{} files",
                        tracker.progress().done_files,
                        total
                    );
                    return Err(BackerError::Cancelled);
                }

                let outcome = match self.back_up_file(source, relative, &mut stats) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(
                            "Cannot backup {}: {}",
                            source.source_path(relative).display(),
                            e
                        );
                        return Err(e);
                    }
                };

                let bytes = match outcome {
                    FileOutcome::Copied(n) => {
                        stats.copied_files += 1;
                        stats.copied_bytes += n;
                        n
                    }
                    FileOutcome::Identical(n) => {
                        stats.identical_files += 1;
                        stats.identical_bytes += n;
                        n
                    }
                };

                if tracker.file_done(bytes) {
                    info!("Backing up... {}", tracker.line());
                }
            }
        }

        info!(
            "Backup done: {} copied ({}), {} already identical, {} renamed aside, {} journaled",
            stats.copied_files,
            format_bytes(stats.copied_bytes),
            stats.identical_files,
            stats.renamed.len(),
            self.work_log.appended()
        );
        Ok(stats)
    }

    fn back_up_file(
        &mut self,
        source: &SourceRoot,
        relative: &Path,
        stats: &mut ExecutionStats,
    ) -> Result<FileOutcome> {
        let dst_path = self.destination.path_for(source, relative);
        let src_path = source.source_path(relative);
        let key = journal_key(&source.mirror_name, relative);

        let (dst, src) = fingerprint_pair(&dst_path, &src_path)?;

        if let Some(dst) = dst {
            if dst.size == src.size
                && files_identical(&dst_path, &src_path, self.options.chunk_size).map_err(
                    |source| BackerError::Copy {
                        path: dst_path.clone(),
                        source,
                    },
                )?
            {
                // Same bytes, only the timestamp was lost
                if dst.mod_time != src.mod_time {
                    apply_mod_time(&dst_path, src.mod_time_as_system_time()).map_err(
                        |source| BackerError::Copy {
                            path: dst_path.clone(),
                            source,
                        },
                    )?;
                }
                self.record(&key, &dst_path)?;
                debug!("Already identical: {}", key);
                return Ok(FileOutcome::Identical(src.size));
            }

            let moved = conflict::rename_aside(&dst_path, self.options.max_rename_attempts)?;
            warn!(
                "NOTE: {} exists but differs; renamed to {}",
                dst_path.display(),
                moved.file_name().unwrap_or_default().to_string_lossy()
            );
            stats.renamed.push(moved);
        }

        let copied = copy::copy_file(
            &src_path,
            &dst_path,
            &self.destination.partial_path(),
            src.mod_time_as_system_time(),
            self.options.chunk_size,
            &self.cancel_token,
        )?;
        self.record(&key, &dst_path)?;
        debug!("Copied {} ({})", key, format_bytes(copied));

        Ok(FileOutcome::Copied(copied))
    }

    /// Journal the destination file as it is now on disk.
    fn record(&mut self, key: &str, dst_path: &Path) -> Result<()> {
        let recorded =
            FileFingerprint::from_path(dst_path).map_err(|source| BackerError::DestinationStat {
                path: dst_path.to_path_buf(),
                source,
            })?;
        self.work_log.append(key, &recorded)
    }
}
