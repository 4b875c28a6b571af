//! One backup run, from destination detection to the last journaled file.

use crate::classify::{classify, reclassify_against_journal};
use crate::config::Config;
use crate::destination::{self, Destination};
use crate::executor::BackupExecutor;
use crate::fs::scan_sources;
use crate::fs::walker::total_files;
use crate::journal::{journal_key, Journal};
use crate::transfer::progress::{format_bytes, format_duration};
use crate::{BackerError, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Options for a single run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Classify and report, but do not merge the journal or copy anything
    pub dry_run: bool,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub destination: Destination,
    pub scanned_files: usize,
    pub missing_files: usize,
    pub bytes_to_copy: u64,
    pub copied_files: usize,
    pub copied_bytes: u64,
    pub identical_files: usize,
    pub renamed: Vec<PathBuf>,
    pub duration: Duration,
    pub dry_run: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            return write!(
                f,
                "dry run: {}/{} files would be backed up ({}) to {}",
                self.missing_files,
                self.scanned_files,
                format_bytes(self.bytes_to_copy),
                self.destination.id
            );
        }
        write!(
            f,
            "{} scanned, {} missing, {} copied ({}), {} already identical, {} renamed aside, took {}",
            self.scanned_files,
            self.missing_files,
            self.copied_files,
            format_bytes(self.copied_bytes),
            self.identical_files,
            self.renamed.len(),
            format_duration(self.duration.as_secs())
        )
    }
}

/// Backup engine bound to one configuration
pub struct Engine {
    config: Config,
    cancel_token: CancellationToken,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self::with_cancel(config, CancellationToken::new())
    }

    pub fn with_cancel(config: Config, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            cancel_token,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(BackerError::Cancelled);
        }
        Ok(())
    }

    /// Run one backup.
    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let start = Instant::now();
        let config = &self.config;
        let progress_every = config.copy.progress_every;

        let destination = destination::resolve(&config.to.cfg_paths, &config.to.ids)?;
        self.check_cancelled()?;

        let sources = scan_sources(&config.backups, progress_every)?;
        self.check_cancelled()?;

        let mut classification = classify(&sources, &destination, progress_every)?;
        self.check_cancelled()?;

        let journal = Journal::new(&config.journal_dir(), &destination.id);

        if options.dry_run {
            let view = journal.merged_view()?;
            reclassify_against_journal(&sources, &mut classification, &view)?;
            for source in &classification.missing {
                for relative in &source.files {
                    info!("Would back up {}", journal_key(&source.mirror_name, relative));
                }
            }

            return Ok(RunSummary {
                destination,
                scanned_files: total_files(&sources),
                missing_files: classification.missing_count(),
                bytes_to_copy: classification.bytes_to_copy,
                copied_files: 0,
                copied_bytes: 0,
                identical_files: 0,
                renamed: Vec::new(),
                duration: start.elapsed(),
                dry_run: true,
            });
        }

        let lock = journal.lock()?;
        debug!("Holding journal lock {}", lock.path().display());
        let merged = journal.merge()?;
        reclassify_against_journal(&sources, &mut classification, &merged)?;
        self.check_cancelled()?;

        let work_log = journal.open_work_log()?;
        let mut executor = BackupExecutor::with_cancel(
            destination.clone(),
            work_log,
            config.copy.clone(),
            self.cancel_token.clone(),
        );
        let stats = executor.execute(&classification.missing, classification.bytes_to_copy)?;

        Ok(RunSummary {
            destination,
            scanned_files: total_files(&sources),
            missing_files: classification.missing_count(),
            bytes_to_copy: classification.bytes_to_copy,
            copied_files: stats.copied_files,
            copied_bytes: stats.copied_bytes,
            identical_files: stats.identical_files,
            renamed: stats.renamed,
            duration: start.elapsed(),
            dry_run: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackupConfig, CopyConfig, LogConfig, MainConfig, TargetsConfig};
    use crate::fs::metadata::apply_mod_time;
    use crate::fs::FileFingerprint;
    use crate::journal::JournalRecord;
    use std::fs;
    use std::path::Path;
    use std::time::SystemTime;
    use tempfile::TempDir;

    struct Setup {
        dir: TempDir,
        config: Config,
    }

    impl Setup {
        /// Source root `src` with `a.txt` (10 bytes, T1) and `b.txt` (20 bytes, T2),
        /// an empty destination volume `usb-a`.
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("src");
            let home = dir.path().join("volume");
            fs::create_dir_all(&root).unwrap();
            fs::create_dir_all(&home).unwrap();
            fs::write(home.join("backer.toml"), "[main]\nid = \"usb-a\"\n").unwrap();

            let t1 = SystemTime::UNIX_EPOCH + Duration::new(1_500_000_000, 111);
            let t2 = SystemTime::UNIX_EPOCH + Duration::new(1_600_000_000, 222);
            fs::write(root.join("a.txt"), "0123456789").unwrap();
            apply_mod_time(&root.join("a.txt"), t1).unwrap();
            fs::write(root.join("b.txt"), "01234567890123456789").unwrap();
            apply_mod_time(&root.join("b.txt"), t2).unwrap();

            let config = Config {
                main: MainConfig {
                    db_dir: Some(dir.path().join("etc")),
                },
                to: TargetsConfig {
                    ids: vec!["usb-a".to_string()],
                    cfg_paths: vec![
                        dir.path().join("elsewhere/backer.toml"),
                        home.join("backer.toml"),
                    ],
                },
                backups: vec![BackupConfig { root, alias: None }],
                copy: CopyConfig::default(),
                log: LogConfig::default(),
            };

            Self { dir, config }
        }

        fn engine(&self) -> Engine {
            Engine::new(self.config.clone())
        }

        fn src(&self, name: &str) -> std::path::PathBuf {
            self.dir.path().join("src").join(name)
        }

        fn dst(&self, name: &str) -> std::path::PathBuf {
            self.dir.path().join("volume/src").join(name)
        }

        fn journal(&self) -> Journal {
            Journal::new(&self.config.journal_dir(), "usb-a")
        }
    }

    fn fingerprint(path: &Path) -> FileFingerprint {
        FileFingerprint::from_path(path).unwrap()
    }

    #[test]
    fn test_fresh_destination_then_idempotent_rerun() {
        let s = Setup::new();

        let first = s.engine().run(&RunOptions::default()).unwrap();
        assert_eq!(first.scanned_files, 2);
        assert_eq!(first.copied_files, 2);
        assert_eq!(first.copied_bytes, 30);
        assert_eq!(fingerprint(&s.dst("a.txt")), fingerprint(&s.src("a.txt")));
        assert_eq!(fingerprint(&s.dst("b.txt")), fingerprint(&s.src("b.txt")));

        let second = s.engine().run(&RunOptions::default()).unwrap();
        assert_eq!(second.missing_files, 0);
        assert_eq!(second.copied_files, 0);
        assert_eq!(second.identical_files, 0);

        // The first run's work log was merged: two rows matching the sources
        let local = s.journal().read_local().unwrap();
        assert_eq!(local.len(), 2);
        assert_eq!(local["src/a.txt"], fingerprint(&s.src("a.txt")));
        assert_eq!(local["src/b.txt"], fingerprint(&s.src("b.txt")));
    }

    #[test]
    fn test_present_but_unjournaled_file_is_confirmed_not_copied() {
        let s = Setup::new();
        fs::create_dir_all(s.dst("")).unwrap();
        fs::copy(s.src("a.txt"), s.dst("a.txt")).unwrap();
        apply_mod_time(&s.dst("a.txt"), fingerprint(&s.src("a.txt")).mod_time_as_system_time())
            .unwrap();

        let summary = s.engine().run(&RunOptions::default()).unwrap();
        assert_eq!(summary.missing_files, 2);
        assert_eq!(summary.identical_files, 1);
        assert_eq!(summary.copied_files, 1);
        assert!(summary.renamed.is_empty());

        let rows = s.journal().read_work().unwrap();
        assert_eq!(rows[0], JournalRecord::new("src/a.txt", fingerprint(&s.src("a.txt"))));
    }

    #[test]
    fn test_resumes_after_interruption() {
        let s = Setup::new();
        // A previous run journaled a.txt, then died before b.txt
        fs::create_dir_all(s.dst("")).unwrap();
        fs::copy(s.src("a.txt"), s.dst("a.txt")).unwrap();
        apply_mod_time(&s.dst("a.txt"), fingerprint(&s.src("a.txt")).mod_time_as_system_time())
            .unwrap();
        fs::create_dir_all(s.config.journal_dir()).unwrap();
        fs::write(
            s.journal().work_path(),
            JournalRecord::new("src/a.txt", fingerprint(&s.dst("a.txt"))).to_line(),
        )
        .unwrap();

        let summary = s.engine().run(&RunOptions::default()).unwrap();
        assert_eq!(summary.missing_files, 1);
        assert_eq!(summary.copied_files, 1);
        assert_eq!(summary.identical_files, 0);
        assert_eq!(fs::read(s.dst("b.txt")).unwrap(), b"01234567890123456789");
    }

    #[test]
    fn test_changed_source_replaces_and_keeps_old_version() {
        let s = Setup::new();
        s.engine().run(&RunOptions::default()).unwrap();

        fs::write(s.src("a.txt"), "abcdefghij").unwrap();
        apply_mod_time(&s.src("a.txt"), SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
            .unwrap();

        let summary = s.engine().run(&RunOptions::default()).unwrap();
        assert_eq!(summary.copied_files, 1);
        assert_eq!(summary.renamed, vec![s.dst("a.txt.$backer1")]);
        assert_eq!(fs::read(s.dst("a.txt.$backer1")).unwrap(), b"0123456789");
        assert_eq!(fs::read(s.dst("a.txt")).unwrap(), b"abcdefghij");
        assert_eq!(fingerprint(&s.dst("a.txt")), fingerprint(&s.src("a.txt")));
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let s = Setup::new();

        let summary = s.engine().run(&RunOptions { dry_run: true }).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.missing_files, 2);
        assert_eq!(summary.bytes_to_copy, 30);
        assert!(!s.dst("a.txt").exists());
        assert!(!s.journal().work_path().exists());
        assert!(!s.journal().local_path().exists());
    }

    #[test]
    fn test_no_destination_fails_before_scanning() {
        let mut s = Setup::new();
        s.config.to.ids = vec!["usb-z".to_string()];
        // Would be an error if it were scanned
        s.config.backups[0].root = s.dir.path().join("does-not-exist");

        let err = s.engine().run(&RunOptions::default()).unwrap_err();
        assert!(matches!(err, BackerError::NoDestination));
    }

    #[cfg(unix)]
    #[test]
    fn test_destination_stat_error_stops_before_copying() {
        let s = Setup::new();
        fs::write(s.dir.path().join("volume/src"), b"in the way").unwrap();

        let err = s.engine().run(&RunOptions::default()).unwrap_err();
        assert!(matches!(err, BackerError::DestinationStat { .. }));
        assert_eq!(fs::read(s.dir.path().join("volume/src")).unwrap(), b"in the way");
        assert!(!s.journal().work_path().exists());
        assert!(!s.dir.path().join("volume/.backer").exists());
    }

    #[test]
    fn test_concurrent_run_is_refused() {
        let s = Setup::new();
        let _held = s.journal().lock().unwrap();

        let err = s.engine().run(&RunOptions::default()).unwrap_err();
        assert!(matches!(err, BackerError::JournalLocked(_)));
        assert!(!s.dst("a.txt").exists());
    }

    #[test]
    fn test_cancelled_run_copies_nothing() {
        let s = Setup::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Engine::with_cancel(s.config.clone(), cancel)
            .run(&RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, BackerError::Cancelled));
        assert!(!s.dst("a.txt").exists());
    }
}
