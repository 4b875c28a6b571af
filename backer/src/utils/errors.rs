//! Custom error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot find any backup destination")]
    NoDestination,

    #[error("cannot scan source tree {root}: {source}")]
    Scan {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("no files found in source directory {0}")]
    EmptySource(PathBuf),

    #[error("cannot scan source file {path}: {source}")]
    SourceStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot scan destination file {path}: {source}")]
    DestinationStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot build filename for rename of {path} ({attempts} candidates taken)")]
    RenameExhausted { path: PathBuf, attempts: u32 },

    #[error("cannot rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot backup {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse journal {path}:{line}: {reason}")]
    Journal {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("journal is locked by another run: {0}")]
    JournalLocked(PathBuf),

    #[error("backup cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BackerError>;
