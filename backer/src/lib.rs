//! Backer Library
//!
//! Incremental single-destination file backup with a crash-resilient
//! completion journal.

pub mod classify;
pub mod config;
pub mod destination;
pub mod engine;
pub mod executor;
pub mod fs;
pub mod journal;
pub mod shutdown;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use crate::config::Config;
pub use engine::{Engine, RunOptions, RunSummary};
pub use utils::errors::BackerError;
pub type Result<T> = std::result::Result<T, BackerError>;
