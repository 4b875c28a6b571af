//! File system helpers: source scanning, fingerprints and content comparison.

pub mod compare;
pub mod metadata;
pub mod walker;

pub use metadata::FileFingerprint;
pub use walker::{scan_sources, SourceRoot};
