//! Destination volume selection.
//!
//! Each backup volume carries a small description file naming its identity.
//! The volume may be mounted anywhere, so the engine probes a caller-ordered
//! list of candidate description files and picks the first one whose identity
//! it trusts. The directory containing that file is the destination home.

use crate::config::DestinationConfig;
use crate::fs::SourceRoot;
use crate::{BackerError, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory under the destination home reserved for in-flight copies.
/// No source root may mirror into it.
pub const STAGING_DIR: &str = ".backer";

/// The destination selected for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Identity token read from the description file
    pub id: String,

    /// Path to the description file
    pub path: PathBuf,
}

impl Destination {
    /// Directory under which all source roots are mirrored.
    pub fn home(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Mirror directory of one source root.
    pub fn root_for(&self, source: &SourceRoot) -> PathBuf {
        self.home().join(&source.mirror_name)
    }

    /// Destination path of one cataloged file.
    pub fn path_for(&self, source: &SourceRoot, relative: &Path) -> PathBuf {
        self.root_for(source).join(relative)
    }

    /// Temporary file each copy is written to before it is moved into place.
    pub fn partial_path(&self) -> PathBuf {
        self.home().join(STAGING_DIR).join("partial")
    }
}

/// Probe `candidates` in order and return the first destination whose
/// identity is listed in `trusted`.
pub fn resolve(candidates: &[PathBuf], trusted: &[String]) -> Result<Destination> {
    for (i, path) in candidates.iter().enumerate() {
        let description = match DestinationConfig::from_file(path) {
            Ok(d) => d,
            Err(e) => {
                info!(
                    "Detecting destination {}/{}: no ({}: {})",
                    i + 1,
                    candidates.len(),
                    path.display(),
                    e
                );
                continue;
            }
        };

        if trusted.iter().any(|id| *id == description.main.id) {
            info!(
                "Detecting destination {}/{}: OK {} (id: {})",
                i + 1,
                candidates.len(),
                path.display(),
                description.main.id
            );
            return Ok(Destination {
                id: description.main.id,
                path: path.clone(),
            });
        }

        warn!(
            "Detecting destination {}/{}: no (ID not matched: {})",
            i + 1,
            candidates.len(),
            description.main.id
        );
    }

    Err(BackerError::NoDestination)
}
