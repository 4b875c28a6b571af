//! Change detection.
//!
//! Splits the scanned catalogs into files that need copying ("missing") and
//! files that look already present at the destination ("rest"). The first
//! pass only compares fingerprints against the destination; the second pass
//! demands a matching completion-journal record for everything in rest, since
//! matching metadata alone does not prove this engine copied the file.

use crate::destination::Destination;
use crate::fs::metadata::{fingerprint_pair, source_fingerprint};
use crate::fs::walker::total_files;
use crate::fs::SourceRoot;
use crate::journal::{journal_key, JournalMap};
use crate::transfer::progress::format_bytes;
use crate::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Result of change detection.
///
/// `missing[i]` and `rest[i]` both describe the `i`-th scanned source root,
/// and each keeps the catalog order of that root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub missing: Vec<SourceRoot>,
    pub rest: Vec<SourceRoot>,

    /// Sum of source sizes of the missing files
    pub bytes_to_copy: u64,
}

impl Classification {
    pub fn missing_count(&self) -> usize {
        total_files(&self.missing)
    }

    pub fn rest_count(&self) -> usize {
        total_files(&self.rest)
    }
}

/// Compare every cataloged file with its mirrored destination path.
pub fn classify(
    sources: &[SourceRoot],
    destination: &Destination,
    progress_every: usize,
) -> Result<Classification> {
    let total = total_files(sources);
    let mut missing = Vec::with_capacity(sources.len());
    let mut rest = Vec::with_capacity(sources.len());
    let mut bytes_to_copy = 0u64;
    let mut n = 0usize;

    for source in sources {
        let mut m = source.empty_like();
        let mut r = source.empty_like();

        for relative in &source.files {
            n += 1;
            if progress_every > 0 && (n == 1 || n % progress_every == 0 || n == total) {
                debug!("Comparing... {}/{}", n, total);
            }

            let dst_path = destination.path_for(source, relative);
            let src_path = source.source_path(relative);
            let (dst, src) = fingerprint_pair(&dst_path, &src_path)?;

            if dst == Some(src) {
                r.files.push(relative.clone());
            } else {
                bytes_to_copy += src.size;
                m.files.push(relative.clone());
            }
        }

        missing.push(m);
        rest.push(r);
    }

    let classification = Classification {
        missing,
        rest,
        bytes_to_copy,
    };
    info!(
        "Destination check: {} missing, {} present ({} to copy)",
        classification.missing_count(),
        classification.rest_count(),
        format_bytes(bytes_to_copy)
    );
    Ok(classification)
}

/// Move files from rest back to missing unless the journal holds a record
/// matching the source's current fingerprint. Returns the number of files moved.
pub fn reclassify_against_journal(
    sources: &[SourceRoot],
    classification: &mut Classification,
    journal: &JournalMap,
) -> Result<usize> {
    let mut moved = 0usize;

    for (i, source) in sources.iter().enumerate() {
        let rest = &mut classification.rest[i];
        let mut trusted = Vec::with_capacity(rest.files.len());

        for relative in rest.files.drain(..) {
            let src = source_fingerprint(&source.source_path(&relative))?;
            let key = journal_key(&source.mirror_name, &relative);

            if journal.get(&key) == Some(&src) {
                trusted.push(relative);
            } else {
                debug!("Not in journal or changed since recorded: {}", key);
                classification.bytes_to_copy += src.size;
                moved += 1;
            }
        }

        // Rebuild missing from the catalog so it stays in traversal order
        let kept: HashSet<&Path> = trusted.iter().map(|p| p.as_path()).collect();
        classification.missing[i].files = source
            .files
            .iter()
            .filter(|f| !kept.contains(f.as_path()))
            .cloned()
            .collect();
        classification.rest[i].files = trusted;
    }

    info!(
        "Journal check: {} more files untrusted, missing {}/{} ({})",
        moved,
        classification.missing_count(),
        total_files(sources),
        format_bytes(classification.bytes_to_copy)
    );
    Ok(moved)
}
