//! Byte verifier: confirm candidate groups by full content comparison.
//!
//! # Overview
//!
//! A fingerprint match is never accepted as proof of equality before a
//! destructive filesystem mutation. Every candidate group passes through a
//! full byte comparison here first. Comparison is canonical-vs-each: O(n)
//! per group instead of all pairs, correct because byte equality is
//! transitive. Classes that fail the comparison are retried as canonicals
//! of their own round, so a bucket holding several distinct contents still
//! resolves into every genuine group it contains.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::groups::{DuplicateGroup, InodeClass};
use crate::progress::ProgressCallback;
use crate::scanner::Hash;

/// Comparison buffer size per file.
const COMPARE_CHUNK: usize = 64 * 1024;

/// A group of same-size classes suspected identical, awaiting verification.
#[derive(Debug, Clone)]
pub struct CandidateGroup {
    /// Size shared by every class
    pub size: u64,
    /// Full-content digest, when the group came through hashing
    pub hash: Option<Hash>,
    /// Suspect classes
    pub classes: Vec<InodeClass>,
}

/// Errors that can occur while comparing file contents.
#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    /// An I/O error occurred while reading a file for comparison.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl VerifyError {
    /// Path the error applies to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } => path,
        }
    }

    fn from_io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Statistics from the verification phase.
#[derive(Debug, Default)]
pub struct VerifyStats {
    /// Candidate groups received
    pub input_groups: usize,
    /// Classes received across all candidates
    pub input_classes: usize,
    /// Groups confirmed byte-identical
    pub confirmed_groups: usize,
    /// Classes in confirmed groups
    pub confirmed_classes: usize,
    /// Classes excluded because a read failed mid-comparison
    pub read_failures: Vec<VerifyError>,
    /// Whether the phase was interrupted by shutdown
    pub interrupted: bool,
}

/// Compare two files byte for byte.
///
/// Callers guarantee equal sizes; a length mismatch observed mid-stream
/// (concurrent truncation) compares unequal rather than erroring.
///
/// # Errors
///
/// Returns [`VerifyError`] naming the file whose read failed.
pub fn files_equal(a: &Path, b: &Path) -> Result<bool, VerifyError> {
    let mut file_a = File::open(a).map_err(|e| VerifyError::from_io(a, e))?;
    let mut file_b = File::open(b).map_err(|e| VerifyError::from_io(b, e))?;

    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];

    loop {
        let n_a = read_full(&mut file_a, &mut buf_a).map_err(|e| VerifyError::from_io(a, e))?;
        let n_b = read_full(&mut file_b, &mut buf_b).map_err(|e| VerifyError::from_io(b, e))?;

        if n_a != n_b {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
        if buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
    }
}

/// Read until the buffer is full or EOF; returns bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Verify one candidate, partitioning it into byte-identical groups.
///
/// Each round takes the first remaining class as provisional canonical and
/// compares every other class against it. Equal classes form a group;
/// unequal classes seed the next round. Classes whose reads fail are
/// excluded with the failure recorded. Partitions after the first lose the
/// candidate's hash: if a hashed group splits, the digest collided and
/// describes neither partition reliably.
fn verify_candidate(
    candidate: CandidateGroup,
    failures: &mut Vec<VerifyError>,
) -> Vec<DuplicateGroup> {
    let CandidateGroup {
        size,
        hash,
        classes,
    } = candidate;

    let mut remaining = classes;
    let mut confirmed = Vec::new();
    let mut first_partition = true;

    while remaining.len() >= 2 {
        let canonical = remaining.remove(0);
        let canonical_path = canonical.representative().path.clone();
        let mut equals = vec![canonical];
        let mut rest = Vec::new();
        let mut canonical_failed = false;

        for other in remaining {
            if canonical_failed {
                rest.push(other);
                continue;
            }
            match files_equal(&canonical_path, &other.representative().path) {
                Ok(true) => equals.push(other),
                Ok(false) => rest.push(other),
                Err(e) => {
                    if e.path() == canonical_path {
                        // Canonical became unreadable; requeue everything
                        // already matched against it and retry the round.
                        log::warn!("Dropping unreadable canonical: {}", e);
                        failures.push(e);
                        canonical_failed = true;
                        rest.extend(equals.drain(1..));
                        rest.push(other);
                    } else {
                        log::warn!("Dropping unreadable candidate: {}", e);
                        failures.push(e);
                    }
                }
            }
        }

        if !canonical_failed && equals.len() >= 2 {
            if !first_partition && hash.is_some() {
                log::warn!(
                    "Fingerprint collision detected in {}-byte bucket; split by byte comparison",
                    size
                );
            }
            let group_hash = if first_partition { hash } else { None };
            confirmed.push(DuplicateGroup::new(group_hash, size, equals));
        }
        first_partition = false;
        remaining = rest;
    }

    confirmed
}

/// Verify candidate groups in parallel.
///
/// Groups are independent; each is verified on its own worker. The
/// shutdown flag is observed between groups; a group mid-verification
/// always completes.
#[must_use]
pub fn verify_groups(
    candidates: Vec<CandidateGroup>,
    pool: &rayon::ThreadPool,
    shutdown_flag: Option<&Arc<AtomicBool>>,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> (Vec<DuplicateGroup>, VerifyStats) {
    let mut stats = VerifyStats {
        input_groups: candidates.len(),
        input_classes: candidates.iter().map(|c| c.classes.len()).sum(),
        ..Default::default()
    };

    if candidates.is_empty() {
        return (Vec::new(), stats);
    }

    if let Some(callback) = progress {
        callback.on_phase_start("verifying", candidates.len());
    }

    log::info!(
        "Verifying {} candidate groups ({} classes) byte-for-byte",
        stats.input_groups,
        stats.input_classes
    );

    let results: Vec<(Vec<DuplicateGroup>, Vec<VerifyError>)> = pool.install(|| {
        candidates
            .into_par_iter()
            .enumerate()
            .filter_map(|(idx, candidate)| {
                if shutdown_flag.is_some_and(|f| f.load(Ordering::SeqCst)) {
                    return None;
                }
                if let Some(callback) = progress {
                    let label = candidate
                        .classes
                        .first()
                        .map(|c| c.representative().path.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    callback.on_progress(idx + 1, &label);
                }
                let mut failures = Vec::new();
                let groups = verify_candidate(candidate, &mut failures);
                Some((groups, failures))
            })
            .collect()
    });

    stats.interrupted = shutdown_flag.is_some_and(|f| f.load(Ordering::SeqCst));

    let mut confirmed = Vec::new();
    for (groups, failures) in results {
        stats.read_failures.extend(failures);
        confirmed.extend(groups);
    }
    stats.confirmed_groups = confirmed.len();
    stats.confirmed_classes = confirmed.iter().map(DuplicateGroup::len).sum();

    if let Some(callback) = progress {
        callback.on_phase_end("verifying");
    }

    log::info!(
        "Verification complete: {} of {} groups confirmed",
        stats.confirmed_groups,
        stats.input_groups
    );

    (confirmed, stats)
}
