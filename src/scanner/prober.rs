//! Metadata prober: stat-based record collection.
//!
//! # Overview
//!
//! The prober turns candidate paths into [`FileRecord`]s. A path that is
//! not a regular file, vanished since enumeration, or cannot be read yields
//! a soft skip, never a fatal error; candidate lists race with concurrent
//! filesystem changes by nature.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::{FileRecord, InodeId};
use crate::progress::ProgressCallback;

/// Soft-skip conditions encountered while probing a candidate path.
///
/// Every variant leaves the run going; the affected path is recorded in the
/// report and excluded from grouping.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    /// The path is not a regular file (directory, socket, device node...).
    #[error("Not a regular file: {0}")]
    NotRegular(PathBuf),

    /// The path vanished between enumeration and probing.
    #[error("File vanished: {0}")]
    Vanished(PathBuf),

    /// Permission was denied when statting the path.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Inode identity is unavailable on this platform; the file cannot be
    /// safely linked.
    #[error("No inode identity available: {0}")]
    NoIdentity(PathBuf),

    /// An I/O error occurred while statting the path.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    /// Path the skip applies to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotRegular(p)
            | Self::Vanished(p)
            | Self::PermissionDenied(p)
            | Self::NoIdentity(p)
            | Self::Io { path: p, .. } => p,
        }
    }
}

/// Statistics from the probing phase.
#[derive(Debug, Default)]
pub struct ProbeStats {
    /// Candidate paths received
    pub candidates: usize,
    /// Records produced
    pub probed: usize,
    /// Soft skips with their reasons
    pub skips: Vec<ProbeError>,
    /// Whether the phase was interrupted by shutdown
    pub interrupted: bool,
}

/// Probe a single path into a [`FileRecord`].
///
/// Symlinks are not followed: a symlink candidate is reported as not a
/// regular file rather than resolved, so linking never rewrites a symlink's
/// target by accident.
///
/// # Errors
///
/// Returns a [`ProbeError`] soft skip for anything that is not a probe-able
/// regular file.
pub fn probe(path: &Path) -> Result<FileRecord, ProbeError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ProbeError::Vanished(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied(path.to_path_buf()),
        _ => ProbeError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    if !metadata.is_file() {
        return Err(ProbeError::NotRegular(path.to_path_buf()));
    }

    let inode = InodeId::from_metadata(&metadata)
        .ok_or_else(|| ProbeError::NoIdentity(path.to_path_buf()))?;

    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

    Ok(FileRecord::new(
        path.to_path_buf(),
        metadata.len(),
        inode,
        modified,
    ))
}

/// Probe a batch of candidate paths in parallel.
///
/// Probing is read-only and embarrassingly parallel; results are gathered
/// through the parallel iterator, so no shared mutable state exists between
/// workers. The given pool bounds I/O parallelism.
#[must_use]
pub fn probe_all(
    paths: Vec<PathBuf>,
    pool: &rayon::ThreadPool,
    shutdown_flag: Option<&Arc<AtomicBool>>,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> (Vec<FileRecord>, ProbeStats) {
    let mut stats = ProbeStats {
        candidates: paths.len(),
        ..Default::default()
    };

    if paths.is_empty() {
        return (Vec::new(), stats);
    }

    if let Some(callback) = progress {
        callback.on_phase_start("probing", paths.len());
    }

    let results: Vec<Result<FileRecord, ProbeError>> = pool.install(|| {
        paths
            .into_par_iter()
            .enumerate()
            .filter_map(|(idx, path)| {
                if shutdown_flag.is_some_and(|f| f.load(Ordering::SeqCst)) {
                    return None;
                }
                if let Some(callback) = progress {
                    callback.on_progress(idx + 1, path.to_string_lossy().as_ref());
                }
                Some(probe(&path))
            })
            .collect()
    });

    stats.interrupted = shutdown_flag.is_some_and(|f| f.load(Ordering::SeqCst));

    let mut records = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(record) => records.push(record),
            Err(skip) => {
                log::debug!("Probe skip: {}", skip);
                stats.skips.push(skip);
            }
        }
    }
    stats.probed = records.len();

    if let Some(callback) = progress {
        callback.on_phase_end("probing");
    }

    log::info!(
        "Probed {} of {} candidates ({} skipped)",
        stats.probed,
        stats.candidates,
        stats.skips.len()
    );

    (records, stats)
}
