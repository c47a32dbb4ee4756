//! Duplicate detection pipeline with multi-phase refinement.
//!
//! # Overview
//!
//! This module orchestrates the detection pipeline:
//! 1. **Probe**: stat every candidate into a [`FileRecord`]
//! 2. **Inode grouping**: collapse paths that share a physical file
//! 3. **Size grouping**: bucket by exact size, drop unique sizes
//! 4. **Pair shortcut**: two-class buckets go straight to byte
//!    verification; comparing two files once is cheaper than hashing both
//! 5. **Prefix digest**: BLAKE3 of the first 4 KiB eliminates most
//!    remaining non-duplicates cheaply
//! 6. **Full digest**: streaming BLAKE3 of whole contents
//! 7. **Verify**: byte-for-byte confirmation before anything is linked
//!
//! Unique file sizes are additionally rejected while records are still
//! streaming in, through a pair of Bloom filters, so trees dominated by
//! unique files never hold their full record list in memory.
//!
//! # Example
//!
//! ```no_run
//! use lndupe::dedup::{Deduper, DedupConfig};
//! use std::path::PathBuf;
//!
//! let deduper = Deduper::new(DedupConfig::default().with_io_threads(4));
//! let (groups, summary) = deduper
//!     .find_from_paths(vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")])
//!     .unwrap();
//! println!(
//!     "{} duplicate groups, {} bytes reclaimable",
//!     groups.len(),
//!     summary.reclaimable_bytes
//! );
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use growable_bloom_filter::GrowableBloom;
use rayon::prelude::*;

use super::groups::{group_by_inode, group_by_size, DuplicateGroup, InodeClass};
use super::verify::{verify_groups, CandidateGroup, VerifyError};
use crate::progress::ProgressCallback;
use crate::scanner::{FileRecord, Hash, HashError, Hasher, ProbeError};

/// Configuration for the duplicate detection pipeline.
#[derive(Clone, Default)]
pub struct DedupConfig {
    /// Number of I/O threads for parallel probing, hashing and
    /// verification. Zero means one. Low values prevent disk thrashing
    /// on spinning media.
    pub io_threads: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// False positive rate for the streaming size Bloom filters.
    pub bloom_fp_rate: f64,
}

impl std::fmt::Debug for DedupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupConfig")
            .field("io_threads", &self.io_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .field("bloom_fp_rate", &self.bloom_fp_rate)
            .finish()
    }
}

impl DedupConfig {
    /// Set the I/O thread count.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Set the Bloom filter false positive rate.
    #[must_use]
    pub fn with_bloom_fp_rate(mut self, rate: f64) -> Self {
        self.bloom_fp_rate = rate.clamp(0.0001, 0.1);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn effective_io_threads(&self) -> usize {
        if self.io_threads == 0 {
            DEFAULT_IO_THREADS
        } else {
            self.io_threads
        }
    }

    fn effective_fp_rate(&self) -> f64 {
        if self.bloom_fp_rate <= 0.0 {
            DEFAULT_BLOOM_FP_RATE
        } else {
            self.bloom_fp_rate
        }
    }
}

/// Default I/O parallelism; conservative to avoid disk thrashing.
const DEFAULT_IO_THREADS: usize = 4;

/// Default Bloom filter false positive rate.
const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

/// Errors that can abort duplicate detection.
#[derive(thiserror::Error, Debug)]
pub enum DedupError {
    /// The run was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Run interrupted by user")]
    Interrupted,
}

/// Summary statistics from a detection run.
#[derive(Debug, Default)]
pub struct DedupSummary {
    /// Candidate paths received
    pub candidate_paths: usize,
    /// Records produced by probing
    pub probed_files: usize,
    /// Total size of probed files in bytes
    pub probed_bytes: u64,
    /// Physical files (inode classes) after alias collapsing
    pub inode_classes: usize,
    /// Classes eliminated by unique size (Bloom pre-filter + buckets)
    pub eliminated_by_size: usize,
    /// Classes that took the two-member comparison shortcut
    pub pair_shortcut_classes: usize,
    /// Classes eliminated by unique prefix digest
    pub eliminated_by_prefix: usize,
    /// Classes whose full content was hashed
    pub fully_hashed_classes: usize,
    /// Total bytes fed through full-content hashing
    pub bytes_hashed: u64,
    /// Confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Redundant physical copies across all groups
    pub duplicate_classes: usize,
    /// Bytes reclaimable by collapsing all groups
    pub reclaimable_bytes: u64,
    /// Soft skips from probing
    pub probe_skips: Vec<ProbeError>,
    /// Soft skips from hashing
    pub hash_skips: Vec<HashError>,
    /// Read failures during verification
    pub verify_failures: Vec<VerifyError>,
    /// Duration of the whole detection run
    pub duration: Duration,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl DedupSummary {
    /// Total soft skips across all phases.
    #[must_use]
    pub fn skip_count(&self) -> usize {
        self.probe_skips.len() + self.hash_skips.len() + self.verify_failures.len()
    }
}

/// Duplicate detection pipeline.
///
/// Stateless between runs; owns a shared [`Hasher`] wired to the shutdown
/// flag.
pub struct Deduper {
    config: DedupConfig,
    hasher: Arc<Hasher>,
}

impl Deduper {
    /// Create a deduper with the given configuration.
    #[must_use]
    pub fn new(config: DedupConfig) -> Self {
        let mut hasher = Hasher::new();
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(flag.clone());
        }
        Self {
            config,
            hasher: Arc::new(hasher),
        }
    }

    /// Create a deduper with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DedupConfig::default())
    }

    /// Run the full detection pipeline over a pre-collected candidate list.
    ///
    /// Returns confirmed duplicate groups, sorted by canonical path, along
    /// with summary statistics. Soft skips never abort the run; they are
    /// recorded in the summary.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError::Interrupted`] if the shutdown flag was raised
    /// before a phase boundary.
    pub fn find_from_paths(
        &self,
        paths: Vec<PathBuf>,
    ) -> Result<(Vec<DuplicateGroup>, DedupSummary), DedupError> {
        let start = std::time::Instant::now();
        let mut summary = DedupSummary {
            candidate_paths: paths.len(),
            ..Default::default()
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_io_threads())
            .build()
            .unwrap_or_else(|_| {
                log::warn!(
                    "Failed to create custom thread pool, using global pool with {} threads",
                    rayon::current_num_threads()
                );
                rayon::ThreadPoolBuilder::new().build().unwrap()
            });

        if self.config.is_shutdown_requested() {
            return Err(DedupError::Interrupted);
        }

        // Phase: probe
        let (records, probe_stats) = crate::scanner::probe_all(
            paths,
            &pool,
            self.config.shutdown_flag.as_ref(),
            self.config.progress_callback.as_ref(),
        );
        summary.probed_files = probe_stats.probed;
        summary.probed_bytes = records.iter().map(|r| r.size).sum();
        summary.probe_skips = probe_stats.skips;
        if probe_stats.interrupted {
            summary.interrupted = true;
            return Err(DedupError::Interrupted);
        }

        // Streaming size pre-filter: discard records whose size was only
        // ever seen once. Zero-size records always pass; they are identical
        // by definition and handled as a direct group below.
        let (survivors, unique_dropped) = self.prefilter_by_size(records);

        // Phase: grouping. A record dropped by the pre-filter was the only
        // one with its size, hence a single-alias class of its own.
        let classes = group_by_inode(survivors);
        summary.inode_classes = classes.len() + unique_dropped;
        let (mut buckets, group_stats) = group_by_size(classes);
        summary.eliminated_by_size = group_stats.eliminated_unique + unique_dropped;

        log::info!(
            "Size grouping: {} buckets, {} candidate classes ({:.1}% of classes eliminated)",
            group_stats.duplicate_buckets,
            group_stats.potential_duplicates,
            group_stats.elimination_rate()
        );

        if self.config.is_shutdown_requested() {
            summary.interrupted = true;
            return Err(DedupError::Interrupted);
        }

        // Empty files: identical by size alone, no content I/O needed.
        let mut direct_groups = Vec::new();
        if let Some(empty) = buckets.remove(&0) {
            log::debug!("{} empty-file classes form one group directly", empty.len());
            direct_groups.push(DuplicateGroup::new(None, 0, empty));
        }

        // Pair shortcut: a two-class bucket is cheaper to byte-compare
        // than to hash, and it lands in verification either way.
        let mut candidates = Vec::new();
        let mut multi_buckets = Vec::new();
        for (size, members) in buckets {
            if members.len() == 2 {
                summary.pair_shortcut_classes += 2;
                candidates.push(CandidateGroup {
                    size,
                    hash: None,
                    classes: members,
                });
            } else {
                multi_buckets.push((size, members));
            }
        }
        log::info!(
            "{} classes take the pair comparison shortcut, {} buckets go to hashing",
            summary.pair_shortcut_classes,
            multi_buckets.len()
        );

        // Phase: prefix digest
        let prefix_input: usize = multi_buckets.iter().map(|(_, m)| m.len()).sum();
        let skips_before_prefix = summary.hash_skips.len();
        let prefix_survivors = self.refine_by_digest(
            multi_buckets,
            &pool,
            "prefix",
            &mut summary.hash_skips,
            |hasher, path| hasher.prefix_digest(path),
        );
        let remaining: usize = prefix_survivors.iter().map(|(_, m)| m.len()).sum();
        summary.eliminated_by_prefix = prefix_input
            .saturating_sub(remaining)
            .saturating_sub(summary.hash_skips.len() - skips_before_prefix);
        if self.config.is_shutdown_requested() {
            summary.interrupted = true;
            return Err(DedupError::Interrupted);
        }

        // Phase: full digest
        summary.fully_hashed_classes = remaining;
        summary.bytes_hashed = prefix_survivors
            .iter()
            .flat_map(|(_, m)| m.iter())
            .map(InodeClass::size)
            .sum();
        // Same-size buckets merge back together here; the full digest
        // separates them again, so nothing is lost.
        let full_input: Vec<(u64, Vec<InodeClass>)> = prefix_survivors
            .into_iter()
            .map(|((size, _), members)| (size, members))
            .collect();
        let hashed = self.refine_by_digest(
            full_input,
            &pool,
            "hashing",
            &mut summary.hash_skips,
            |hasher, path| hasher.full_digest(path),
        );
        for ((size, hash), members) in hashed {
            candidates.push(CandidateGroup {
                size,
                hash: Some(hash),
                classes: members,
            });
        }
        if self.config.is_shutdown_requested() {
            summary.interrupted = true;
            return Err(DedupError::Interrupted);
        }

        // Phase: verify
        let (mut groups, verify_stats) = verify_groups(
            candidates,
            &pool,
            self.config.shutdown_flag.as_ref(),
            self.config.progress_callback.as_ref(),
        );
        summary.verify_failures = verify_stats.read_failures;
        if verify_stats.interrupted {
            summary.interrupted = true;
            return Err(DedupError::Interrupted);
        }

        groups.extend(direct_groups);
        groups.sort_by(|a, b| {
            a.classes[0]
                .representative()
                .path
                .cmp(&b.classes[0].representative().path)
        });

        summary.duplicate_groups = groups.len();
        summary.duplicate_classes = groups.iter().map(DuplicateGroup::duplicate_count).sum();
        summary.reclaimable_bytes = groups.iter().map(DuplicateGroup::reclaimable_bytes).sum();
        summary.duration = start.elapsed();

        log::info!(
            "Detection complete: {} groups, {} redundant copies, {} bytes reclaimable, {} skips",
            summary.duplicate_groups,
            summary.duplicate_classes,
            summary.reclaimable_bytes,
            summary.skip_count()
        );

        Ok((groups, summary))
    }

    /// Drop records whose size was seen exactly once, without holding a
    /// per-size list for the unique majority. Returns the survivors and
    /// the number of records dropped.
    ///
    /// Bloom false positives only ever retain a unique-size record, which
    /// the size buckets eliminate right after; they never lose one.
    fn prefilter_by_size(&self, records: Vec<FileRecord>) -> (Vec<FileRecord>, usize) {
        let fp_rate = self.config.effective_fp_rate();
        let expected = records.len().max(16);
        let mut seen_sizes = GrowableBloom::new(fp_rate, expected);
        let mut duplicate_sizes = GrowableBloom::new(fp_rate, expected);
        let mut first_occurrences: HashMap<u64, FileRecord> = HashMap::new();
        let mut survivors = Vec::new();

        for record in records {
            if record.size == 0 {
                survivors.push(record);
                continue;
            }
            if duplicate_sizes.contains(record.size) {
                survivors.push(record);
            } else if seen_sizes.contains(record.size) {
                duplicate_sizes.insert(record.size);
                if let Some(first) = first_occurrences.remove(&record.size) {
                    survivors.push(first);
                }
                survivors.push(record);
            } else {
                seen_sizes.insert(record.size);
                first_occurrences.insert(record.size, record);
            }
        }

        let dropped = first_occurrences.len();
        log::debug!(
            "Size pre-filter: {} records survive, {} dropped as unique",
            survivors.len(),
            dropped
        );

        (survivors, dropped)
    }

    /// Refine size-keyed buckets by a per-class digest, dropping classes
    /// whose digest is unique within their bucket.
    ///
    /// Returns buckets keyed by (size, digest) with 2+ members. Digest
    /// failures are soft: the class is excluded and the failure recorded.
    fn refine_by_digest<F>(
        &self,
        buckets: Vec<(u64, Vec<InodeClass>)>,
        pool: &rayon::ThreadPool,
        phase: &str,
        skips: &mut Vec<HashError>,
        digest: F,
    ) -> Vec<((u64, Hash), Vec<InodeClass>)>
    where
        F: Fn(&Hasher, &std::path::Path) -> Result<Hash, HashError> + Sync,
    {
        let total: usize = buckets.iter().map(|(_, m)| m.len()).sum();
        if total == 0 {
            return Vec::new();
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase, total);
        }
        log::info!("Computing {} digests for {} classes", phase, total);

        let flat: Vec<(u64, InodeClass)> = buckets
            .into_iter()
            .flat_map(|(size, members)| members.into_iter().map(move |m| (size, m)))
            .collect();

        let hasher = Arc::clone(&self.hasher);
        let shutdown = self.config.shutdown_flag.clone();
        let progress = self.config.progress_callback.clone();

        let results: Vec<(u64, InodeClass, Result<Hash, HashError>)> = pool.install(|| {
            flat.into_par_iter()
                .enumerate()
                .filter_map(|(idx, (size, class))| {
                    if shutdown
                        .as_ref()
                        .is_some_and(|f| f.load(Ordering::SeqCst))
                    {
                        return None;
                    }
                    let path = &class.representative().path;
                    if let Some(ref callback) = progress {
                        callback.on_progress(idx + 1, path.to_string_lossy().as_ref());
                    }
                    let result = digest(&hasher, path);
                    if result.is_ok() {
                        if let Some(ref callback) = progress {
                            callback.on_item_completed(size);
                        }
                    }
                    Some((size, class, result))
                })
                .collect()
        });

        let mut refined: HashMap<(u64, Hash), Vec<InodeClass>> = HashMap::new();
        for (size, class, result) in results {
            match result {
                Ok(hash) => refined.entry((size, hash)).or_default().push(class),
                Err(e) => {
                    log::warn!("Digest failed, excluding class: {}", e);
                    skips.push(e);
                }
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase);
        }

        refined
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn find(paths: Vec<PathBuf>) -> (Vec<DuplicateGroup>, DedupSummary) {
        Deduper::with_defaults().find_from_paths(paths).unwrap()
    }

    #[test]
    fn test_two_identical_one_distinct() {
        let dir = TempDir::new().unwrap();
        let content_x = vec![7u8; 1024];
        let mut content_y = content_x.clone();
        content_y[512] = 8;

        let a = write_file(&dir, "a", &content_x);
        let b = write_file(&dir, "b", &content_x);
        let c = write_file(&dir, "c", &content_y);

        let (groups, summary) = find(vec![a.clone(), b.clone(), c]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].size, 1024);
        assert_eq!(summary.reclaimable_bytes, 1024);
        let mut paths = groups[0].paths();
        paths.sort();
        assert_eq!(paths, vec![a, b]);
    }

    #[test]
    fn test_no_duplicates_found() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a", b"one");
        let b = write_file(&dir, "b", b"two-longer");

        let (groups, summary) = find(vec![a, b]);
        assert!(groups.is_empty());
        assert_eq!(summary.duplicate_groups, 0);
    }

    #[test]
    fn test_same_size_different_content_not_grouped() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a", b"aaaa");
        let b = write_file(&dir, "b", b"bbbb");

        let (groups, _) = find(vec![a, b]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_three_identical_one_group() {
        let dir = TempDir::new().unwrap();
        let content = vec![3u8; 5000];
        let paths = vec![
            write_file(&dir, "a", &content),
            write_file(&dir, "b", &content),
            write_file(&dir, "c", &content),
        ];

        let (groups, summary) = find(paths);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
        // Three classes go through prefix+full hashing, not the shortcut.
        assert_eq!(summary.pair_shortcut_classes, 0);
        assert!(groups[0].hash.is_some());
        assert_eq!(summary.reclaimable_bytes, 10_000);
    }

    #[test]
    fn test_pair_takes_shortcut_without_hashing() {
        let dir = TempDir::new().unwrap();
        let content = b"pair content";
        let paths = vec![
            write_file(&dir, "a", content),
            write_file(&dir, "b", content),
        ];

        let (groups, summary) = find(paths);
        assert_eq!(groups.len(), 1);
        assert_eq!(summary.pair_shortcut_classes, 2);
        assert_eq!(summary.fully_hashed_classes, 0);
        // Shortcut groups carry no digest.
        assert!(groups[0].hash.is_none());
    }

    #[test]
    fn test_empty_files_grouped_without_io() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_file(&dir, "a", b""),
            write_file(&dir, "b", b""),
            write_file(&dir, "c", b""),
        ];

        let (groups, summary) = find(paths);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].size, 0);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(summary.reclaimable_bytes, 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_hardlinked_aliases_are_one_class() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a", b"linked content");
        let alias = dir.path().join("alias");
        fs::hard_link(&a, &alias).unwrap();
        let b = write_file(&dir, "b", b"linked content");

        let (groups, summary) = find(vec![a, alias, b]);

        // Two physical files, not three.
        assert_eq!(summary.inode_classes, 2);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].paths().len(), 3);
    }

    #[test]
    #[cfg(unix)]
    fn test_fully_linked_pair_is_no_duplicate() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a", b"content");
        let alias = dir.path().join("alias");
        fs::hard_link(&a, &alias).unwrap();

        let (groups, summary) = find(vec![a, alias]);
        assert!(groups.is_empty());
        assert_eq!(summary.inode_classes, 1);
    }

    #[test]
    fn test_vanished_candidate_is_soft_skip() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a", b"data");
        let missing = dir.path().join("missing");

        let (groups, summary) = find(vec![a, missing]);
        assert!(groups.is_empty());
        assert_eq!(summary.probe_skips.len(), 1);
    }

    #[test]
    fn test_interrupted_before_start() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a", b"data");

        let flag = Arc::new(AtomicBool::new(true));
        let deduper = Deduper::new(DedupConfig::default().with_shutdown_flag(flag));
        let err = deduper.find_from_paths(vec![a]).unwrap_err();
        assert!(matches!(err, DedupError::Interrupted));
    }

    #[test]
    fn test_mixed_content_same_size_multi_bucket() {
        // Four files, one size, two contents: prefix+hash splits them.
        let dir = TempDir::new().unwrap();
        let mut x = vec![1u8; 8192];
        let y = x.clone();
        x[8000] = 2;
        let paths = vec![
            write_file(&dir, "x1", &x),
            write_file(&dir, "x2", &x),
            write_file(&dir, "y1", &y),
            write_file(&dir, "y2", &y),
        ];

        let (groups, _) = find(paths);
        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert_eq!(group.len(), 2);
        }
    }
}
