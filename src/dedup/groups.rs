//! Inode and size grouping, and the verified duplicate group type.
//!
//! # Overview
//!
//! Grouping narrows the candidate set in two pure, order-insensitive
//! partitions before any content I/O happens:
//!
//! 1. **Inode grouping** collapses paths sharing (device, inode) into one
//!    [`InodeClass`]: those paths are already hard links to each other and
//!    re-linking them would be a no-op at best. Every later stage operates
//!    on physical files, not paths.
//! 2. **Size grouping** buckets classes by exact size. Classes with a
//!    unique size cannot have a duplicate and are discarded instantly,
//!    typically eliminating the large majority of candidates.
//!
//! # Example
//!
//! ```
//! use lndupe::dedup::{group_by_inode, group_by_size};
//! use lndupe::scanner::{FileRecord, InodeId};
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let record = |p: &str, ino: u64, size: u64| {
//!     FileRecord::new(
//!         PathBuf::from(p),
//!         size,
//!         InodeId { device: 1, inode: ino },
//!         SystemTime::now(),
//!     )
//! };
//!
//! let classes = group_by_inode(vec![
//!     record("/a", 1, 100),
//!     record("/b", 2, 100),
//!     record("/c", 3, 200),
//! ]);
//! let (buckets, stats) = group_by_size(classes);
//!
//! assert_eq!(buckets.len(), 1);          // only the 100-byte bucket survives
//! assert_eq!(stats.eliminated_unique, 1); // the 200-byte class
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::scanner::{hash_to_hex, FileRecord, Hash, InodeId};

/// All paths observed for one physical file.
///
/// Records are kept sorted by path, so [`InodeClass::representative`] is
/// deterministic: the lexicographically smallest alias. All content I/O
/// for the class goes through the representative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InodeClass {
    /// Physical identity shared by every record
    pub id: InodeId,
    /// Alias paths, sorted by path
    pub records: Vec<FileRecord>,
}

impl InodeClass {
    /// Create a class from records known to share an inode identity.
    ///
    /// # Panics
    ///
    /// Debug assertion fails if records disagree on identity.
    #[must_use]
    pub fn new(id: InodeId, mut records: Vec<FileRecord>) -> Self {
        debug_assert!(records.iter().all(|r| r.inode == id));
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Self { id, records }
    }

    /// The record used for all reads on behalf of this class.
    ///
    /// # Panics
    ///
    /// Panics if the class is empty; classes are always built non-empty.
    #[must_use]
    pub fn representative(&self) -> &FileRecord {
        &self.records[0]
    }

    /// Size shared by every alias.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.representative().size
    }

    /// Number of alias paths.
    #[must_use]
    pub fn alias_count(&self) -> usize {
        self.records.len()
    }
}

/// Collapse records into inode classes.
///
/// Pure partition; input order does not affect the result. Classes are
/// returned sorted by representative path for deterministic downstream
/// processing.
#[must_use]
pub fn group_by_inode(records: Vec<FileRecord>) -> Vec<InodeClass> {
    let mut by_inode: HashMap<InodeId, Vec<FileRecord>> = HashMap::new();
    for record in records {
        by_inode.entry(record.inode).or_default().push(record);
    }

    let mut classes: Vec<InodeClass> = by_inode
        .into_iter()
        .map(|(id, records)| InodeClass::new(id, records))
        .collect();
    classes.sort_by(|a, b| a.representative().path.cmp(&b.representative().path));

    log::info!(
        "Inode classes: {} (groups of paths sharing the same physical file)",
        classes.len()
    );

    classes
}

/// Statistics from the size grouping phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Inode classes processed
    pub total_classes: usize,
    /// Number of distinct sizes observed
    pub unique_sizes: usize,
    /// Classes eliminated because their size was unique
    pub eliminated_unique: usize,
    /// Classes remaining in multi-member buckets
    pub potential_duplicates: usize,
    /// Buckets with 2+ classes
    pub duplicate_buckets: usize,
    /// Zero-byte classes observed (they bypass fingerprinting)
    pub empty_classes: usize,
}

impl GroupingStats {
    /// Percentage of classes eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_classes == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_classes as f64) * 100.0
        }
    }
}

/// Bucket inode classes by exact size, dropping singleton buckets.
///
/// The zero-size bucket is kept like any other when it has 2+ classes;
/// the pipeline forms a duplicate group from it directly since empty files
/// are identical by definition.
#[must_use]
pub fn group_by_size(
    classes: impl IntoIterator<Item = InodeClass>,
) -> (HashMap<u64, Vec<InodeClass>>, GroupingStats) {
    let mut buckets: HashMap<u64, Vec<InodeClass>> = HashMap::new();
    let mut stats = GroupingStats::default();

    for class in classes {
        stats.total_classes += 1;
        if class.size() == 0 {
            stats.empty_classes += 1;
        }
        buckets.entry(class.size()).or_default().push(class);
    }

    stats.unique_sizes = buckets.len();

    let filtered: HashMap<u64, Vec<InodeClass>> = buckets
        .into_iter()
        .filter(|(size, members)| {
            if members.len() == 1 {
                stats.eliminated_unique += 1;
                log::trace!(
                    "Eliminated unique size {}: {}",
                    size,
                    members[0].representative().path.display()
                );
                false
            } else {
                stats.potential_duplicates += members.len();
                stats.duplicate_buckets += 1;
                log::debug!(
                    "Size bucket {} bytes: {} candidate classes",
                    size,
                    members.len()
                );
                true
            }
        })
        .collect();

    (filtered, stats)
}

/// Verified group of byte-identical physical files.
///
/// Invariants: at least two classes, all the same size, contents confirmed
/// equal by the byte verifier (or trivially equal: zero-size). The hash is
/// absent for groups that never went through full-content hashing (empty
/// files and pair buckets that took the comparison shortcut).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Full-content BLAKE3 digest, when one was computed
    pub hash: Option<Hash>,
    /// Size in bytes shared by every member
    pub size: u64,
    /// Member classes, sorted by representative path
    pub classes: Vec<InodeClass>,
}

impl DuplicateGroup {
    /// Create a group from verified classes.
    #[must_use]
    pub fn new(hash: Option<Hash>, size: u64, mut classes: Vec<InodeClass>) -> Self {
        classes.sort_by(|a, b| a.representative().path.cmp(&b.representative().path));
        Self {
            hash,
            size,
            classes,
        }
    }

    /// Number of member classes (physical files).
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Number of redundant physical copies (classes minus the canonical).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.classes.len().saturating_sub(1)
    }

    /// Disk space reclaimable by collapsing the group (bytes).
    ///
    /// One data block survives per group; every other class frees its
    /// block. Alias paths within a class share storage already and add
    /// nothing.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// All member paths across all classes.
    #[must_use]
    pub fn paths(&self) -> Vec<std::path::PathBuf> {
        self.classes
            .iter()
            .flat_map(|c| c.records.iter().map(|r| r.path.clone()))
            .collect()
    }

    /// Hash as hexadecimal string, when present.
    #[must_use]
    pub fn hash_hex(&self) -> Option<String> {
        self.hash.as_ref().map(hash_to_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn record(path: &str, device: u64, inode: u64, size: u64) -> FileRecord {
        FileRecord::new(
            PathBuf::from(path),
            size,
            InodeId { device, inode },
            SystemTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn test_group_by_inode_collapses_aliases() {
        let classes = group_by_inode(vec![
            record("/b", 1, 10, 100),
            record("/a", 1, 10, 100),
            record("/c", 1, 11, 100),
        ]);

        assert_eq!(classes.len(), 2);
        let alias_class = classes.iter().find(|c| c.id.inode == 10).unwrap();
        assert_eq!(alias_class.alias_count(), 2);
        // Representative is the lexicographically smallest alias.
        assert_eq!(alias_class.representative().path, PathBuf::from("/a"));
    }

    #[test]
    fn test_group_by_inode_distinguishes_devices() {
        let classes = group_by_inode(vec![
            record("/x", 1, 10, 100),
            record("/y", 2, 10, 100),
        ]);
        assert_eq!(classes.len(), 2);
    }

    #[test]
    fn test_group_by_size_drops_singletons() {
        let classes = group_by_inode(vec![
            record("/a", 1, 1, 100),
            record("/b", 1, 2, 100),
            record("/c", 1, 3, 200),
        ]);
        let (buckets, stats) = group_by_size(classes);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&100].len(), 2);
        assert_eq!(stats.total_classes, 3);
        assert_eq!(stats.eliminated_unique, 1);
        assert_eq!(stats.potential_duplicates, 2);
        assert_eq!(stats.duplicate_buckets, 1);
    }

    #[test]
    fn test_group_by_size_keeps_empty_bucket() {
        let classes = group_by_inode(vec![
            record("/a", 1, 1, 0),
            record("/b", 1, 2, 0),
        ]);
        let (buckets, stats) = group_by_size(classes);

        assert_eq!(buckets[&0].len(), 2);
        assert_eq!(stats.empty_classes, 2);
    }

    #[test]
    fn test_grouping_order_insensitive() {
        let forward = vec![
            record("/a", 1, 1, 50),
            record("/b", 1, 2, 50),
            record("/c", 1, 3, 60),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let (buckets_f, stats_f) = group_by_size(group_by_inode(forward));
        let (buckets_r, stats_r) = group_by_size(group_by_inode(reversed));

        assert_eq!(stats_f, stats_r);
        assert_eq!(buckets_f.len(), buckets_r.len());
        let paths = |b: &HashMap<u64, Vec<InodeClass>>| -> Vec<PathBuf> {
            b[&50]
                .iter()
                .map(|c| c.representative().path.clone())
                .collect()
        };
        assert_eq!(paths(&buckets_f), paths(&buckets_r));
    }

    #[test]
    fn test_duplicate_group_accounting() {
        let classes = group_by_inode(vec![
            record("/a", 1, 1, 1024),
            record("/b", 1, 2, 1024),
            record("/c", 1, 3, 1024),
        ]);
        let group = DuplicateGroup::new(Some([0u8; 32]), 1024, classes);

        assert_eq!(group.len(), 3);
        assert_eq!(group.duplicate_count(), 2);
        assert_eq!(group.reclaimable_bytes(), 2048);
        assert_eq!(group.paths().len(), 3);
        assert_eq!(group.hash_hex().unwrap().len(), 64);
    }

    #[test]
    fn test_alias_paths_do_not_inflate_reclaimable() {
        // Two classes, one with two aliases: still only one redundant block.
        let classes = group_by_inode(vec![
            record("/a", 1, 1, 1024),
            record("/a2", 1, 1, 1024),
            record("/b", 1, 2, 1024),
        ]);
        let group = DuplicateGroup::new(None, 1024, classes);

        assert_eq!(group.len(), 2);
        assert_eq!(group.reclaimable_bytes(), 1024);
        assert_eq!(group.paths().len(), 3);
    }
}
