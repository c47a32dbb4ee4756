//! Duplicate detection: grouping, refinement, verification.

pub mod finder;
pub mod groups;
pub mod verify;

pub use finder::{DedupConfig, DedupError, DedupSummary, Deduper};
pub use groups::{group_by_inode, group_by_size, DuplicateGroup, GroupingStats, InodeClass};
pub use verify::{files_equal, verify_groups, CandidateGroup, VerifyError};
