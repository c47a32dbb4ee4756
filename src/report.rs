//! Transformation report: the structured outcome of a run.
//!
//! # Overview
//!
//! Every run (dry or real, complete or interrupted) produces a
//! [`TransformationReport`] enumerating what happened to each target path
//! and why. Nothing is ever skipped silently: a rejected or failed link
//! appears here with its reason, and the original file is guaranteed to be
//! intact.
//!
//! The report is plain serde-serializable data; rendering lives in
//! [`crate::output`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::DedupSummary;

/// Reason a target was skipped without being linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Target resides on a different device than the canonical; hard
    /// links cannot cross filesystem boundaries.
    CrossDevice,
    /// Target already shares the canonical's inode; nothing to do.
    AlreadyLinked,
    /// Target vanished between detection and execution.
    Vanished,
    /// Target changed (inode, size or mtime) since it was verified;
    /// linking over it could destroy new content.
    Modified,
    /// The canonical itself vanished or changed; the whole group was
    /// left untouched.
    CanonicalChanged,
    /// A shutdown request stopped the run before this target.
    Interrupted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CrossDevice => "cross-device",
            Self::AlreadyLinked => "already-linked",
            Self::Vanished => "vanished",
            Self::Modified => "modified",
            Self::CanonicalChanged => "canonical-changed",
            Self::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// What happened to one target path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    /// Target was replaced by a hard link to the canonical.
    Linked,
    /// Dry run: target would be replaced.
    WouldLink,
    /// Target was deliberately not touched.
    Skipped {
        /// Why the target was skipped
        reason: SkipReason,
    },
    /// The link operation failed; the target is untouched (any temp
    /// artifact was removed).
    Failed {
        /// Underlying failure description
        error: String,
    },
}

impl TargetOutcome {
    /// Whether the outcome counts as a created link.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::Linked)
    }

    /// Whether the outcome is a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the outcome is a skip.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Outcome for one target path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    /// The path that was (or would have been) replaced
    pub path: PathBuf,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

/// Per-group outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReport {
    /// Canonical path every member links to
    pub canonical: PathBuf,
    /// Member size in bytes
    pub size: u64,
    /// Full-content digest (hex), when one was computed
    pub hash: Option<String>,
    /// Outcome per target path
    pub targets: Vec<TargetReport>,
    /// Bytes actually reclaimed for this group (a redundant physical
    /// copy counts once it has no remaining path referring to it)
    pub reclaimed_bytes: u64,
}

impl GroupReport {
    /// Number of links created in this group.
    #[must_use]
    pub fn linked_count(&self) -> usize {
        self.targets.iter().filter(|t| t.outcome.is_linked()).count()
    }
}

/// A file excluded from the run before planning, with its reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftSkip {
    /// Path that was skipped
    pub path: PathBuf,
    /// Human-readable reason
    pub reason: String,
}

/// Structured outcome of a complete run.
///
/// # Output Schema
///
/// ```json
/// {
///   "generated_at": "2026-01-01T00:00:00Z",
///   "dry_run": false,
///   "groups": [
///     {
///       "canonical": "/data/a",
///       "size": 1024,
///       "hash": "abc123...",
///       "targets": [
///         { "path": "/data/b", "status": "linked" },
///         { "path": "/mnt/c", "status": "skipped", "reason": "cross_device" }
///       ],
///       "reclaimed_bytes": 1024
///     }
///   ],
///   "summary": {
///     "candidate_paths": 100,
///     "duplicate_groups": 1,
///     "links_created": 1,
///     "bytes_reclaimed": 1024,
///     "targets_skipped": 1,
///     "targets_failed": 0,
///     "interrupted": false
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationReport {
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Whether this was a dry run (nothing was mutated)
    pub dry_run: bool,
    /// Per-group outcomes
    pub groups: Vec<GroupReport>,
    /// Aggregate numbers
    pub summary: ReportSummary,
    /// Files excluded before planning, with reasons
    pub soft_skips: Vec<SoftSkip>,
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Candidate paths received
    pub candidate_paths: usize,
    /// Files successfully probed
    pub probed_files: usize,
    /// Physical files after alias collapsing
    pub inode_classes: usize,
    /// Confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Link operations planned (dry and real runs alike)
    pub links_planned: usize,
    /// Links actually created (always zero on a dry run)
    pub links_created: usize,
    /// Bytes reclaimed (estimated on a dry run)
    pub bytes_reclaimed: u64,
    /// Targets skipped with a reason
    pub targets_skipped: usize,
    /// Targets that failed mid-operation
    pub targets_failed: usize,
    /// Detection duration in milliseconds
    pub detection_ms: u64,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl TransformationReport {
    /// Assemble a report from per-group results and the detection summary.
    #[must_use]
    pub fn new(dry_run: bool, groups: Vec<GroupReport>, detection: &DedupSummary) -> Self {
        let mut summary = ReportSummary {
            candidate_paths: detection.candidate_paths,
            probed_files: detection.probed_files,
            inode_classes: detection.inode_classes,
            duplicate_groups: detection.duplicate_groups,
            detection_ms: detection.duration.as_millis() as u64,
            interrupted: detection.interrupted,
            ..Default::default()
        };

        for group in &groups {
            summary.bytes_reclaimed += group.reclaimed_bytes;
            for target in &group.targets {
                match &target.outcome {
                    TargetOutcome::Linked => {
                        summary.links_planned += 1;
                        summary.links_created += 1;
                    }
                    TargetOutcome::WouldLink => summary.links_planned += 1,
                    TargetOutcome::Skipped { reason } => {
                        summary.targets_skipped += 1;
                        if *reason == SkipReason::Interrupted {
                            summary.interrupted = true;
                        }
                    }
                    TargetOutcome::Failed { .. } => summary.targets_failed += 1,
                }
            }
        }

        let soft_skips = detection
            .probe_skips
            .iter()
            .map(|e| SoftSkip {
                path: e.path().to_path_buf(),
                reason: e.to_string(),
            })
            .chain(detection.hash_skips.iter().map(|e| SoftSkip {
                path: e.path().to_path_buf(),
                reason: e.to_string(),
            }))
            .chain(detection.verify_failures.iter().map(|e| SoftSkip {
                path: e.path().to_path_buf(),
                reason: e.to_string(),
            }))
            .collect();

        Self {
            generated_at: Utc::now(),
            dry_run,
            groups,
            summary,
            soft_skips,
        }
    }

    /// Whether anything went wrong that the caller should surface via the
    /// partial-success exit code.
    #[must_use]
    pub fn has_incidents(&self) -> bool {
        self.summary.targets_failed > 0
            || self.summary.targets_skipped > 0
            || !self.soft_skips.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked(path: &str) -> TargetReport {
        TargetReport {
            path: PathBuf::from(path),
            outcome: TargetOutcome::Linked,
        }
    }

    #[test]
    fn test_summary_tallies() {
        let groups = vec![GroupReport {
            canonical: PathBuf::from("/a"),
            size: 1024,
            hash: None,
            targets: vec![
                linked("/b"),
                TargetReport {
                    path: PathBuf::from("/c"),
                    outcome: TargetOutcome::Skipped {
                        reason: SkipReason::CrossDevice,
                    },
                },
                TargetReport {
                    path: PathBuf::from("/d"),
                    outcome: TargetOutcome::Failed {
                        error: "permission denied".into(),
                    },
                },
            ],
            reclaimed_bytes: 1024,
        }];

        let report = TransformationReport::new(false, groups, &DedupSummary::default());

        assert_eq!(report.summary.links_created, 1);
        assert_eq!(report.summary.links_planned, 1);
        assert_eq!(report.summary.targets_skipped, 1);
        assert_eq!(report.summary.targets_failed, 1);
        assert_eq!(report.summary.bytes_reclaimed, 1024);
        assert!(report.has_incidents());
    }

    #[test]
    fn test_clean_run_has_no_incidents() {
        let groups = vec![GroupReport {
            canonical: PathBuf::from("/a"),
            size: 10,
            hash: None,
            targets: vec![linked("/b")],
            reclaimed_bytes: 10,
        }];
        let report = TransformationReport::new(false, groups, &DedupSummary::default());
        assert!(!report.has_incidents());
    }

    #[test]
    fn test_skip_reason_serializes_snake_case() {
        let json = serde_json::to_string(&SkipReason::CrossDevice).unwrap();
        assert_eq!(json, "\"cross_device\"");
    }

    #[test]
    fn test_target_outcome_tagged_serialization() {
        let outcome = TargetOutcome::Skipped {
            reason: SkipReason::AlreadyLinked,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "already_linked");

        let linked = serde_json::to_value(TargetOutcome::Linked).unwrap();
        assert_eq!(linked["status"], "linked");
    }

    #[test]
    fn test_interrupted_skip_marks_report() {
        let groups = vec![GroupReport {
            canonical: PathBuf::from("/a"),
            size: 10,
            hash: None,
            targets: vec![TargetReport {
                path: PathBuf::from("/b"),
                outcome: TargetOutcome::Skipped {
                    reason: SkipReason::Interrupted,
                },
            }],
            reclaimed_bytes: 0,
        }];
        let report = TransformationReport::new(false, groups, &DedupSummary::default());
        assert!(report.summary.interrupted);
    }
}
