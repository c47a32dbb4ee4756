//! Link planning: turn verified groups into an executable plan.
//!
//! # Overview
//!
//! Planning is a pure function of the verified duplicate groups, with no
//! filesystem access and no side effects. That is what makes dry runs exact:
//! the preview is the same plan a real run would execute.
//!
//! Canonical selection is deterministic: the class whose smallest alias
//! path sorts first in the group keeps its data; every alias path of every
//! other class becomes a link target. Repeated runs therefore always pick
//! the same survivor, and a collapsed group produces no further plan.
//!
//! Two rejections happen at planning time because they are visible in the
//! probed metadata already:
//! - **cross-device**: the target class lives on a different device than
//!   the canonical; hard links cannot span devices
//! - **already-linked**: the target class shares the canonical's inode
//!   (possible when a caller assembles groups by hand; the pipeline's
//!   inode grouping normally rules it out)

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::dedup::DuplicateGroup;
use crate::report::SkipReason;
use crate::scanner::{FileRecord, Hash, InodeId};

/// One link operation: replace `target` with a hard link to `source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedLink {
    /// Canonical path the link will point to
    pub source: PathBuf,
    /// Path to be replaced
    pub target: PathBuf,
    /// Target's identity as probed; re-checked before mutation
    pub target_inode: InodeId,
    /// Target's mtime as probed; re-checked before mutation
    pub target_modified: SystemTime,
}

/// A target rejected at planning time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedTarget {
    /// Path that will not be linked
    pub path: PathBuf,
    /// Why
    pub reason: SkipReason,
}

/// Plan for one duplicate group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPlan {
    /// The record every target will link to
    pub canonical: FileRecord,
    /// Member size in bytes
    pub size: u64,
    /// Full-content digest, when one was computed
    pub hash: Option<Hash>,
    /// Link operations, in deterministic path order
    pub links: Vec<PlannedLink>,
    /// Targets rejected at planning time
    pub rejected: Vec<RejectedTarget>,
}

impl GroupPlan {
    /// Bytes this group would reclaim if every planned link succeeds.
    ///
    /// A redundant physical copy is freed only when all of its alias
    /// paths are re-linked; classes with rejected paths reclaim nothing.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        let freed: std::collections::HashSet<InodeId> =
            self.links.iter().map(|l| l.target_inode).collect();
        self.size * freed.len() as u64
    }
}

/// Complete link plan for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkPlan {
    /// Per-group plans, in canonical path order
    pub groups: Vec<GroupPlan>,
}

impl LinkPlan {
    /// Total link operations planned.
    #[must_use]
    pub fn planned_links(&self) -> usize {
        self.groups.iter().map(|g| g.links.len()).sum()
    }

    /// Total targets rejected at planning time.
    #[must_use]
    pub fn rejected_targets(&self) -> usize {
        self.groups.iter().map(|g| g.rejected.len()).sum()
    }

    /// Bytes reclaimable if every planned link succeeds.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.iter().map(GroupPlan::reclaimable_bytes).sum()
    }

    /// Check if the plan contains no work at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Plan link operations for verified duplicate groups.
///
/// Pure: reads nothing from the filesystem. Groups that plan no links and
/// no rejections are omitted.
#[must_use]
pub fn plan_links(groups: &[DuplicateGroup]) -> LinkPlan {
    let mut plan = LinkPlan::default();

    for group in groups {
        if group.len() < 2 {
            continue;
        }

        // Classes arrive sorted by representative path; the first is the
        // canonical. Its own aliases are left untouched.
        let canonical = group.classes[0].representative().clone();
        let mut group_plan = GroupPlan {
            canonical: canonical.clone(),
            size: group.size,
            hash: group.hash,
            links: Vec::new(),
            rejected: Vec::new(),
        };

        for class in &group.classes[1..] {
            if class.id == canonical.inode {
                for record in &class.records {
                    group_plan.rejected.push(RejectedTarget {
                        path: record.path.clone(),
                        reason: SkipReason::AlreadyLinked,
                    });
                }
                continue;
            }
            if class.id.device != canonical.inode.device {
                log::debug!(
                    "Cross-device group member, not linking: {} (device {} vs {})",
                    class.representative().path.display(),
                    class.id.device,
                    canonical.inode.device
                );
                for record in &class.records {
                    group_plan.rejected.push(RejectedTarget {
                        path: record.path.clone(),
                        reason: SkipReason::CrossDevice,
                    });
                }
                continue;
            }
            for record in &class.records {
                group_plan.links.push(PlannedLink {
                    source: canonical.path.clone(),
                    target: record.path.clone(),
                    target_inode: record.inode,
                    target_modified: record.modified,
                });
            }
        }

        if !group_plan.links.is_empty() || !group_plan.rejected.is_empty() {
            plan.groups.push(group_plan);
        }
    }

    log::info!(
        "Planned {} links across {} groups ({} targets rejected)",
        plan.planned_links(),
        plan.groups.len(),
        plan.rejected_targets()
    );

    plan
}
