//! Link execution: atomic replacement of targets by hard links.
//!
//! # Overview
//!
//! Every replacement follows the same state machine:
//!
//! ```text
//! PLANNED -> TEMP_LINK_CREATED -> RENAMED            (success)
//! PLANNED -> FAILED                                  (no filesystem mutation)
//! TEMP_LINK_CREATED -> FAILED_CLEANED                (temp removed, target untouched)
//! ```
//!
//! The hard link is first created at a temporary name beside the target,
//! then renamed over it. Rename is atomic on POSIX filesystems, so at
//! every observable instant the target path resolves to a complete file,
//! the original or the deduplicated one, never a hole. A crash between
//! the two steps leaves only the temp artifact, which the next run removes
//! before retrying (its name is deterministic).
//!
//! # Safety checks
//!
//! Detection and execution race against concurrent filesystem changes, so
//! the executor re-stats before mutating:
//! - the canonical must still match its probed identity and size, or the
//!   whole group is skipped;
//! - each target must still match its probed identity, size and mtime, or
//!   that target is skipped; linking over a file that changed since
//!   verification would destroy its new content.
//!
//! One failure never aborts the run; the remaining targets proceed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::plan::{GroupPlan, LinkPlan, PlannedLink};
use crate::progress::ProgressCallback;
use crate::report::{GroupReport, SkipReason, TargetOutcome, TargetReport};
use crate::scanner::{hash_to_hex, InodeId};

/// Suffix of the temporary link created beside each target.
const TMP_SUFFIX: &str = ".lndupe-tmp";

/// Configuration for link execution.
#[derive(Clone, Default)]
pub struct ExecutorConfig {
    /// Number of threads for parallel group execution. Zero means the
    /// default of 4.
    pub io_threads: usize,
    /// Optional shutdown flag for graceful termination. Observed between
    /// link operations; an in-flight temp-create/rename always completes.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("io_threads", &self.io_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ExecutorConfig {
    /// Set the thread count for parallel group execution.
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
}

/// Execute a link plan.
///
/// Groups run in parallel: they touch disjoint paths, and the canonical
/// of each group is owned by exactly one worker for the duration of its
/// group. Targets within a group run sequentially.
///
/// Returns one [`GroupReport`] per group plan, in plan order.
#[must_use]
pub fn execute_plan(plan: LinkPlan, config: &ExecutorConfig) -> Vec<GroupReport> {
    if plan.is_empty() {
        return Vec::new();
    }

    let total_links = plan.planned_links();
    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start("linking", total_links);
    }
    log::info!(
        "Executing {} link operations across {} groups",
        total_links,
        plan.groups.len()
    );

    let threads = if config.io_threads == 0 {
        4
    } else {
        config.io_threads
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap_or_else(|_| {
            log::warn!(
                "Failed to create custom thread pool, using global pool with {} threads",
                rayon::current_num_threads()
            );
            rayon::ThreadPoolBuilder::new().build().unwrap()
        });

    let done = AtomicUsize::new(0);
    let reports: Vec<GroupReport> = pool.install(|| {
        plan.groups
            .into_par_iter()
            .map(|group| {
                let planned = group.links.len();
                let report = execute_group(group, config.shutdown_flag.as_deref());
                let finished = done.fetch_add(planned, Ordering::Relaxed) + planned;
                if let Some(ref callback) = config.progress_callback {
                    callback.on_progress(finished, report.canonical.to_string_lossy().as_ref());
                }
                report
            })
            .collect()
    });

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end("linking");
    }

    let linked: usize = reports.iter().map(GroupReport::linked_count).sum();
    log::info!("Linking complete: {} of {} targets linked", linked, total_links);

    reports
}

/// Render a plan as a report without touching the filesystem (dry run).
#[must_use]
pub fn preview_plan(plan: &LinkPlan) -> Vec<GroupReport> {
    plan.groups
        .iter()
        .map(|group| {
            let mut targets: Vec<TargetReport> = group
                .links
                .iter()
                .map(|link| TargetReport {
                    path: link.target.clone(),
                    outcome: TargetOutcome::WouldLink,
                })
                .collect();
            targets.extend(group.rejected.iter().map(|r| TargetReport {
                path: r.path.clone(),
                outcome: TargetOutcome::Skipped { reason: r.reason },
            }));
            GroupReport {
                canonical: group.canonical.path.clone(),
                size: group.size,
                hash: group.hash.as_ref().map(hash_to_hex),
                targets,
                reclaimed_bytes: group.reclaimable_bytes(),
            }
        })
        .collect()
}

fn execute_group(group: GroupPlan, shutdown: Option<&AtomicBool>) -> GroupReport {
    let GroupPlan {
        canonical,
        size,
        hash,
        links,
        rejected,
    } = group;

    let mut targets: Vec<TargetReport> = rejected
        .into_iter()
        .map(|r| TargetReport {
            path: r.path,
            outcome: TargetOutcome::Skipped { reason: r.reason },
        })
        .collect();

    // The canonical must still be the file that was verified. If it
    // vanished or was replaced, nothing in this group is safe to link.
    let canonical_ok = match std::fs::symlink_metadata(&canonical.path) {
        Ok(meta) => {
            InodeId::from_metadata(&meta) == Some(canonical.inode) && meta.len() == size
        }
        Err(_) => false,
    };
    if !canonical_ok {
        log::warn!(
            "Canonical changed or vanished, skipping group: {}",
            canonical.path.display()
        );
        targets.extend(links.into_iter().map(|link| TargetReport {
            path: link.target,
            outcome: TargetOutcome::Skipped {
                reason: SkipReason::CanonicalChanged,
            },
        }));
        return GroupReport {
            canonical: canonical.path,
            size,
            hash: hash.as_ref().map(hash_to_hex),
            targets,
            reclaimed_bytes: 0,
        };
    }

    let mut outcomes_by_inode: HashMap<InodeId, Vec<bool>> = HashMap::new();
    let mut interrupted = false;

    for link in links {
        if interrupted || shutdown.is_some_and(|f| f.load(Ordering::SeqCst)) {
            interrupted = true;
            targets.push(TargetReport {
                path: link.target,
                outcome: TargetOutcome::Skipped {
                    reason: SkipReason::Interrupted,
                },
            });
            continue;
        }

        let inode = link.target_inode;
        let outcome = execute_link(&canonical.path, canonical.inode, size, &link);
        outcomes_by_inode
            .entry(inode)
            .or_default()
            .push(outcome.is_linked());
        targets.push(TargetReport {
            path: link.target,
            outcome,
        });
    }

    // A physical copy is freed only once no alias path references it.
    let freed: HashSet<InodeId> = outcomes_by_inode
        .into_iter()
        .filter(|(_, linked)| linked.iter().all(|ok| *ok))
        .map(|(inode, _)| inode)
        .collect();

    GroupReport {
        canonical: canonical.path,
        size,
        hash: hash.as_ref().map(hash_to_hex),
        targets,
        reclaimed_bytes: size * freed.len() as u64,
    }
}

/// Replace one target with a hard link to the canonical.
fn execute_link(
    source: &Path,
    canonical_inode: InodeId,
    size: u64,
    link: &PlannedLink,
) -> TargetOutcome {
    // Re-stat the target: it must still be exactly the file the verifier
    // read. Anything else and we leave it alone.
    let meta = match std::fs::symlink_metadata(&link.target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("Target vanished, skipping: {}", link.target.display());
            return TargetOutcome::Skipped {
                reason: SkipReason::Vanished,
            };
        }
        Err(e) => {
            return TargetOutcome::Failed {
                error: format!("stat failed: {}", e),
            };
        }
    };

    let Some(current_inode) = InodeId::from_metadata(&meta) else {
        return TargetOutcome::Failed {
            error: "inode identity unavailable".to_string(),
        };
    };

    if current_inode == canonical_inode {
        return TargetOutcome::Skipped {
            reason: SkipReason::AlreadyLinked,
        };
    }
    if current_inode.device != canonical_inode.device {
        return TargetOutcome::Skipped {
            reason: SkipReason::CrossDevice,
        };
    }
    let unchanged = current_inode == link.target_inode
        && meta.len() == size
        && meta
            .modified()
            .map_or(false, |mtime| mtime == link.target_modified);
    if !unchanged {
        log::warn!(
            "Target changed since verification, skipping: {}",
            link.target.display()
        );
        return TargetOutcome::Skipped {
            reason: SkipReason::Modified,
        };
    }

    let temp = temp_path(&link.target);

    // A leftover artifact from a crashed run blocks the link call;
    // remove it before retrying.
    if temp.symlink_metadata().is_ok() {
        log::warn!("Removing stale temp artifact: {}", temp.display());
        if let Err(e) = std::fs::remove_file(&temp) {
            return TargetOutcome::Failed {
                error: format!("stale temp removal failed: {}", e),
            };
        }
    }

    // PLANNED -> TEMP_LINK_CREATED
    if let Err(e) = std::fs::hard_link(source, &temp) {
        return TargetOutcome::Failed {
            error: format!("hard link failed: {}", e),
        };
    }

    // TEMP_LINK_CREATED -> RENAMED | FAILED_CLEANED
    if let Err(e) = std::fs::rename(&temp, &link.target) {
        if let Err(cleanup) = std::fs::remove_file(&temp) {
            log::error!(
                "Failed to remove temp artifact {}: {}",
                temp.display(),
                cleanup
            );
        }
        return TargetOutcome::Failed {
            error: format!("rename failed: {}", e),
        };
    }

    log::debug!(
        "Linked {} -> {}",
        link.target.display(),
        source.display()
    );
    TargetOutcome::Linked
}

/// Deterministic temporary name beside the target.
///
/// Deterministic on purpose: a crashed run's artifact must be findable by
/// the retry. Concurrent runs over the same tree are outside the
/// concurrency contract.
fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".to_string());
    let parent = target.parent().unwrap_or(Path::new("."));
    parent.join(format!(".{}{}", name, TMP_SUFFIX))
}
