//! Link executor safety tests: TOCTOU guards, runtime skips, atomicity.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use lndupe::dedup::Deduper;
use lndupe::linker::{execute_plan, plan_links, ExecutorConfig, LinkPlan};
use lndupe::report::{SkipReason, TargetOutcome};
use lndupe::scanner::{Walker, WalkerConfig};
use tempfile::TempDir;

fn plan_for(root: &Path) -> LinkPlan {
    let paths: Vec<PathBuf> = Walker::new(root, WalkerConfig::default())
        .walk()
        .filter_map(Result::ok)
        .collect();
    let (groups, _) = Deduper::with_defaults().find_from_paths(paths).unwrap();
    plan_links(&groups)
}

fn inode_of(path: &Path) -> u64 {
    fs::metadata(path).unwrap().ino()
}

#[test]
fn test_target_modified_after_verification_is_skipped() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"original content").unwrap();
    fs::write(&b, b"original content").unwrap();

    let plan = plan_for(dir.path());
    assert_eq!(plan.planned_links(), 1);

    // The target changes between verification and execution. Same size,
    // different bytes: only the mtime betrays it.
    let target = plan.groups[0].links[0].target.clone();
    fs::write(&target, b"REPLACED content").unwrap();
    filetime::set_file_mtime(&target, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let reports = execute_plan(plan, &ExecutorConfig::default());

    let outcome = &reports[0].targets[0].outcome;
    assert_eq!(
        *outcome,
        TargetOutcome::Skipped {
            reason: SkipReason::Modified
        }
    );
    // The new content survived untouched.
    assert_eq!(fs::read(&target).unwrap(), b"REPLACED content");
    assert_ne!(inode_of(&a), inode_of(&target));
    assert_eq!(reports[0].reclaimed_bytes, 0);
}

#[test]
fn test_target_vanished_is_skipped() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a"), b"some data").unwrap();
    fs::write(dir.path().join("b"), b"some data").unwrap();

    let plan = plan_for(dir.path());
    let target = plan.groups[0].links[0].target.clone();
    fs::remove_file(&target).unwrap();

    let reports = execute_plan(plan, &ExecutorConfig::default());

    assert_eq!(
        reports[0].targets[0].outcome,
        TargetOutcome::Skipped {
            reason: SkipReason::Vanished
        }
    );
    assert!(!target.exists());
}

#[test]
fn test_canonical_vanished_skips_whole_group() {
    let dir = TempDir::new().unwrap();
    let content = b"canonical test".repeat(5);
    for name in ["a", "b", "c"] {
        fs::write(dir.path().join(name), &content).unwrap();
    }

    let plan = plan_for(dir.path());
    let canonical = plan.groups[0].canonical.path.clone();
    fs::remove_file(&canonical).unwrap();

    let reports = execute_plan(plan, &ExecutorConfig::default());

    assert_eq!(reports[0].targets.len(), 2);
    for target in &reports[0].targets {
        assert_eq!(
            target.outcome,
            TargetOutcome::Skipped {
                reason: SkipReason::CanonicalChanged
            }
        );
        // Untouched and intact.
        assert_eq!(fs::read(&target.path).unwrap(), content);
    }
    assert_eq!(reports[0].reclaimed_bytes, 0);
}

#[test]
fn test_canonical_replaced_skips_whole_group() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a"), b"abcdefgh").unwrap();
    fs::write(dir.path().join("b"), b"abcdefgh").unwrap();

    let plan = plan_for(dir.path());
    let canonical = plan.groups[0].canonical.path.clone();

    // Replace the canonical with different content; the size change is
    // what the guard must catch (a freed inode number can be reused).
    fs::remove_file(&canonical).unwrap();
    fs::write(&canonical, b"abcdefgh-and-more").unwrap();

    let reports = execute_plan(plan, &ExecutorConfig::default());

    assert_eq!(
        reports[0].targets[0].outcome,
        TargetOutcome::Skipped {
            reason: SkipReason::CanonicalChanged
        }
    );
}

#[test]
fn test_target_already_linked_at_execution_is_skipped() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"link me").unwrap();
    fs::write(&b, b"link me").unwrap();

    let plan = plan_for(dir.path());
    let canonical = plan.groups[0].canonical.path.clone();
    let target = plan.groups[0].links[0].target.clone();

    // Someone else already collapsed the pair.
    fs::remove_file(&target).unwrap();
    fs::hard_link(&canonical, &target).unwrap();

    let reports = execute_plan(plan, &ExecutorConfig::default());

    assert_eq!(
        reports[0].targets[0].outcome,
        TargetOutcome::Skipped {
            reason: SkipReason::AlreadyLinked
        }
    );
    assert_eq!(inode_of(&canonical), inode_of(&target));
}

#[test]
fn test_shutdown_skips_remaining_targets() {
    let dir = TempDir::new().unwrap();
    let content = b"interrupt me".repeat(4);
    for name in ["a", "b", "c", "d"] {
        fs::write(dir.path().join(name), &content).unwrap();
    }

    let plan = plan_for(dir.path());
    assert_eq!(plan.planned_links(), 3);

    let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let config = ExecutorConfig::default().with_shutdown_flag(flag);
    let reports = execute_plan(plan, &config);

    for target in &reports[0].targets {
        assert_eq!(
            target.outcome,
            TargetOutcome::Skipped {
                reason: SkipReason::Interrupted
            }
        );
        assert_eq!(fs::read(&target.path).unwrap(), content);
    }
}

#[test]
fn test_no_temp_artifacts_left_behind() {
    let dir = TempDir::new().unwrap();
    let content = b"tidy".repeat(100);
    for name in ["a", "b", "c"] {
        fs::write(dir.path().join(name), &content).unwrap();
    }

    let plan = plan_for(dir.path());
    execute_plan(plan, &ExecutorConfig::default());

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("lndupe-tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp artifacts left: {:?}", leftovers);
}
