//! Property-based tests for grouping correctness.
//!
//! The core contract: two files land in the same duplicate group iff
//! their byte contents are identical. Differing size or a single
//! differing byte must separate them.

#![cfg(unix)]

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use lndupe::dedup::Deduper;
use proptest::prelude::*;
use tempfile::TempDir;

/// A small pool of contents so duplicates actually occur.
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        Just(b"alpha".to_vec()),
        Just(b"beta!".to_vec()),
        Just(vec![0u8; 4096]),
        Just(vec![1u8; 4096]),
        // Differs from the previous only past the prefix window.
        Just({
            let mut v = vec![1u8; 4096];
            v.push(2);
            v
        }),
        Just({
            let mut v = vec![1u8; 4096];
            v.push(3);
            v
        }),
        proptest::collection::vec(any::<u8>(), 0..64),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn same_group_iff_identical_bytes(contents in proptest::collection::vec(content_strategy(), 2..12)) {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for (i, content) in contents.iter().enumerate() {
            let path = dir.path().join(format!("f{:02}", i));
            fs::write(&path, content).unwrap();
            paths.push(path);
        }

        let (groups, _) = Deduper::with_defaults()
            .find_from_paths(paths.clone())
            .unwrap();

        // Index: path -> group number (None = not in any group).
        let mut group_of: HashMap<PathBuf, usize> = HashMap::new();
        for (gi, group) in groups.iter().enumerate() {
            for path in group.paths() {
                group_of.insert(path, gi);
            }
        }

        for i in 0..paths.len() {
            for j in (i + 1)..paths.len() {
                let identical = contents[i] == contents[j];
                let same_group = match (group_of.get(&paths[i]), group_of.get(&paths[j])) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                };
                prop_assert_eq!(
                    identical,
                    same_group,
                    "files {} and {} (identical={}) grouping mismatch",
                    i,
                    j,
                    identical
                );
            }
        }

        // A file with unique content must not appear in any group at all.
        for (i, path) in paths.iter().enumerate() {
            let has_twin = contents
                .iter()
                .enumerate()
                .any(|(j, c)| j != i && c == &contents[i]);
            prop_assert_eq!(group_of.contains_key(path), has_twin);
        }
    }
}
