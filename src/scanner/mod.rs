//! Scanner module for candidate enumeration and metadata probing.
//!
//! This module provides functionality for:
//! - Directory traversal producing a flat candidate path list
//! - Metadata probing (size, device id, inode, mtime)
//! - Content hashing with BLAKE3
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`prober`]: Stat-based metadata collection
//! - [`hasher`]: BLAKE3 file hashing (streaming)
//!
//! # Example
//!
//! ```no_run
//! use lndupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig::default().with_skip_hidden(true);
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(path) => println!("{}", path.display()),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod prober;
pub mod walker;

use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// Re-export main types
pub use hasher::{hash_to_hex, Hash, HashError, Hasher, PREFIX_SIZE};
pub use prober::{probe, probe_all, ProbeError};
pub use walker::{Walker, WalkerConfig};

/// Identity of physical file data on a machine.
///
/// Two paths with the same `InodeId` are already hard links to the same
/// underlying data and must never be re-linked to each other. Paths are not
/// a reliable identity key under hard links; this pair is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeId {
    /// Device (storage volume) identifier
    pub device: u64,
    /// Inode number on that device
    pub inode: u64,
}

impl InodeId {
    /// Extract the inode identity from file metadata.
    ///
    /// Returns `None` on platforms where inode identity is unavailable.
    /// Without it a file cannot be safely linked and is soft-skipped.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        // Windows would need GetFileInformationByHandle (volume serial +
        // file index) from an open handle; not implemented.
        None
    }
}

impl std::fmt::Display for InodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// Metadata for a probed candidate file.
///
/// Created once by the prober and immutable afterwards. The modification
/// time is informational and used only for change detection before linking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Physical identity (device id, inode)
    pub inode: InodeId,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, inode: InodeId, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            inode,
            modified,
        }
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_new() {
        let record = FileRecord::new(
            PathBuf::from("/test/file.txt"),
            1024,
            InodeId {
                device: 1,
                inode: 42,
            },
            SystemTime::now(),
        );

        assert_eq!(record.path, PathBuf::from("/test/file.txt"));
        assert_eq!(record.size, 1024);
        assert_eq!(record.inode.inode, 42);
    }

    #[test]
    #[cfg(unix)]
    fn test_inode_id_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let id = InodeId::from_metadata(&meta).unwrap();
        assert!(id.inode > 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_hardlinked_paths_share_inode_id() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"same").unwrap();
        std::fs::hard_link(&a, &b).unwrap();

        let id_a = InodeId::from_metadata(&std::fs::metadata(&a).unwrap()).unwrap();
        let id_b = InodeId::from_metadata(&std::fs::metadata(&b).unwrap()).unwrap();
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::PermissionDenied(PathBuf::from("/test"));
        assert_eq!(err.to_string(), "Permission denied: /test");

        let err = ScanError::NotFound(PathBuf::from("/missing"));
        assert_eq!(err.to_string(), "Path not found: /missing");
    }
}
