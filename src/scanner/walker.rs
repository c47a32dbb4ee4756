//! Directory traversal producing the flat candidate path list.
//!
//! # Overview
//!
//! The walker enumerates regular files beneath one root, applying size and
//! visibility filters. It deliberately does no content I/O; the prober and
//! hasher take over from the path list it produces. Errors on individual
//! entries are yielded inline so one unreadable directory never aborts a
//! scan.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use super::ScanError;

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: may cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: Option<u64>,

    /// Maximum file size to include (in bytes).
    pub max_size: Option<u64>,
}

impl WalkerConfig {
    /// Enable or disable following symbolic links.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Enable or disable skipping hidden entries.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Set the minimum file size filter.
    #[must_use]
    pub fn with_min_size(mut self, min: Option<u64>) -> Self {
        self.min_size = min;
        self
    }

    /// Set the maximum file size filter.
    #[must_use]
    pub fn with_max_size(mut self, max: Option<u64>) -> Self {
        self.max_size = max;
        self
    }
}

/// Directory walker yielding candidate file paths.
///
/// # Example
///
/// ```no_run
/// use lndupe::scanner::{Walker, WalkerConfig};
/// use std::path::Path;
///
/// let walker = Walker::new(Path::new("/data"), WalkerConfig::default());
/// let candidates: Vec<_> = walker.walk().filter_map(Result::ok).collect();
/// ```
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker for one root directory.
    #[must_use]
    pub fn new(root: &Path, config: WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination mid-walk.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Walk the tree, yielding candidate paths and per-entry errors.
    ///
    /// Directories are never yielded. When a shutdown is requested the
    /// iterator ends after the current entry.
    pub fn walk(&self) -> impl Iterator<Item = Result<PathBuf, ScanError>> + '_ {
        let skip_hidden = self.config.skip_hidden;
        let shutdown = self.shutdown_flag.clone();

        WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .into_iter()
            .filter_entry(move |entry| {
                // Never filter the root itself, only descendants.
                if entry.depth() == 0 {
                    return true;
                }
                !(skip_hidden && is_hidden(entry.file_name()))
            })
            .take_while(move |_| {
                shutdown
                    .as_ref()
                    .map_or(true, |f| !f.load(Ordering::SeqCst))
            })
            .filter_map(move |entry| self.filter_entry(entry))
    }

    fn filter_entry(
        &self,
        entry: walkdir::Result<walkdir::DirEntry>,
    ) -> Option<Result<PathBuf, ScanError>> {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => return Some(Err(convert_error(e))),
        };

        if !entry.file_type().is_file() {
            return None;
        }

        if self.config.min_size.is_some() || self.config.max_size.is_some() {
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => return Some(Err(convert_error(e))),
            };
            if self.config.min_size.is_some_and(|min| size < min) {
                log::trace!("Below min size, skipping: {}", entry.path().display());
                return None;
            }
            if self.config.max_size.is_some_and(|max| size > max) {
                log::trace!("Above max size, skipping: {}", entry.path().display());
                return None;
            }
        }

        Some(Ok(entry.into_path()))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn convert_error(err: walkdir::Error) -> ScanError {
    let path = err
        .path()
        .map_or_else(PathBuf::new, Path::to_path_buf);
    match err.io_error().map(std::io::Error::kind) {
        Some(std::io::ErrorKind::PermissionDenied) => ScanError::PermissionDenied(path),
        Some(std::io::ErrorKind::NotFound) => ScanError::NotFound(path),
        _ => ScanError::Io {
            path,
            source: err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walk error")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(content).unwrap();
        path
    }

    fn collect(walker: &Walker) -> Vec<PathBuf> {
        let mut paths: Vec<_> = walker.walk().filter_map(Result::ok).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_walk_finds_regular_files() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.txt", b"a");
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_file(&dir.path().join("sub"), "b.txt", b"b");

        let walker = Walker::new(dir.path(), WalkerConfig::default());
        assert_eq!(collect(&walker).len(), 2);
    }

    #[test]
    fn test_directories_not_yielded() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let walker = Walker::new(dir.path(), WalkerConfig::default());
        assert!(collect(&walker).is_empty());
    }

    #[test]
    fn test_skip_hidden() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "visible", b"v");
        write_file(dir.path(), ".hidden", b"h");

        let config = WalkerConfig::default().with_skip_hidden(true);
        let walker = Walker::new(dir.path(), config);
        let paths = collect(&walker);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("visible"));
    }

    #[test]
    fn test_size_filters() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "small", b"x");
        write_file(dir.path(), "medium", &[0u8; 100]);
        write_file(dir.path(), "large", &[0u8; 10_000]);

        let config = WalkerConfig::default()
            .with_min_size(Some(10))
            .with_max_size(Some(1000));
        let walker = Walker::new(dir.path(), config);
        let paths = collect(&walker);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("medium"));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_not_followed_by_default() {
        let dir = TempDir::new().unwrap();
        let target = write_file(dir.path(), "target", b"t");
        std::os::unix::fs::symlink(&target, dir.path().join("link")).unwrap();

        let walker = Walker::new(dir.path(), WalkerConfig::default());
        // Only the target is a regular file; the symlink is not followed.
        assert_eq!(collect(&walker).len(), 1);
    }

    #[test]
    fn test_shutdown_stops_walk() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            write_file(dir.path(), &format!("f{}", i), b"x");
        }

        let flag = Arc::new(AtomicBool::new(true));
        let walker = Walker::new(dir.path(), WalkerConfig::default()).with_shutdown_flag(flag);
        assert!(collect(&walker).is_empty());
    }
}
