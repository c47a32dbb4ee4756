//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//!
//! Provides the [`Hasher`] for computing BLAKE3 digests of file contents.
//! Two operations exist, mirroring the two fingerprinting stages of the
//! pipeline:
//!
//! - [`Hasher::prefix_digest`]: hash of the first 4 KiB, used to cheaply
//!   eliminate same-size files that differ early
//! - [`Hasher::full_digest`]: hash of the entire content, streamed in
//!   fixed-size chunks to bound memory; large files use memory-mapped
//!   multi-threaded hashing
//!
//! A digest is never trusted as an equality proof on its own; the byte
//! verifier confirms every candidate group before any filesystem mutation.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Number of leading bytes covered by the prefix digest.
pub const PREFIX_SIZE: usize = 4096;

/// Read chunk size for streamed full-content hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// Files at or above this size are hashed via memory mapping with
/// multi-threaded BLAKE3 instead of streamed reads.
const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file was not found (deleted between probing and hashing).
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The hash operation was interrupted by a shutdown request.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Whether the error represents a file that vanished or became
    /// unreadable, as opposed to an interruption.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        !matches!(self, Self::Interrupted(_))
    }

    /// Path the error applies to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::Interrupted(p)
            | Self::Io { path: p, .. } => p,
        }
    }
}

/// BLAKE3 file hasher.
///
/// Stateless apart from an optional shutdown flag; cheap to share behind an
/// `Arc` across worker threads.
///
/// # Example
///
/// ```no_run
/// use lndupe::scanner::Hasher;
/// use std::path::Path;
///
/// let hasher = Hasher::new();
/// let digest = hasher.full_digest(Path::new("/some/file")).unwrap();
/// println!("{}", lndupe::scanner::hash_to_hex(&digest));
/// ```
#[derive(Debug, Default)]
pub struct Hasher {
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown flag for graceful termination mid-file.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compute the digest of the first [`PREFIX_SIZE`] bytes of a file.
    ///
    /// For files shorter than the prefix window the whole content is
    /// covered, which makes the prefix digest equal to the full digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn prefix_digest(&self, path: &Path) -> Result<Hash, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut buf = vec![0u8; PREFIX_SIZE];
        let mut filled = 0;

        // Loop until the window is full or EOF; a single read may be short.
        while filled < buf.len() {
            let n = file
                .read(&mut buf[filled..])
                .map_err(|e| HashError::from_io(path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(&buf[..filled]);
        Ok(*hasher.finalize().as_bytes())
    }

    /// Compute the digest of a file's entire content.
    ///
    /// Streams the file in [`CHUNK_SIZE`] chunks so memory stays bounded
    /// regardless of file size. Files at or above the mmap threshold are
    /// hashed with multi-threaded memory-mapped BLAKE3 instead.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read, or
    /// [`HashError::Interrupted`] if shutdown was requested mid-file.
    pub fn full_digest(&self, path: &Path) -> Result<Hash, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();

        if size >= MMAP_THRESHOLD {
            log::debug!(
                "Hashing large file via mmap ({} MB): {}",
                size / (1024 * 1024),
                path.display()
            );
            let mut hasher = blake3::Hasher::new();
            hasher
                .update_mmap_rayon(path)
                .map_err(|e| HashError::from_io(path, e))?;
            return Ok(*hasher.finalize().as_bytes());
        }

        let mut hasher = blake3::Hasher::new();
        let mut reader = file;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let n = reader
                .read(&mut buf)
                .map_err(|e| HashError::from_io(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(*hasher.finalize().as_bytes())
    }
}

/// Render a digest as a lowercase hexadecimal string (64 characters).
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
