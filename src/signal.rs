//! Signal handling for graceful shutdown.
//!
//! Centralized Ctrl+C handling. An `AtomicBool` flag is shared with worker
//! threads; pipeline phases observe it at file and link-operation
//! boundaries, so an interrupted run never stops between a temp-link
//! creation and its rename.
//!
//! # Usage
//!
//! ```rust,no_run
//! use lndupe::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! if handler.is_shutdown_requested() {
//!     // Clean up and exit with code 130
//! }
//! let flag = handler.get_flag(); // pass to Deduper / executor
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code for SIGINT (Ctrl+C) interruption: 128 + signal number.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shutdown handler wrapping the shared flag.
///
/// `Send + Sync`; clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get a clone of the flag for passing to worker threads.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}

/// Install the Ctrl+C handler and return the shared shutdown handler.
///
/// # Errors
///
/// Returns an error if the OS-level handler cannot be installed (for
/// example when one was already set by the embedding process).
pub fn install_handler() -> anyhow::Result<ShutdownHandler> {
    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            // Second Ctrl+C: the user insists, exit immediately.
            eprintln!("Forced exit.");
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        eprintln!("Interrupted. Finishing in-flight operations...");
    })?;

    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_handler_not_shutdown() {
        let handler = ShutdownHandler::new();
        assert!(!handler.is_shutdown_requested());
    }

    #[test]
    fn test_request_shutdown_sets_flag() {
        let handler = ShutdownHandler::new();
        handler.request_shutdown();
        assert!(handler.is_shutdown_requested());
        assert!(handler.get_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_clones_share_flag() {
        let handler = ShutdownHandler::new();
        let clone = handler.clone();
        clone.request_shutdown();
        assert!(handler.is_shutdown_requested());
    }
}
