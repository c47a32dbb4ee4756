//! lndupe - Hardlink Deduplicator
//!
//! Finds sets of byte-for-byte identical files beneath one or more roots
//! and collapses the redundant copies into hard links to a single
//! canonical file, reclaiming disk space while leaving every path
//! resolvable and every file's content unchanged.
//!
//! The pipeline: probe metadata, collapse alias paths by inode, bucket by
//! size, fingerprint with BLAKE3 (prefix, then full content), verify
//! byte-for-byte, then atomically replace targets via temp-link-and-rename.
//! No digest is ever trusted without verification, and no failure mode
//! leaves a target path unresolvable.

pub mod cli;
pub mod dedup;
pub mod error;
pub mod linker;
pub mod logging;
pub mod output;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod signal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{Cli, OutputFormat};
use crate::dedup::{DedupConfig, Deduper};
use crate::error::ExitCode;
use crate::linker::{execute_plan, plan_links, preview_plan, ExecutorConfig};
use crate::output::{write_report, JsonOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::report::TransformationReport;
use crate::scanner::{Walker, WalkerConfig};

/// Run the application end to end: enumerate, detect, plan, execute (or
/// preview), report.
///
/// # Errors
///
/// Returns an error for fatal conditions only: a missing root path, an
/// interrupted run, or a report that cannot be written. Soft skips and
/// per-target failures are recorded in the report instead.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let handler = signal::install_handler()?;

    let walker_config = WalkerConfig::default()
        .with_follow_symlinks(cli.follow_symlinks)
        .with_skip_hidden(cli.skip_hidden)
        .with_min_size(cli.min_size)
        .with_max_size(cli.max_size);

    // Validate every root before doing any work; a bad argument should
    // fail the run, not become a soft skip.
    for root in &cli.paths {
        if !root.exists() {
            anyhow::bail!("path not found: {}", root.display());
        }
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for root in &cli.paths {
        if root.is_file() {
            candidates.push(root.clone());
            continue;
        }
        let walker =
            Walker::new(root, walker_config.clone()).with_shutdown_flag(handler.get_flag());
        for entry in walker.walk() {
            match entry {
                Ok(path) => candidates.push(path),
                Err(e) => log::warn!("Scan error: {}", e),
            }
        }
    }
    log::info!(
        "Collected {} candidate paths from {} roots",
        candidates.len(),
        cli.paths.len()
    );

    // Progress bars only make sense on the text path; JSON consumers get
    // a clean stream.
    let progress: Option<Arc<dyn ProgressCallback>> =
        if cli.output == OutputFormat::Text && !cli.quiet {
            Some(Arc::new(Progress::new(false)))
        } else {
            None
        };

    let mut dedup_config = DedupConfig::default()
        .with_io_threads(cli.io_threads)
        .with_shutdown_flag(handler.get_flag());
    if let Some(ref callback) = progress {
        dedup_config = dedup_config.with_progress_callback(callback.clone());
    }

    let deduper = Deduper::new(dedup_config);
    let (groups, summary) = deduper
        .find_from_paths(candidates)
        .context("duplicate detection failed")?;

    let plan = plan_links(&groups);

    let group_reports = if cli.dry_run {
        preview_plan(&plan)
    } else {
        let mut exec_config = ExecutorConfig::default()
            .with_io_threads(cli.io_threads)
            .with_shutdown_flag(handler.get_flag());
        if let Some(ref callback) = progress {
            exec_config = exec_config.with_progress_callback(callback.clone());
        }
        execute_plan(plan, &exec_config)
    };

    let report = TransformationReport::new(cli.dry_run, group_reports, &summary);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.output {
        OutputFormat::Text => {
            write_report(&mut out, &report).context("failed to write report")?;
        }
        OutputFormat::Json => {
            JsonOutput::new(&report)
                .write_to(&mut out)
                .context("failed to write report")?;
        }
    }

    Ok(if report.summary.interrupted {
        ExitCode::Interrupted
    } else if report.summary.duplicate_groups == 0 {
        ExitCode::NoDuplicates
    } else if report.has_incidents() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}
