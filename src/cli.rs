//! Command-line interface definitions.
//!
//! All CLI arguments are defined here using the clap derive API. lndupe is
//! a single-purpose tool, so there are no subcommands: give it one or more
//! roots and it collapses the duplicates beneath them.
//!
//! # Example
//!
//! ```bash
//! # Preview what would be linked
//! lndupe --dry-run ~/backups
//!
//! # Collapse duplicates, JSON report for scripting
//! lndupe ~/backups --output json
//!
//! # Only consider files of at least 1 MiB, chatty logging
//! lndupe -v --min-size 1MiB /srv/media /srv/archive
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Collapse byte-identical files into hard links.
///
/// lndupe finds files with identical content (size grouping, BLAKE3
/// fingerprinting, byte-for-byte verification) and atomically replaces the
/// redundant copies with hard links to one canonical file.
#[derive(Debug, Parser)]
#[command(name = "lndupe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories (or single files) to deduplicate
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Plan only: report what would be linked without touching anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Minimum file size to consider (e.g., 1KB, 1MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size to consider (e.g., 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Follow symbolic links during traversal
    ///
    /// Warning: may cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Number of I/O threads for hashing and verification (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N", default_value = "4")]
    pub io_threads: usize,

    /// Emit errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Increase verbosity level (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and the report
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Report format for run results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text report
    Text,
    /// JSON report for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB.
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use lndupe::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// ```
///
/// # Errors
///
/// Returns a message suitable for clap error display when the string is
/// not a valid size.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid number: '{}'", number))?;
    if value < 0.0 {
        return Err("size cannot be negative".to_string());
    }

    let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1000,
        "kib" => 1024,
        "mb" => 1_000_000,
        "mib" => 1024 * 1024,
        "gb" => 1_000_000_000,
        "gib" => 1024 * 1024 * 1024,
        "tb" => 1_000_000_000_000,
        "tib" => 1024u64.pow(4),
        other => return Err(format!("unknown size suffix: '{}'", other)),
    };

    Ok((value * multiplier as f64) as u64)
}
