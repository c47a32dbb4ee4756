//! Human-readable text report.

use std::io::Write;

use bytesize::ByteSize;

use crate::report::{TargetOutcome, TransformationReport};

/// Write a human-readable rendering of the report.
///
/// Group detail lines appear only for groups with something to say;
/// a fully linked group prints one line per target.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_report<W: Write>(writer: &mut W, report: &TransformationReport) -> std::io::Result<()> {
    let summary = &report.summary;

    if report.dry_run {
        writeln!(writer, "Dry run - no files were modified.")?;
    }

    for group in &report.groups {
        writeln!(
            writer,
            "Group: {} ({}, {} targets)",
            group.canonical.display(),
            ByteSize::b(group.size),
            group.targets.len()
        )?;
        for target in &group.targets {
            let line = match &target.outcome {
                TargetOutcome::Linked => "linked".to_string(),
                TargetOutcome::WouldLink => "would link".to_string(),
                TargetOutcome::Skipped { reason } => format!("skipped ({})", reason),
                TargetOutcome::Failed { error } => format!("FAILED: {}", error),
            };
            writeln!(writer, "  {} -> {}", target.path.display(), line)?;
        }
    }

    if !report.soft_skips.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Skipped before planning:")?;
        for skip in &report.soft_skips {
            writeln!(writer, "  {}", skip.reason)?;
        }
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "{} candidate paths, {} probed, {} physical files",
        summary.candidate_paths, summary.probed_files, summary.inode_classes
    )?;
    writeln!(
        writer,
        "{} duplicate groups, {} links {}, {} reclaimed{}",
        summary.duplicate_groups,
        summary.links_planned,
        if report.dry_run { "planned" } else { "created" },
        ByteSize::b(summary.bytes_reclaimed),
        if report.dry_run { " (estimated)" } else { "" }
    )?;
    if summary.targets_skipped > 0 || summary.targets_failed > 0 {
        writeln!(
            writer,
            "{} targets skipped, {} failed (originals intact)",
            summary.targets_skipped, summary.targets_failed
        )?;
    }
    if summary.interrupted {
        writeln!(writer, "Run was interrupted; results are partial.")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupSummary;
    use crate::report::{GroupReport, SkipReason, TargetReport};
    use std::path::PathBuf;

    fn render(report: &TransformationReport) -> String {
        let mut buf = Vec::new();
        write_report(&mut buf, report).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_text_report_mentions_outcomes() {
        let report = TransformationReport::new(
            false,
            vec![GroupReport {
                canonical: PathBuf::from("/a"),
                size: 2048,
                hash: None,
                targets: vec![
                    TargetReport {
                        path: PathBuf::from("/b"),
                        outcome: TargetOutcome::Linked,
                    },
                    TargetReport {
                        path: PathBuf::from("/c"),
                        outcome: TargetOutcome::Skipped {
                            reason: SkipReason::CrossDevice,
                        },
                    },
                ],
                reclaimed_bytes: 2048,
            }],
            &DedupSummary::default(),
        );

        let text = render(&report);
        assert!(text.contains("/b -> linked"));
        assert!(text.contains("skipped (cross-device)"));
        assert!(text.contains("1 duplicate groups"));
    }

    #[test]
    fn test_dry_run_banner() {
        let report = TransformationReport::new(true, Vec::new(), &DedupSummary::default());
        let text = render(&report);
        assert!(text.contains("Dry run"));
        assert!(text.contains("planned"));
    }
}
