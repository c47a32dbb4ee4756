//! JSON report formatter.
//!
//! Machine-readable rendering of the [`TransformationReport`] for
//! scripting and automation. The schema is the report's serde shape; see
//! [`crate::report`] for the documented structure.
//!
//! # Example
//!
//! ```no_run
//! use lndupe::output::JsonOutput;
//! use lndupe::report::TransformationReport;
//! # fn render(report: &TransformationReport) {
//! let output = JsonOutput::new(report);
//! println!("{}", output.to_json_pretty().unwrap());
//! # }
//! ```

use std::io::Write;

use crate::report::TransformationReport;

/// JSON renderer for a transformation report.
pub struct JsonOutput<'a> {
    report: &'a TransformationReport,
}

impl<'a> JsonOutput<'a> {
    /// Create a renderer for a report.
    #[must_use]
    pub fn new(report: &'a TransformationReport) -> Self {
        Self { report }
    }

    /// Render as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; the report type serializes
    /// infallibly in practice.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self.report)
    }

    /// Render as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; the report type serializes
    /// infallibly in practice.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self.report)
    }

    /// Write pretty-printed JSON to a writer, with trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        let json = self.to_json_pretty()?;
        writeln!(writer, "{}", json)?;
        Ok(())
    }
}
