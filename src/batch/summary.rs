//! Outcome bookkeeping for a batch run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LineError, error_chain};

/// One line that produced no audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFailure {
    pub line: usize,
    pub text: String,
    pub kind: String,
    pub message: String,
}

/// Counts and failures of a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,    // Non-blank lines requested
    pub skipped: usize,      // Blank lines
    pub saved: Vec<PathBuf>, // Files written, in input order
    pub failures: Vec<LineFailure>,
}

impl BatchSummary {
    pub fn record_saved(&mut self, path: PathBuf) {
        self.processed += 1;
        self.saved.push(path);
    }

    pub fn record_failure(&mut self, line: usize, err: &LineError) {
        self.processed += 1;
        self.failures.push(LineFailure { line, text: err.text().to_string(), kind: err.kind().to_string(), message: error_chain(err) });
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// True when no line failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Log the totals and every failed line.
    pub fn log(&self) {
        info!("Finished: {} saved, {} failed, {} blank lines skipped", self.saved.len(), self.failures.len(), self.skipped);
        for failure in &self.failures {
            warn!("  line {} ({}): {}", failure.line, failure.kind, failure.text);
        }
    }

    /// Write the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create report {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).with_context(|| format!("Failed to write report {}", path.display()))?;
        writer.flush().with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut summary = BatchSummary::default();
        summary.record_saved(PathBuf::from("out/a.mp3"));
        summary.record_skipped();
        assert!(summary.is_success());

        summary.record_failure(3, &LineError::HttpStatus { text: "b".to_string(), status: 500 });
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.failures[0].kind, "http_status");
        assert_eq!(summary.failures[0].line, 3);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut summary = BatchSummary::default();
        summary.record_failure(1, &LineError::RateLimited { text: "你好".to_string(), detail: "HTTP status 429".to_string() });
        summary.write_json(&path).unwrap();

        let parsed: BatchSummary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, summary);
        assert_eq!(parsed.failures[0].text, "你好");
    }
}
