//! Per-share outcome logs kept across runs.
//!
//! `scan_success_log.csv` and `scan_failure_log.csv` live in the output
//! directory and grow by one row per share per run.

use super::writer::TIMESTAMP_FORMAT;
use crate::scanner::types::ShareRoot;
use anyhow::{Context, Result, anyhow};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SUCCESS_LOG: &str = "scan_success_log.csv";
pub const FAILURE_LOG: &str = "scan_failure_log.csv";
const OUTCOME_HEADER: [&str; 3] = ["SharePath", "ScanDate", "Status"];

/// How a share's scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Success,
    Failed(String),
    Cancelled,
}

impl ShareOutcome {
    fn status(&self) -> String {
        match self {
            ShareOutcome::Success => "Success".to_string(),
            ShareOutcome::Failed(reason) => format!("Failed: {reason}"),
            ShareOutcome::Cancelled => "Cancelled".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ShareOutcomeLog {
    success: PathBuf,
    failure: PathBuf,
}

impl ShareOutcomeLog {
    /// Create both logs with their header row if they do not exist yet
    pub fn open(output_dir: &Path) -> Result<Self> {
        let log = Self {
            success: output_dir.join(SUCCESS_LOG),
            failure: output_dir.join(FAILURE_LOG),
        };
        for path in [&log.success, &log.failure] {
            if !path.exists() {
                let mut writer = csv::Writer::from_path(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                writer.write_record(OUTCOME_HEADER)?;
                writer.flush()?;
            }
        }
        Ok(log)
    }

    pub fn append(&self, share: &ShareRoot, outcome: &ShareOutcome) -> Result<()> {
        let path = match outcome {
            ShareOutcome::Success => &self.success,
            ShareOutcome::Failed(_) | ShareOutcome::Cancelled => &self.failure,
        };
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        write_row(file, share, outcome)
            .with_context(|| format!("Failed to append to {}", path.display()))
    }
}

fn write_row(mut file: File, share: &ShareRoot, outcome: &ShareOutcome) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        share.as_str().to_string(),
        Local::now().format(TIMESTAMP_FORMAT).to_string(),
        outcome.status(),
    ])?;
    let row = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to serialize outcome row: {}", e.error()))?;
    file.write_all(&row)?;
    file.flush()?;
    Ok(())
}
