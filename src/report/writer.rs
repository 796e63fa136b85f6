use super::outcomes::{ShareOutcome, ShareOutcomeLog};
use super::summary::ScanSummary;
use crate::scanner::types::{ScanResult, ShareRoot};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Column header of every share report
pub const REPORT_HEADER: [&str; 6] = [
    "FilePath",
    "Status",
    "LastModified",
    "Type",
    "FoundString",
    "Reason",
];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PARTIAL_SUFFIX: &str = "partial";

/// Options that shape report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Sort rows by file path when a share is finalized
    pub sort_reports: bool,
    /// `sync_data` after every appended row
    pub sync_rows: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            sort_reports: true,
            sync_rows: false,
        }
    }
}

/// Open report for one share.
///
/// Rows are appended to `<name>.partial` under the handle's mutex; the final
/// file only appears when the share is finalized.
#[derive(Debug)]
pub struct ShareReportHandle {
    share: ShareRoot,
    final_path: PathBuf,
    partial_path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ShareReportHandle {
    /// Path the report will have once finalized
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<File>>> {
        self.file
            .lock()
            .map_err(|_| anyhow!("Report lock poisoned for share {}", self.share))
    }
}

/// Owns every output artifact of a run: per-share CSV reports, the summary
/// log and the share outcome logs.
///
/// `record` may be called from any worker thread. Rows for one share are
/// serialized by that share's mutex; different shares never contend.
#[derive(Debug)]
pub struct ReportWriter {
    output_dir: PathBuf,
    date_stamp: String,
    options: ReportOptions,
    shares: Mutex<HashMap<ShareRoot, Arc<ShareReportHandle>>>,
    used_names: Mutex<HashSet<String>>,
    outcomes: Mutex<ShareOutcomeLog>,
}

impl ReportWriter {
    pub fn new(output_dir: &Path, run_started: DateTime<Local>, options: ReportOptions) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
        let outcomes = ShareOutcomeLog::open(output_dir)?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            date_stamp: run_started.format("%Y%m%d").to_string(),
            options,
            shares: Mutex::new(HashMap::new()),
            used_names: Mutex::new(HashSet::new()),
            outcomes: Mutex::new(outcomes),
        })
    }

    /// Create the share's `.partial` report with its header row.
    ///
    /// Report names are `<identifier>-MacroScan-<YYYYMMDD>.csv`; a second
    /// share with the same identifier in one run gets `-2`, `-3`, ...
    pub fn open_share(&self, share: &ShareRoot) -> Result<Arc<ShareReportHandle>> {
        if let Some(existing) = self.lock_shares()?.get(share) {
            return Ok(Arc::clone(existing));
        }

        let file_name = self.reserve_name(&share.identifier())?;
        let final_path = self.output_dir.join(&file_name);
        let partial_path = self.output_dir.join(format!("{file_name}.{PARTIAL_SUFFIX}"));

        let mut file = File::create(&partial_path)
            .with_context(|| format!("Failed to create report {}", partial_path.display()))?;
        file.write_all(&serialize_row(&REPORT_HEADER)?)
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to write report header to {}", partial_path.display()))?;

        let handle = Arc::new(ShareReportHandle {
            share: share.clone(),
            final_path,
            partial_path,
            file: Mutex::new(Some(file)),
        });
        debug!("Opened report {} for {}", handle.partial_path.display(), share);
        self.lock_shares()?.insert(share.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Durably append one result row to the share's report.
    ///
    /// The row is serialized in memory first and then written with a single
    /// `write_all`, so concurrent writers never interleave partial rows.
    pub fn record(&self, share: &ShareRoot, result: &ScanResult) -> Result<()> {
        let handle = self
            .lock_shares()?
            .get(share)
            .cloned()
            .ok_or_else(|| anyhow!("No open report for share {}", share))?;

        let row = serialize_row(&result_fields(result))?;
        let mut guard = handle.lock()?;
        let file = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Report for share {} is already finalized", share))?;
        file.write_all(&row)
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to append to {}", handle.partial_path.display()))?;
        if self.options.sync_rows {
            file.sync_data()
                .with_context(|| format!("Failed to sync {}", handle.partial_path.display()))?;
        }
        Ok(())
    }

    /// Close the share's report and move it to its final name.
    ///
    /// With `sort_reports` the rows are sorted by file path so a rerun over an
    /// unchanged share produces an identical file regardless of worker count.
    pub fn finalize_share(&self, share: &ShareRoot) -> Result<PathBuf> {
        let handle = self
            .lock_shares()?
            .remove(share)
            .ok_or_else(|| anyhow!("No open report for share {}", share))?;

        let file = handle.lock()?.take();
        if let Some(file) = file {
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", handle.partial_path.display()))?;
        }

        if self.options.sort_reports {
            let sorted = sort_report(&handle.partial_path)?;
            atomic_write(&handle.final_path, &sorted)?;
            fs::remove_file(&handle.partial_path)
                .with_context(|| format!("Failed to remove {}", handle.partial_path.display()))?;
        } else {
            fs::rename(&handle.partial_path, &handle.final_path).with_context(|| {
                format!("Failed to finalize report {}", handle.final_path.display())
            })?;
        }

        info!("Report for {} written to {}", share, handle.final_path.display());
        Ok(handle.final_path.clone())
    }

    /// Append the share's outcome to the success or failure log
    pub fn record_outcome(&self, share: &ShareRoot, outcome: &ShareOutcome) -> Result<()> {
        self.outcomes
            .lock()
            .map_err(|_| anyhow!("Outcome log lock poisoned"))?
            .append(share, outcome)
    }

    /// Write the aggregate summary log, returning its path
    pub fn write_summary(&self, summary: &ScanSummary) -> Result<PathBuf> {
        let name = format!(
            "MacroScan-{}.log",
            summary.started_at().format("%Y%m%d-%H%M%S")
        );
        let path = self.output_dir.join(name);
        atomic_write(&path, summary.render().as_bytes())?;
        info!("Summary log written to {}", path.display());
        Ok(path)
    }

    fn reserve_name(&self, identifier: &str) -> Result<String> {
        let mut used = self
            .used_names
            .lock()
            .map_err(|_| anyhow!("Report name lock poisoned"))?;
        let base = format!("{}-MacroScan-{}", identifier, self.date_stamp);
        let mut candidate = format!("{base}.csv");
        let mut n = 2;
        while used.contains(&candidate) {
            candidate = format!("{base}-{n}.csv");
            n += 1;
        }
        used.insert(candidate.clone());
        Ok(candidate)
    }

    fn lock_shares(&self) -> Result<MutexGuard<'_, HashMap<ShareRoot, Arc<ShareReportHandle>>>> {
        self.shares
            .lock()
            .map_err(|_| anyhow!("Report table lock poisoned"))
    }
}

fn result_fields(result: &ScanResult) -> [String; 6] {
    [
        result.file_path.to_string_lossy().into_owned(),
        result.status.to_string(),
        result
            .last_modified
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default(),
        result.document_type.to_string(),
        result.found_string.clone(),
        result.reason.clone(),
    ]
}

fn serialize_row<I, T>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields).context("Failed to serialize report row")?;
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to serialize report row: {}", e.error()))
}

fn sort_report(path: &Path) -> Result<Vec<u8>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let header = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let mut rows = reader
        .records()
        .collect::<Result<Vec<csv::StringRecord>, _>>()
        .with_context(|| format!("Failed to read rows of {}", path.display()))?;
    rows.sort_by(|a, b| a.iter().cmp(b.iter()));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to serialize sorted report: {}", e.error()))
}

/// Write to a sibling `.tmp` file and rename it over `path`
fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        tmp.write_all(contents)
            .and_then(|_| tmp.sync_all())
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
