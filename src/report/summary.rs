use super::writer::TIMESTAMP_FORMAT;
use crate::scanner::types::{ScanResult, ScanStatus, ShareRoot, ShareState};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// Error rows that carry no taxonomy name
const UNCLASSIFIED: &str = "Unclassified";

/// Counters for one share
#[derive(Debug, Clone, PartialEq)]
pub struct ShareTotals {
    pub share: ShareRoot,
    pub state: ShareState,
    pub folders_scanned: usize,
    pub files_scanned: usize,
    pub macros_found: usize,
    pub network_paths_found: usize,
    pub errors: usize,
    /// Error rows keyed by failure kind (`ContainerCorrupt`, `EncryptedDocument`, ...)
    pub errors_by_kind: BTreeMap<&'static str, usize>,
    pub abandoned: usize,
    pub report_path: Option<PathBuf>,
}

impl ShareTotals {
    fn new(share: ShareRoot) -> Self {
        Self {
            share,
            state: ShareState::Pending,
            folders_scanned: 0,
            files_scanned: 0,
            macros_found: 0,
            network_paths_found: 0,
            errors: 0,
            errors_by_kind: BTreeMap::new(),
            abandoned: 0,
            report_path: None,
        }
    }
}

/// Aggregate statistics of a run.
///
/// Owned by the coordinator loop and updated only after a row has been
/// written, so the summary never counts a result that is missing from a report.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    started_at: DateTime<Local>,
    finished_at: Option<DateTime<Local>>,
    worker_count: usize,
    shares: Vec<ShareTotals>,
    cancelled: bool,
}

impl ScanSummary {
    pub fn new(shares: &[ShareRoot], worker_count: usize, started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            finished_at: None,
            worker_count,
            shares: shares.iter().cloned().map(ShareTotals::new).collect(),
            cancelled: false,
        }
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn shares(&self) -> &[ShareTotals] {
        &self.shares
    }

    pub fn share(&self, share: &ShareRoot) -> Option<&ShareTotals> {
        self.shares.iter().find(|t| &t.share == share)
    }

    fn share_mut(&mut self, share: &ShareRoot) -> Option<&mut ShareTotals> {
        self.shares.iter_mut().find(|t| &t.share == share)
    }

    /// Count one durably recorded result
    pub fn record_result(&mut self, share: &ShareRoot, result: &ScanResult) {
        let Some(totals) = self.share_mut(share) else {
            return;
        };
        totals.files_scanned += 1;
        match result.status {
            ScanStatus::Found => {
                totals.macros_found += 1;
                if result.has_network_path() {
                    totals.network_paths_found += 1;
                }
            }
            ScanStatus::NotFound => {}
            ScanStatus::Error => {
                totals.errors += 1;
                let kind = result.error_kind.unwrap_or(UNCLASSIFIED);
                *totals.errors_by_kind.entry(kind).or_default() += 1;
            }
        }
    }

    pub fn add_folders(&mut self, share: &ShareRoot, count: usize) {
        if let Some(totals) = self.share_mut(share) {
            totals.folders_scanned += count;
        }
    }

    pub fn set_state(&mut self, share: &ShareRoot, state: ShareState) {
        if let Some(totals) = self.share_mut(share) {
            totals.state = state;
        }
    }

    pub fn set_report_path(&mut self, share: &ShareRoot, path: PathBuf) {
        if let Some(totals) = self.share_mut(share) {
            totals.report_path = Some(path);
        }
    }

    pub fn add_abandoned(&mut self, share: &ShareRoot, count: usize) {
        if let Some(totals) = self.share_mut(share) {
            totals.abandoned += count;
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn finish(&mut self, at: DateTime<Local>) {
        self.finished_at = Some(at);
    }

    pub fn elapsed(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Local::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    pub fn folders_scanned(&self) -> usize {
        self.shares.iter().map(|t| t.folders_scanned).sum()
    }

    pub fn files_scanned(&self) -> usize {
        self.shares.iter().map(|t| t.files_scanned).sum()
    }

    pub fn macros_found(&self) -> usize {
        self.shares.iter().map(|t| t.macros_found).sum()
    }

    pub fn network_paths_found(&self) -> usize {
        self.shares.iter().map(|t| t.network_paths_found).sum()
    }

    pub fn errors(&self) -> usize {
        self.shares.iter().map(|t| t.errors).sum()
    }

    /// Run-wide error counts per failure kind
    pub fn errors_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut merged = BTreeMap::new();
        for totals in &self.shares {
            for (kind, count) in &totals.errors_by_kind {
                *merged.entry(*kind).or_default() += count;
            }
        }
        merged
    }

    pub fn abandoned(&self) -> usize {
        self.shares.iter().map(|t| t.abandoned).sum()
    }

    pub fn unreachable_shares(&self) -> usize {
        self.shares
            .iter()
            .filter(|t| matches!(t.state, ShareState::Failed(_)))
            .count()
    }

    /// Text of the aggregate summary log
    pub fn render(&self) -> String {
        let mut out = String::new();
        let finished = self
            .finished_at
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());

        let _ = writeln!(out, "MacroScan summary");
        let _ = writeln!(out, "Started:  {}", self.started_at.format(TIMESTAMP_FORMAT));
        let _ = writeln!(out, "Finished: {finished}");
        let _ = writeln!(out, "Elapsed:  {}", format_duration(self.elapsed()));
        let _ = writeln!(out, "Workers:  {}", self.worker_count);
        if self.cancelled {
            let _ = writeln!(out, "Run cancelled before all shares drained");
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Totals");
        let _ = writeln!(out, "  Shares:              {}", self.shares.len());
        let _ = writeln!(out, "  Unreachable shares:  {}", self.unreachable_shares());
        let _ = writeln!(out, "  Folders scanned:     {}", self.folders_scanned());
        let _ = writeln!(out, "  Files scanned:       {}", self.files_scanned());
        let _ = writeln!(out, "  Macros found:        {}", self.macros_found());
        let _ = writeln!(out, "  Network paths found: {}", self.network_paths_found());
        let _ = writeln!(out, "  Errors:              {}", self.errors());
        for (kind, count) in self.errors_by_kind() {
            let _ = writeln!(out, "    {kind}: {count}");
        }
        let _ = writeln!(out, "  Abandoned:           {}", self.abandoned());
        let _ = writeln!(out);

        let _ = writeln!(out, "Shares");
        for totals in &self.shares {
            match &totals.state {
                ShareState::Failed(reason) => {
                    let _ = writeln!(
                        out,
                        "  {} UNREACHABLE (UnreachableShare: {})",
                        totals.share, reason
                    );
                }
                state => {
                    let _ = write!(
                        out,
                        "  {} {} folders={} files={} macros={} network_paths={} errors={} abandoned={}",
                        totals.share,
                        state.label(),
                        totals.folders_scanned,
                        totals.files_scanned,
                        totals.macros_found,
                        totals.network_paths_found,
                        totals.errors,
                        totals.abandoned
                    );
                    if let Some(report) = totals.report_path.as_ref().and_then(|p| p.file_name()) {
                        let _ = write!(out, " report={}", report.to_string_lossy());
                    }
                    let _ = writeln!(out);
                    if !totals.errors_by_kind.is_empty() {
                        let causes: Vec<String> = totals
                            .errors_by_kind
                            .iter()
                            .map(|(kind, count)| format!("{kind}={count}"))
                            .collect();
                        let _ = writeln!(out, "    errors by cause: {}", causes.join(" "));
                    }
                }
            }
        }
        out
    }
}

/// `HH:MM:SS`
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
