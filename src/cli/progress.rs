//! Live spinner on stderr while shares are scanned

use crate::report::{ScanSummary, ShareTotals};
use crate::scanner::{ScanProgress, ScanResult, ShareRoot};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(120);

pub struct ScanSpinner {
    bar: ProgressBar,
}

impl ScanSpinner {
    /// A spinner that only draws when `visible` and stderr is a terminal
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if visible {
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.enable_steady_tick(TICK);
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {prefix} {pos} files scanned, {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_message(describe(0, 0, 0));
        Self { bar }
    }

    pub fn is_hidden(&self) -> bool {
        self.bar.is_hidden()
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ScanProgress for ScanSpinner {
    fn share_started(&self, share: &ShareRoot) {
        self.bar.set_prefix(share.to_string());
    }

    fn file_recorded(&self, _result: &ScanResult, summary: &ScanSummary) {
        self.bar.set_position(summary.files_scanned() as u64);
        self.bar.set_message(describe(
            summary.macros_found(),
            summary.network_paths_found(),
            summary.errors(),
        ));
    }

    fn share_finished(&self, totals: &ShareTotals) {
        if !self.bar.is_hidden() {
            self.bar.println(format!(
                "  {} {}: {} files in {} folders",
                totals.share,
                totals.state.label().to_lowercase(),
                totals.files_scanned,
                totals.folders_scanned
            ));
        }
    }

    fn run_finished(&self, _summary: &ScanSummary) {
        self.bar.finish_and_clear();
    }
}

fn describe(macros: usize, network_paths: usize, errors: usize) -> String {
    format!("{macros} with macros, {network_paths} network paths, {errors} errors")
}
