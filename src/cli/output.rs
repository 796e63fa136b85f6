//! Styled console output for macroscan

use crate::report::ScanSummary;
use crate::report::summary::format_duration;
use crate::scanner::ShareState;
use console::style;
use std::path::Path;

/// Output handler for consistent CLI formatting
pub struct Output {
    quiet: bool,
}

impl Output {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), message);
        }
    }

    /// Errors are always shown, even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✖").red(), message);
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    /// Per-share lines followed by the run totals
    pub fn summary(&self, summary: &ScanSummary, log_path: &Path) {
        if self.quiet {
            return;
        }

        println!();
        for totals in summary.shares() {
            match &totals.state {
                ShareState::Complete => self.success(&format!(
                    "{} {} files, {} with macros, {} network paths",
                    style(&totals.share).bold(),
                    totals.files_scanned,
                    totals.macros_found,
                    style(totals.network_paths_found).yellow().bold()
                )),
                ShareState::Failed(reason) => {
                    self.error(&format!("{} unreachable: {}", style(&totals.share).bold(), reason))
                }
                state => self.warning(&format!(
                    "{} {} after {} files",
                    style(&totals.share).bold(),
                    state.label().to_lowercase(),
                    totals.files_scanned
                )),
            }
        }

        println!();
        println!(
            "{} {} files scanned across {} folders in {}",
            style("⚡").cyan(),
            style(summary.files_scanned()).bold(),
            summary.folders_scanned(),
            format_duration(summary.elapsed())
        );
        println!(
            "  {} {} with macros",
            style("•").cyan(),
            style(summary.macros_found()).yellow().bold()
        );
        println!(
            "  {} {} with network paths",
            style("•").cyan(),
            style(summary.network_paths_found()).yellow().bold()
        );
        if summary.errors() > 0 {
            println!("  {} {} errors", style("•").cyan(), style(summary.errors()).red().bold());
            for (kind, count) in summary.errors_by_kind() {
                println!("      {} {}", style(format!("{kind}:")).dim(), count);
            }
        }
        if summary.abandoned() > 0 {
            println!(
                "  {} {} abandoned",
                style("•").cyan(),
                style(summary.abandoned()).red().bold()
            );
        }
        self.info(&format!("Summary log: {}", log_path.display()));
    }
}
