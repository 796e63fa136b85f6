//! Command-line interface for macroscan
//!
//! Resolves configuration, installs logging and the Ctrl-C handler, then
//! hands the share list to the scan engine.

use crate::config::{ConfigOverrides, ScanConfig, read_share_list};
use crate::scanner::{CancelToken, Coordinator};
use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::{Input, theme::ColorfulTheme};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};

pub mod output;
pub mod progress;

pub use output::Output;
pub use progress::ScanSpinner;

/// Exit status of a run interrupted with Ctrl-C
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "macroscan",
    version = env!("CARGO_PKG_VERSION"),
    about = "Scan network shares for Office macros that reference UNC paths or mapped drives",
    long_about = "Walks every share listed in the share file, extracts VBA macro source from \
                  Word, Excel and PowerPoint documents and reports each hard-coded network path. \
                  Writes one CSV report per share and a summary log."
)]
pub struct Cli {
    /// Newline-delimited list of share roots
    #[arg(short, long, value_name = "FILE")]
    pub shares: Option<PathBuf>,

    /// Directory for reports and logs
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Use custom configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn run(self) -> Result<ExitCode> {
        setup_logging(self.verbose, self.quiet);
        let output = Output::new(self.quiet);

        let overrides = ConfigOverrides {
            shares_file: self.shares.clone(),
            output_dir: self.output.clone(),
            worker_count: self.threads,
        };
        let mut config = ScanConfig::load(self.config.as_deref(), &overrides)?;

        if config.worker_count.is_none() && !self.quiet && console::user_attended() {
            config.worker_count = Some(prompt_worker_count()?);
        }

        let Some(shares_file) = config.shares_file.clone() else {
            bail!("No share list given; pass --shares FILE or set shares_file in the config");
        };
        let shares = read_share_list(&shares_file)?;
        if shares.is_empty() {
            output.warning(&format!("No shares listed in {}", shares_file.display()));
        }
        debug!("Resolved configuration: {:?}", config);

        let cancel = CancelToken::new();
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt received, finishing in-flight files");
            handler_token.cancel();
        })
        .context("Failed to install Ctrl-C handler")?;

        output.info(&format!(
            "Scanning {} share(s) with {} worker thread(s)",
            shares.len(),
            config.workers()
        ));

        let spinner = ScanSpinner::new(!self.quiet && console::user_attended_stderr());
        let coordinator = Coordinator::new(config, cancel.clone())?.with_progress(spinner);
        let outcome = coordinator.run(&shares)?;
        output.summary(&outcome.summary, &outcome.summary_log);

        if outcome.summary.is_cancelled() {
            output.warning("Scan cancelled; reports contain the files scanned before the interrupt");
            return Ok(ExitCode::from(EXIT_CANCELLED));
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn prompt_worker_count() -> Result<usize> {
    let count = Input::<usize>::with_theme(&ColorfulTheme::default())
        .with_prompt("Number of worker threads")
        .default(1)
        .validate_with(|n: &usize| -> Result<(), &'static str> {
            if *n >= 1 { Ok(()) } else { Err("Enter at least 1") }
        })
        .interact_text()?;
    Ok(count)
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info"),
            2 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
