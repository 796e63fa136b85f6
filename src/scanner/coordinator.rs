//! Concurrent scan engine.
//!
//! # Thread layout
//!
//! ```text
//!  shares ──▶ walker threads ──▶ bounded task queue ──▶ worker threads
//!                  │                                        │
//!                  └────────────── events ◀─────────────────┘
//!                                    │
//!                          coordinator loop (this thread)
//! ```
//!
//! Walkers open each share root, create its report and enumerate candidates
//! into a bounded queue of `worker_count * queue_depth_per_worker` tasks.
//! Workers scan one file at a time, append the row through the
//! [`ReportWriter`] and then acknowledge it. The coordinator loop is the only
//! place that touches the [`ScanSummary`]: it counts acknowledged rows, moves
//! each share through its [`ShareState`]s and finalizes a share's report once
//! the walker is done and every dispatched task has been acknowledged.
//! A [`ScanProgress`] observer sees each step from that same loop.

use super::classify::classify;
use super::extract::extract;
use super::patterns::NetworkPatterns;
use super::types::{DocumentType, ScanResult, ScanTask, ShareRoot, ShareState};
use super::walker::{self, WalkItem, WalkOptions};
use crate::config::ScanConfig;
use crate::report::{ReportWriter, ScanSummary, ShareOutcome, ShareTotals};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Local};
use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace, warn};

/// Shared stop flag, set from the Ctrl-C handler or on a fatal write error
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer of a running scan.
///
/// Every call comes from the coordinator loop, after the summary has been
/// updated, so implementations see counts that match the reports on disk.
pub trait ScanProgress: Send + Sync {
    fn share_started(&self, _share: &ShareRoot) {}

    fn file_recorded(&self, _result: &ScanResult, _summary: &ScanSummary) {}

    fn share_finished(&self, _totals: &ShareTotals) {}

    fn run_finished(&self, _summary: &ScanSummary) {}
}

struct NoProgress;

impl ScanProgress for NoProgress {}

/// Everything a finished run leaves behind
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: ScanSummary,
    pub summary_log: PathBuf,
}

enum Event {
    Enumerating(ShareRoot),
    Unreachable { share: ShareRoot, reason: String },
    Recorded { share: ShareRoot, result: ScanResult },
    Abandoned(ShareRoot),
    WalkDone { share: ShareRoot, stats: WalkStats },
    Fatal(anyhow::Error),
}

/// What one walker pass over a share produced
#[derive(Debug, Clone, Copy, Default)]
struct WalkStats {
    /// Tasks queued plus synthetic rows written for skipped subtrees
    dispatched: usize,
    folders: usize,
    /// Enumeration stopped before the walk was exhausted
    interrupted: bool,
}

#[derive(Debug, Default)]
struct ShareProgress {
    dispatched: Option<usize>,
    recorded: usize,
    abandoned: usize,
    interrupted: bool,
}

impl ShareProgress {
    fn is_drained(&self) -> bool {
        self.dispatched == Some(self.recorded + self.abandoned)
    }
}

pub struct Coordinator {
    config: ScanConfig,
    patterns: NetworkPatterns,
    writer: ReportWriter,
    cancel: CancelToken,
    progress: Box<dyn ScanProgress>,
    started_at: DateTime<Local>,
}

impl Coordinator {
    pub fn new(config: ScanConfig, cancel: CancelToken) -> Result<Self> {
        config.validate()?;
        let patterns = NetworkPatterns::new(&config.extra_patterns)?;
        debug!("Network patterns: {}", patterns.names().join(", "));
        let started_at = Local::now();
        let writer = ReportWriter::new(&config.output_dir, started_at, config.report_options())?;
        Ok(Self {
            config,
            patterns,
            writer,
            cancel,
            progress: Box::new(NoProgress),
            started_at,
        })
    }

    pub fn with_progress(mut self, progress: impl ScanProgress + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Scan every share and write all run artifacts.
    ///
    /// Per-file and per-share failures are recorded and do not fail the run.
    /// An error is returned only when an output artifact cannot be written.
    pub fn run(&self, shares: &[ShareRoot]) -> Result<RunOutcome> {
        let mut seen = HashSet::new();
        let shares: Vec<ShareRoot> = shares
            .iter()
            .filter(|s| seen.insert((*s).clone()))
            .cloned()
            .collect();

        let workers = self.config.workers();
        let walkers = self.config.walker_threads.min(shares.len()).max(1);
        info!(
            "Scanning {} share(s) with {} worker(s), {} walker(s), queue capacity {}",
            shares.len(),
            workers,
            walkers,
            self.config.queue_capacity()
        );

        let mut summary = ScanSummary::new(&shares, workers, self.started_at);

        let (share_tx, share_rx) = unbounded::<ShareRoot>();
        for share in &shares {
            // Receiver is alive, send cannot fail
            let _ = share_tx.send(share.clone());
        }
        drop(share_tx);

        let (task_tx, task_rx) = bounded::<ScanTask>(self.config.queue_capacity());
        let (event_tx, event_rx) = unbounded::<Event>();

        let fatal = crossbeam::thread::scope(|s| {
            for walker_id in 0..walkers {
                let share_rx = share_rx.clone();
                let task_tx = task_tx.clone();
                let event_tx = event_tx.clone();
                s.spawn(move |_| self.walker_loop(walker_id, share_rx, task_tx, event_tx));
            }

            for worker_id in 0..workers {
                let task_rx = task_rx.clone();
                let event_tx = event_tx.clone();
                s.spawn(move |_| self.worker_loop(worker_id, task_rx, event_tx));
            }

            // Drop the originals so the channels close when the threads finish
            drop(task_tx);
            drop(task_rx);
            drop(event_tx);

            self.coordinate(event_rx, &mut summary)
        })
        .map_err(|_| anyhow!("Thread panic occurred during scan"))?;

        if let Some(err) = fatal {
            return Err(err);
        }

        for totals in summary.shares().to_vec() {
            if !totals.state.is_terminal() {
                summary.set_state(&totals.share, ShareState::Cancelled);
                self.writer
                    .record_outcome(&totals.share, &ShareOutcome::Cancelled)?;
            }
        }
        if self.cancel.is_cancelled() {
            summary.mark_cancelled();
        }
        summary.finish(Local::now());
        self.progress.run_finished(&summary);

        let summary_log = self.writer.write_summary(&summary)?;
        info!(
            "Scan finished: {} files, {} with macros, {} with network paths, {} errors",
            summary.files_scanned(),
            summary.macros_found(),
            summary.network_paths_found(),
            summary.errors()
        );
        Ok(RunOutcome {
            summary,
            summary_log,
        })
    }

    /// Single aggregation point. Returns the first fatal error, if any.
    fn coordinate(&self, events: Receiver<Event>, summary: &mut ScanSummary) -> Option<anyhow::Error> {
        let mut progress: HashMap<ShareRoot, ShareProgress> = HashMap::new();
        let mut fatal: Option<anyhow::Error> = None;
        let mut total_recorded = 0usize;

        while let Ok(event) = events.recv() {
            let touched = match event {
                Event::Enumerating(share) => {
                    info!("Started scanning share: {}", share);
                    summary.set_state(&share, ShareState::Enumerating);
                    self.progress.share_started(&share);
                    progress.entry(share).or_default();
                    None
                }
                Event::Unreachable { share, reason } => {
                    warn!("Share unreachable: {}", reason);
                    summary.set_state(&share, ShareState::Failed(reason.clone()));
                    if let Some(totals) = summary.share(&share) {
                        self.progress.share_finished(totals);
                    }
                    if let Err(e) = self.writer.record_outcome(&share, &ShareOutcome::Failed(reason)) {
                        self.fail(&mut fatal, e);
                    }
                    None
                }
                Event::Recorded { share, result } => {
                    summary.record_result(&share, &result);
                    self.progress.file_recorded(&result, summary);
                    total_recorded += 1;
                    let interval = self.config.progress_interval;
                    if interval > 0 && total_recorded % interval == 0 {
                        info!(
                            "Progress: {} files scanned ({} with macros, {} errors, elapsed {})",
                            summary.files_scanned(),
                            summary.macros_found(),
                            summary.errors(),
                            crate::report::summary::format_duration(summary.elapsed())
                        );
                    }
                    progress.entry(share.clone()).or_default().recorded += 1;
                    Some(share)
                }
                Event::Abandoned(share) => {
                    summary.add_abandoned(&share, 1);
                    progress.entry(share.clone()).or_default().abandoned += 1;
                    Some(share)
                }
                Event::WalkDone { share, stats } => {
                    debug!(
                        "Enumeration of {} done: {} task(s) from {} folder(s)",
                        share, stats.dispatched, stats.folders
                    );
                    summary.set_state(&share, ShareState::Draining);
                    summary.add_folders(&share, stats.folders);
                    let entry = progress.entry(share.clone()).or_default();
                    entry.dispatched = Some(stats.dispatched);
                    entry.interrupted = stats.interrupted;
                    Some(share)
                }
                Event::Fatal(e) => {
                    self.fail(&mut fatal, e);
                    None
                }
            };

            let Some(share) = touched else { continue };
            if !progress.get(&share).is_some_and(ShareProgress::is_drained) {
                continue;
            }
            if let Some(done) = progress.remove(&share) {
                if let Err(e) = self.complete_share(&share, &done, summary) {
                    self.fail(&mut fatal, e);
                }
            }
        }

        for share in progress.keys() {
            warn!("Share {} did not drain; report left as partial", share);
        }
        fatal
    }

    fn complete_share(&self, share: &ShareRoot, done: &ShareProgress, summary: &mut ScanSummary) -> Result<()> {
        let report = self.writer.finalize_share(share)?;
        summary.set_report_path(share, report);

        let (state, outcome) = if done.interrupted || done.abandoned > 0 {
            (ShareState::Cancelled, ShareOutcome::Cancelled)
        } else {
            (ShareState::Complete, ShareOutcome::Success)
        };
        match state {
            ShareState::Complete => info!("Successfully completed scan for {}", share),
            _ => warn!("Scan of {} cancelled ({} task(s) abandoned)", share, done.abandoned),
        }
        summary.set_state(share, state);
        if let Some(totals) = summary.share(share) {
            self.progress.share_finished(totals);
        }
        self.writer.record_outcome(share, &outcome)
    }

    fn fail(&self, fatal: &mut Option<anyhow::Error>, err: anyhow::Error) {
        error!("Fatal: {:#}", err);
        self.cancel.cancel();
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    fn walker_loop(
        &self,
        walker_id: usize,
        shares: Receiver<ShareRoot>,
        tasks: Sender<ScanTask>,
        events: Sender<Event>,
    ) {
        let options = self.config.walk_options();
        while let Ok(share) = shares.recv() {
            if self.cancel.is_cancelled() {
                break;
            }
            debug!("[walker-{}] opening {}", walker_id, share);
            if let Err(e) = walker::open_root(&share) {
                let _ = events.send(Event::Unreachable {
                    share,
                    reason: e.to_string(),
                });
                continue;
            }
            if let Err(e) = self.writer.open_share(&share) {
                let _ = events.send(Event::Fatal(e));
                break;
            }
            let _ = events.send(Event::Enumerating(share.clone()));

            let stats = self.enumerate(&share, &options, &tasks, &events);
            let _ = events.send(Event::WalkDone { share, stats });
        }
    }

    /// Feed one share's candidates into the task queue
    fn enumerate(
        &self,
        share: &ShareRoot,
        options: &WalkOptions,
        tasks: &Sender<ScanTask>,
        events: &Sender<Event>,
    ) -> WalkStats {
        let mut stats = WalkStats::default();
        let mut share_walk = walker::walk(share, options);
        for item in share_walk.by_ref() {
            if self.cancel.is_cancelled() {
                stats.interrupted = true;
                break;
            }
            match item {
                WalkItem::Candidate(path) => {
                    let task = ScanTask {
                        share: share.clone(),
                        path,
                    };
                    if tasks.send(task).is_err() {
                        stats.interrupted = true;
                        break;
                    }
                    stats.dispatched += 1;
                }
                WalkItem::Inaccessible { path, cause } => {
                    let err = cause.into_error(path.clone());
                    let result = ScanResult::failed(path, DocumentType::Unknown, None, &err);
                    if let Err(e) = self.writer.record(share, &result) {
                        let _ = events.send(Event::Fatal(e));
                        stats.interrupted = true;
                        break;
                    }
                    stats.dispatched += 1;
                    let _ = events.send(Event::Recorded {
                        share: share.clone(),
                        result,
                    });
                }
            }
        }
        stats.folders = share_walk.directories();
        stats
    }

    fn worker_loop(&self, worker_id: usize, tasks: Receiver<ScanTask>, events: Sender<Event>) {
        while let Ok(task) = tasks.recv() {
            // Keep draining after cancellation so walkers blocked on a full
            // queue can observe the flag and stop.
            if self.cancel.is_cancelled() {
                let _ = events.send(Event::Abandoned(task.share));
                continue;
            }

            trace!("[worker-{}] scanning {}", worker_id, task.path.display());
            let result = scan_file(&task.path, &self.patterns, self.config.all_matches);
            match self.writer.record(&task.share, &result) {
                Ok(()) => {
                    let _ = events.send(Event::Recorded {
                        share: task.share,
                        result,
                    });
                }
                Err(e) => {
                    self.cancel.cancel();
                    let _ = events.send(Event::Fatal(e));
                    let _ = events.send(Event::Abandoned(task.share));
                }
            }
        }
    }
}

/// Classify, extract and match one file. Never fails: problems become an
/// `Error` row carrying the reason.
pub fn scan_file(path: &Path, patterns: &NetworkPatterns, all_matches: bool) -> ScanResult {
    let file_path = path.to_path_buf();
    let Some(class) = classify(path) else {
        return ScanResult::error(file_path, DocumentType::Unknown, None, "unsupported file extension");
    };

    let last_modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Local>::from);

    let modules = match extract(path, class.container) {
        Ok(modules) => modules,
        Err(e) => {
            warn!("Failed to scan {}: {}", path.display(), e);
            return ScanResult::failed(file_path, class.document_type, last_modified, &e);
        }
    };

    if modules.is_empty() {
        trace!("No macros in {}", path.display());
        return ScanResult::not_found(file_path, class.document_type, last_modified);
    }

    let blobs: Vec<&str> = modules.iter().map(|m| m.source.as_str()).collect();
    let found = if all_matches {
        patterns.find_all_network_paths(&blobs).join("; ")
    } else {
        patterns.find_network_path(&blobs).unwrap_or_default()
    };
    if !found.is_empty() {
        debug!("Network path in {}: {}", path.display(), found);
    }
    ScanResult::found(file_path, class.document_type, last_modified, found)
}
