use crate::report::ReportOptions;
use crate::scanner::patterns::NetworkPatterns;
use crate::scanner::walker::WalkOptions;
use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Project config file looked up in the working directory
pub const PROJECT_CONFIG: &str = "macroscan.toml";

pub const ENV_PREFIX: &str = "MACROSCAN_";

/// Settings for one run, resolved before the engine starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Newline-delimited list of share roots
    pub shares_file: Option<PathBuf>,

    /// Destination for reports and logs
    pub output_dir: PathBuf,

    /// Size of the worker pool. Unset means "ask, or use 1".
    pub worker_count: Option<usize>,

    pub queue_depth_per_worker: usize,
    pub walker_threads: usize,
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
    pub all_matches: bool,
    pub extra_patterns: Vec<String>,
    pub sort_reports: bool,
    pub sync_rows: bool,
    pub progress_interval: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            shares_file: None,
            output_dir: PathBuf::from("reports"),
            worker_count: None,
            queue_depth_per_worker: 2,
            walker_threads: 1,
            follow_symlinks: false,
            max_depth: None,
            all_matches: false,
            extra_patterns: Vec::new(),
            sort_reports: true,
            sync_rows: false,
            progress_interval: 100,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,
}

impl ScanConfig {
    /// Load defaults, then the config file, then the environment, then `overrides`
    pub fn load(custom_config: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        if let Some(path) = custom_config {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        } else {
            figment = figment.merge(Toml::file(PROJECT_CONFIG));
        }

        figment = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides));

        let config: ScanConfig = figment.extract().context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == Some(0) {
            bail!("worker_count must be at least 1");
        }
        if self.queue_depth_per_worker == 0 {
            bail!("queue_depth_per_worker must be at least 1");
        }
        if self.walker_threads == 0 {
            bail!("walker_threads must be at least 1");
        }
        if self.max_depth == Some(0) {
            bail!("max_depth must be at least 1 when set");
        }
        NetworkPatterns::new(&self.extra_patterns)?;
        Ok(())
    }

    /// Worker count with the single-worker fallback applied
    pub fn workers(&self) -> usize {
        self.worker_count.unwrap_or(1)
    }

    pub fn queue_capacity(&self) -> usize {
        self.workers().saturating_mul(self.queue_depth_per_worker)
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            follow_symlinks: self.follow_symlinks,
            max_depth: self.max_depth,
        }
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            sort_reports: self.sort_reports,
            sync_rows: self.sync_rows,
        }
    }
}
