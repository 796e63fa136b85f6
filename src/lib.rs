//! # macroscan - VBA macro network path auditor
//!
//! Scans file shares for Word, Excel and PowerPoint documents, extracts any
//! embedded VBA macro source and reports hard-coded network locations such as
//! `\\server\share` or `Z:\finance`.
//!
//! ## Pipeline
//!
//! ```text
//! shares → walker → classifier → extractor → matcher → report writer
//! ```
//!
//! - [`scanner::walker`] lazily enumerates candidate documents per share
//! - [`scanner::classify`] maps extensions to document type and container
//! - [`scanner::extract`] decodes VBA projects from compound files and zip packages
//! - [`scanner::patterns`] finds UNC and mapped-drive paths in macro text
//! - [`scanner::coordinator`] runs the worker pool and owns the run summary
//! - [`report`] writes per-share CSV reports and the summary log
//!
//! ## Quick Start
//!
//! ```bash
//! macroscan --shares shares.txt --output reports --threads 8
//! ```

pub mod cli;
pub mod config;
pub mod report;
pub mod scanner;

pub use cli::{Cli, Output};
pub use config::ScanConfig;

/// Result type alias for macroscan operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
