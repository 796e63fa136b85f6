//! Configuration management for macroscan
//!
//! Settings are layered with figment: embedded defaults, then `macroscan.toml`
//! (or an explicit `--config` file), then `MACROSCAN_*` environment variables,
//! then command-line flags.

pub mod core;
pub mod shares;

pub use core::{ConfigOverrides, ScanConfig};
pub use shares::{parse_share_list, read_share_list};
