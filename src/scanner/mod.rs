pub mod classify;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod patterns;
pub mod types;
pub mod walker;

// Re-export main types for easier access
pub use classify::{Classification, classify, is_candidate};
pub use coordinator::{CancelToken, Coordinator, RunOutcome, ScanProgress, scan_file};
pub use error::ScanError;
pub use extract::{MacroModule, extract};
pub use patterns::{NetworkPattern, NetworkPatterns, find_network_path};
pub use types::{ContainerKind, DocumentType, ScanResult, ScanStatus, ScanTask, ShareRoot, ShareState};
pub use walker::{InaccessibleCause, WalkItem, WalkOptions, open_root, walk};
