//! Run output: per-share CSV reports, the aggregate summary log and the
//! share outcome logs.

pub mod outcomes;
pub mod summary;
pub mod writer;

pub use outcomes::{ShareOutcome, ShareOutcomeLog};
pub use summary::{ScanSummary, ShareTotals};
pub use writer::{REPORT_HEADER, ReportOptions, ReportWriter, ShareReportHandle};
