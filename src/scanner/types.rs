use super::error::ScanError;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A top-level share path the operator wants scanned.
///
/// Identity is the normalized string form: surrounding whitespace trimmed and
/// trailing separators removed (a bare root such as `\\` or `/` is kept).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShareRoot {
    normalized: Arc<str>,
}

impl ShareRoot {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let stripped = trimmed.trim_end_matches(['\\', '/']);
        let normalized = if stripped.is_empty() { trimmed } else { stripped };
        Self {
            normalized: Arc::from(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn path(&self) -> &Path {
        Path::new(self.as_str())
    }

    /// Last two path segments joined with `-`, used to name per-share reports.
    pub fn identifier(&self) -> String {
        let segments: Vec<&str> = self
            .normalized
            .split(['\\', '/'])
            .filter(|s| !s.is_empty())
            .collect();
        let tail = if segments.len() >= 2 {
            &segments[segments.len() - 2..]
        } else {
            &segments[..]
        };
        let joined = tail.join("-");
        let sanitized: String = joined
            .chars()
            .map(|c| match c {
                ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        if sanitized.is_empty() {
            "share".to_string()
        } else {
            sanitized
        }
    }
}

impl fmt::Display for ShareRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Kind of Office application a document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Word,
    Excel,
    PowerPoint,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Word => "Word",
            DocumentType::Excel => "Excel",
            DocumentType::PowerPoint => "PowerPoint",
            DocumentType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical container format of a document, resolved once from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// OLE compound file (`.doc`, `.xls`, `.ppt` and their templates)
    LegacyBinary,
    /// OOXML zip package (`.docm`, `.xlsx`, ...)
    ZipBased,
}

/// Lifecycle of one share within a run.
///
/// `Pending → Enumerating → Draining → Complete`, with `Failed` when the root
/// cannot be opened and `Cancelled` when the run stops before the share drains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareState {
    Pending,
    Enumerating,
    Draining,
    Complete,
    Failed(String),
    Cancelled,
}

impl ShareState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShareState::Complete | ShareState::Failed(_) | ShareState::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShareState::Pending => "PENDING",
            ShareState::Enumerating => "ENUMERATING",
            ShareState::Draining => "DRAINING",
            ShareState::Complete => "COMPLETE",
            ShareState::Failed(_) => "UNREACHABLE",
            ShareState::Cancelled => "CANCELLED",
        }
    }
}

/// A single file queued for scanning.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub share: ShareRoot,
    pub path: PathBuf,
}

/// Outcome classification of one scanned file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    /// The document carries macros (a network path may or may not have been found)
    Found,
    /// The document has no macro project
    NotFound,
    /// The file could not be scanned; see the result's reason
    Error,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Found => "Found",
            ScanStatus::NotFound => "NotFound",
            ScanStatus::Error => "Error",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a share report. Produced exactly once per task.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub file_path: PathBuf,
    pub status: ScanStatus,
    pub last_modified: Option<DateTime<Local>>,
    pub document_type: DocumentType,
    /// Matched network path text, empty when nothing matched
    pub found_string: String,
    /// Failure reason for `ScanStatus::Error`, empty otherwise
    pub reason: String,
    /// Taxonomy name of the failure, when it came from a [`ScanError`]
    pub error_kind: Option<&'static str>,
}

impl ScanResult {
    pub fn found(
        file_path: PathBuf,
        document_type: DocumentType,
        last_modified: Option<DateTime<Local>>,
        found_string: String,
    ) -> Self {
        Self {
            file_path,
            status: ScanStatus::Found,
            last_modified,
            document_type,
            found_string,
            reason: String::new(),
            error_kind: None,
        }
    }

    pub fn not_found(
        file_path: PathBuf,
        document_type: DocumentType,
        last_modified: Option<DateTime<Local>>,
    ) -> Self {
        Self {
            file_path,
            status: ScanStatus::NotFound,
            last_modified,
            document_type,
            found_string: String::new(),
            reason: String::new(),
            error_kind: None,
        }
    }

    pub fn error(
        file_path: PathBuf,
        document_type: DocumentType,
        last_modified: Option<DateTime<Local>>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            file_path,
            status: ScanStatus::Error,
            last_modified,
            document_type,
            found_string: String::new(),
            reason: reason.into(),
            error_kind: None,
        }
    }

    /// Error row for a typed failure; the reason reads `<kind>: <message>`
    pub fn failed(
        file_path: PathBuf,
        document_type: DocumentType,
        last_modified: Option<DateTime<Local>>,
        err: &ScanError,
    ) -> Self {
        let mut result = Self::error(
            file_path,
            document_type,
            last_modified,
            format!("{}: {}", err.kind(), err),
        );
        result.error_kind = Some(err.kind());
        result
    }

    /// Whether a network path was detected in the macro source
    pub fn has_network_path(&self) -> bool {
        self.status == ScanStatus::Found && !self.found_string.is_empty()
    }
}
