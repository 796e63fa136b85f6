use std::path::PathBuf;
use thiserror::Error;

/// Recoverable scan failures.
///
/// None of these abort a run: file-level variants become `Error` rows, the
/// `Directory*` variants skip one subtree and `UnreachableShare` skips a
/// whole share and is reported in the summary log.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("share unreachable: {root}: {reason}")]
    UnreachableShare { root: String, reason: String },

    #[error("directory access denied: {}: {reason}", path.display())]
    DirectoryAccessDenied { path: PathBuf, reason: String },

    #[error("filesystem loop: {} leads back to {}", path.display(), ancestor.display())]
    DirectoryLoop { path: PathBuf, ancestor: PathBuf },

    #[error("directory unreadable: {}: {reason}", path.display())]
    DirectoryUnreadable { path: PathBuf, reason: String },

    #[error("failed to open file: {0}")]
    FileOpenFailed(#[from] std::io::Error),

    #[error("container corrupt: {0}")]
    ContainerCorrupt(String),

    #[error("encrypted document: {0}")]
    EncryptedDocument(String),

    #[error("failed to decode macro project: {0}")]
    MacroDecodeFailed(String),
}

impl ScanError {
    /// Short taxonomy name used in logs and summary markers
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::UnreachableShare { .. } => "UnreachableShare",
            ScanError::DirectoryAccessDenied { .. } => "DirectoryAccessDenied",
            ScanError::DirectoryLoop { .. } => "DirectoryLoop",
            ScanError::DirectoryUnreadable { .. } => "DirectoryUnreadable",
            ScanError::FileOpenFailed(_) => "FileOpenFailed",
            ScanError::ContainerCorrupt(_) => "ContainerCorrupt",
            ScanError::EncryptedDocument(_) => "EncryptedDocument",
            ScanError::MacroDecodeFailed(_) => "MacroDecodeFailed",
        }
    }
}
