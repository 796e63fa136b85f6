//! Lazy traversal of one share root.
//!
//! [`walk`] wraps a `walkdir` iterator: entries are produced on demand, so
//! memory stays proportional to directory depth rather than share size.
//! Unreadable subtrees are reported as [`WalkItem::Inaccessible`] and
//! traversal carries on with their siblings.

use super::classify::is_candidate;
use super::error::ScanError;
use super::types::ShareRoot;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Traversal options taken from the scan configuration
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
}

/// One item produced while walking a share
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkItem {
    /// A file whose extension marks it as an Office document
    Candidate(PathBuf),
    /// A directory (or link loop) that could not be traversed
    Inaccessible { path: PathBuf, cause: InaccessibleCause },
}

/// Why a subtree was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InaccessibleCause {
    PermissionDenied(String),
    Loop { ancestor: PathBuf },
    Unreadable(String),
}

impl InaccessibleCause {
    fn from_walk_error(err: &walkdir::Error) -> Self {
        if let Some(ancestor) = err.loop_ancestor() {
            return InaccessibleCause::Loop {
                ancestor: ancestor.to_path_buf(),
            };
        }
        match err.io_error() {
            Some(io) if io.kind() == io::ErrorKind::PermissionDenied => {
                InaccessibleCause::PermissionDenied(io.to_string())
            }
            Some(io) => InaccessibleCause::Unreadable(io.to_string()),
            None => InaccessibleCause::Unreadable(err.to_string()),
        }
    }

    /// The error recorded in the share report for the skipped subtree
    pub fn into_error(self, path: PathBuf) -> ScanError {
        match self {
            InaccessibleCause::PermissionDenied(reason) => {
                ScanError::DirectoryAccessDenied { path, reason }
            }
            InaccessibleCause::Loop { ancestor } => ScanError::DirectoryLoop { path, ancestor },
            InaccessibleCause::Unreadable(reason) => ScanError::DirectoryUnreadable { path, reason },
        }
    }
}

/// Confirm the share root exists, is a directory and can be listed
pub fn open_root(root: &ShareRoot) -> Result<(), ScanError> {
    let unreachable = |reason: String| ScanError::UnreachableShare {
        root: root.to_string(),
        reason,
    };

    let metadata = fs::metadata(root.path()).map_err(|e| unreachable(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(unreachable("not a directory".to_string()));
    }
    fs::read_dir(root.path()).map_err(|e| unreachable(e.to_string()))?;
    Ok(())
}

/// Walk `root`, yielding candidate documents and inaccessible subtrees
pub fn walk(root: &ShareRoot, options: &WalkOptions) -> ShareWalk {
    let mut walker = WalkDir::new(root.path()).follow_links(options.follow_symlinks);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }
    debug!(
        "Walking {} (follow_symlinks: {}, max_depth: {:?})",
        root, options.follow_symlinks, options.max_depth
    );
    ShareWalk {
        inner: walker.into_iter(),
        directories: 0,
    }
}

/// Iterator returned by [`walk`]
pub struct ShareWalk {
    inner: walkdir::IntoIter,
    directories: usize,
}

impl ShareWalk {
    /// Directories entered so far, the share root included
    pub fn directories(&self) -> usize {
        self.directories
    }
}

impl Iterator for ShareWalk {
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    if entry.file_type().is_dir() {
                        self.directories += 1;
                        continue;
                    }
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if is_candidate(entry.path()) {
                        trace!("Candidate: {}", entry.path().display());
                        return Some(WalkItem::Candidate(entry.into_path()));
                    }
                }
                Err(err) => {
                    let path = err.path().map(PathBuf::from).unwrap_or_default();
                    let cause = InaccessibleCause::from_walk_error(&err);
                    warn!("Skipping {}: {:?}", path.display(), cause);
                    return Some(WalkItem::Inaccessible { path, cause });
                }
            }
        }
    }
}
