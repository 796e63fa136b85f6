use crate::scanner::types::ShareRoot;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Read the share list file.
///
/// One root per line. Blank lines and `#` comments are skipped and duplicate
/// roots (after normalization) keep their first position.
pub fn read_share_list(path: &Path) -> Result<Vec<ShareRoot>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read share list {}", path.display()))?;
    Ok(parse_share_list(&content))
}

pub fn parse_share_list(content: &str) -> Vec<ShareRoot> {
    let mut seen = HashSet::new();
    let mut shares = Vec::new();
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let share = ShareRoot::new(line);
        if seen.insert(share.clone()) {
            shares.push(share);
        } else {
            debug!("Ignoring duplicate share {}", share);
        }
    }
    shares
}
