//! Network path detection in macro source text.
//!
//! Two built-in grammars are recognised:
//! - UNC paths: `\\host\share` optionally followed by more `\segment`s
//! - Mapped drive paths: `Z:\segment` optionally followed by more segments
//!
//! Matching is case-insensitive and deterministic: the first match in blob
//! order wins, ties inside a blob are broken by position.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;

/// Characters allowed in one path segment: anything except separators,
/// whitespace and characters Windows forbids in file names.
const SEGMENT: &str = r#"[^\\/\s:*?"<>|]+"#;

lazy_static! {
    static ref UNC_PATH: Regex = Regex::new(&format!(
        r"(?i)\\\\{SEGMENT}\\{SEGMENT}(?:\\{SEGMENT})*\\?"
    ))
    .expect("built-in UNC pattern is valid");
    static ref DRIVE_PATH: Regex = Regex::new(&format!(
        r"(?i)\b[A-Z]:\\{SEGMENT}(?:\\{SEGMENT})*\\?"
    ))
    .expect("built-in drive pattern is valid");
}

/// A named network path pattern
#[derive(Debug, Clone)]
pub struct NetworkPattern {
    pub name: String,
    pub regex: Regex,
}

/// The set of patterns searched in every macro blob
#[derive(Debug, Clone)]
pub struct NetworkPatterns {
    patterns: Vec<NetworkPattern>,
}

impl Default for NetworkPatterns {
    fn default() -> Self {
        Self {
            patterns: Self::predefined_patterns(),
        }
    }
}

impl NetworkPatterns {
    /// Built-in grammars plus operator-supplied regexes.
    ///
    /// Extra patterns are compiled case-insensitively; an invalid one is a
    /// configuration error.
    pub fn new(extra_patterns: &[String]) -> Result<Self> {
        let mut patterns = Self::predefined_patterns();
        for (i, raw) in extra_patterns.iter().enumerate() {
            let regex = Regex::new(&format!("(?i){raw}"))
                .with_context(|| format!("Invalid extra pattern #{}: {}", i + 1, raw))?;
            patterns.push(NetworkPattern {
                name: format!("Custom Pattern {}", i + 1),
                regex,
            });
        }
        Ok(Self { patterns })
    }

    fn predefined_patterns() -> Vec<NetworkPattern> {
        vec![
            NetworkPattern {
                name: "UNC Path".to_string(),
                regex: UNC_PATH.clone(),
            },
            NetworkPattern {
                name: "Mapped Drive".to_string(),
                regex: DRIVE_PATH.clone(),
            },
        ]
    }

    pub fn names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    /// Earliest match in `text` across all patterns.
    ///
    /// When two patterns match at the same offset the longer match wins, so a
    /// drive path is never shadowed by a shorter custom pattern.
    pub fn find_in(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .filter_map(|p| p.regex.find(text))
            .min_by(|a, b| a.start().cmp(&b.start()).then(b.end().cmp(&a.end())))
            .map(|m| m.as_str().to_string())
    }

    /// First network path across blobs, in blob discovery order
    pub fn find_network_path<S: AsRef<str>>(&self, blobs: &[S]) -> Option<String> {
        blobs.iter().find_map(|blob| self.find_in(blob.as_ref()))
    }

    /// Every distinct network path across blobs, in discovery order
    pub fn find_all_network_paths<S: AsRef<str>>(&self, blobs: &[S]) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for blob in blobs {
            let text = blob.as_ref();
            let mut matches: Vec<(usize, &str)> = self
                .patterns
                .iter()
                .flat_map(|p| p.regex.find_iter(text).map(|m| (m.start(), m.as_str())))
                .collect();
            matches.sort_by_key(|(start, _)| *start);
            for (_, m) in matches {
                if !found.iter().any(|f| f.eq_ignore_ascii_case(m)) {
                    found.push(m.to_string());
                }
            }
        }
        found
    }
}

/// First network path in `text` using only the built-in grammars
pub fn find_network_path(text: &str) -> Option<String> {
    NetworkPatterns::default().find_in(text)
}
