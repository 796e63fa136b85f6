//! Extension-based document classification.
//!
//! Classification never opens the file. The walker only yields paths for which
//! [`classify`] returns `Some`, so downstream stages always have a container kind.

use super::types::{ContainerKind, DocumentType};
use std::path::Path;

/// Document type and container kind resolved for a candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub document_type: DocumentType,
    pub container: ContainerKind,
}

const EXTENSIONS: &[(&str, DocumentType, ContainerKind)] = &[
    // Word
    ("doc", DocumentType::Word, ContainerKind::LegacyBinary),
    ("dot", DocumentType::Word, ContainerKind::LegacyBinary),
    ("docm", DocumentType::Word, ContainerKind::ZipBased),
    ("dotm", DocumentType::Word, ContainerKind::ZipBased),
    ("docx", DocumentType::Word, ContainerKind::ZipBased),
    ("dotx", DocumentType::Word, ContainerKind::ZipBased),
    // Excel
    ("xls", DocumentType::Excel, ContainerKind::LegacyBinary),
    ("xlt", DocumentType::Excel, ContainerKind::LegacyBinary),
    ("xla", DocumentType::Excel, ContainerKind::LegacyBinary),
    ("xlsm", DocumentType::Excel, ContainerKind::ZipBased),
    ("xltm", DocumentType::Excel, ContainerKind::ZipBased),
    ("xlam", DocumentType::Excel, ContainerKind::ZipBased),
    ("xlsb", DocumentType::Excel, ContainerKind::ZipBased),
    ("xlsx", DocumentType::Excel, ContainerKind::ZipBased),
    ("xltx", DocumentType::Excel, ContainerKind::ZipBased),
    // PowerPoint
    ("ppt", DocumentType::PowerPoint, ContainerKind::LegacyBinary),
    ("pot", DocumentType::PowerPoint, ContainerKind::LegacyBinary),
    ("pps", DocumentType::PowerPoint, ContainerKind::LegacyBinary),
    ("ppa", DocumentType::PowerPoint, ContainerKind::LegacyBinary),
    ("pptm", DocumentType::PowerPoint, ContainerKind::ZipBased),
    ("potm", DocumentType::PowerPoint, ContainerKind::ZipBased),
    ("ppsm", DocumentType::PowerPoint, ContainerKind::ZipBased),
    ("ppam", DocumentType::PowerPoint, ContainerKind::ZipBased),
    ("pptx", DocumentType::PowerPoint, ContainerKind::ZipBased),
    ("potx", DocumentType::PowerPoint, ContainerKind::ZipBased),
    ("ppsx", DocumentType::PowerPoint, ContainerKind::ZipBased),
];

/// Classify a path by its extension (case-insensitive)
pub fn classify(path: &Path) -> Option<Classification> {
    let ext = path.extension()?.to_str()?;
    EXTENSIONS
        .iter()
        .find(|(candidate, _, _)| candidate.eq_ignore_ascii_case(ext))
        .map(|&(_, document_type, container)| Classification {
            document_type,
            container,
        })
}

/// Whether the walker should yield this path
pub fn is_candidate(path: &Path) -> bool {
    classify(path).is_some()
}
