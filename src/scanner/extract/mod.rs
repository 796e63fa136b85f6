//! Macro source extraction from Office documents.
//!
//! Both container kinds end in the same place: an OLE compound file holding
//! a `VBA` storage. Legacy documents are that compound file; zip packages
//! embed it as a `vbaProject.bin` part and legacy presentations embed it in
//! a record of their document stream.

pub mod ovba;
pub mod ppt;
pub mod vba;

use super::error::ScanError;
use super::types::ContainerKind;
use cfb::CompoundFile;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;

const VBA_PROJECT_PART: &str = "vbaProject.bin";

/// Largest `vbaProject.bin` read out of a zip package
pub const MAX_VBA_PROJECT_BYTES: u64 = 64 * 1024 * 1024;

const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// Stream Office writes in place of the zip package of an encrypted document
const ENCRYPTED_PACKAGE: &str = "/EncryptedPackage";

/// Decoded source of one VBA module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroModule {
    pub name: String,
    pub source: String,
}

/// Extract every macro module in `path`.
///
/// The container is taken from the file's signature when it has one, so a
/// compound file saved under an OOXML extension (the shape of an encrypted
/// package) is read as what it is. `container` decides for anything else.
/// An empty vector means the document has no macro project.
pub fn extract(path: &Path, container: ContainerKind) -> Result<Vec<MacroModule>, ScanError> {
    let mut file = BufReader::new(File::open(path)?);
    let sniffed = sniff_container(file.fill_buf()?);
    if let Some(actual) = sniffed.filter(|actual| *actual != container) {
        debug!("{} is a {:?} file despite its extension", path.display(), actual);
    }
    match sniffed.unwrap_or(container) {
        ContainerKind::LegacyBinary => extract_legacy(file),
        ContainerKind::ZipBased => extract_zip(file),
    }
}

fn sniff_container(head: &[u8]) -> Option<ContainerKind> {
    if head.starts_with(&CFB_MAGIC) {
        Some(ContainerKind::LegacyBinary)
    } else if head.starts_with(&ZIP_MAGIC) {
        Some(ContainerKind::ZipBased)
    } else {
        None
    }
}

fn extract_legacy<R: Read + Seek>(reader: R) -> Result<Vec<MacroModule>, ScanError> {
    let mut compound = CompoundFile::open(reader)
        .map_err(|e| ScanError::ContainerCorrupt(format!("compound file: {e}")))?;

    if compound.is_stream(ENCRYPTED_PACKAGE) {
        return Err(ScanError::EncryptedDocument(
            "password-protected package, macros cannot be read".to_string(),
        ));
    }

    let modules = read_modules(&mut compound)?;
    if modules.is_empty() && compound.is_stream(ppt::DOCUMENT_STREAM) {
        return match ppt::read_project(&mut compound) {
            Ok(found) => Ok(found.unwrap_or_default()),
            Err(e @ ppt::PptError::Stream(_)) => Err(ScanError::ContainerCorrupt(e.to_string())),
            Err(e) => Err(ScanError::MacroDecodeFailed(e.to_string())),
        };
    }
    Ok(modules)
}

fn extract_zip<R: Read + Seek>(reader: R) -> Result<Vec<MacroModule>, ScanError> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| ScanError::ContainerCorrupt(format!("zip archive: {e}")))?;

    let Some(part) = archive
        .file_names()
        .find(|name| is_vba_project_part(name))
        .map(str::to_owned)
    else {
        return Ok(Vec::new());
    };
    debug!("Found VBA project part {}", part);

    let entry = archive
        .by_name(&part)
        .map_err(|e| ScanError::ContainerCorrupt(format!("zip entry {part}: {e}")))?;
    let declared = entry.size();
    let bytes = read_part(entry, declared, MAX_VBA_PROJECT_BYTES, &part)?;

    let mut compound = CompoundFile::open(Cursor::new(bytes))
        .map_err(|e| ScanError::MacroDecodeFailed(format!("{VBA_PROJECT_PART}: {e}")))?;
    read_modules(&mut compound)
}

/// Read a zip part without trusting its declared size.
///
/// Neither the declared size nor the inflated data may exceed `limit`.
fn read_part<R: Read>(entry: R, declared: u64, limit: u64, part: &str) -> Result<Vec<u8>, ScanError> {
    if declared > limit {
        return Err(ScanError::ContainerCorrupt(format!(
            "zip entry {part}: declared size {declared} exceeds the {limit} byte limit"
        )));
    }
    let mut bytes = Vec::with_capacity(declared as usize);
    entry
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| ScanError::ContainerCorrupt(format!("zip entry {part}: {e}")))?;
    if bytes.len() as u64 > limit {
        return Err(ScanError::ContainerCorrupt(format!(
            "zip entry {part}: inflates past the {limit} byte limit"
        )));
    }
    Ok(bytes)
}

fn read_modules<R: Read + Seek>(compound: &mut CompoundFile<R>) -> Result<Vec<MacroModule>, ScanError> {
    match vba::read_project(compound) {
        Ok(Some(modules)) => Ok(modules),
        Ok(None) => Ok(Vec::new()),
        Err(e) => Err(ScanError::MacroDecodeFailed(e.to_string())),
    }
}

fn is_vba_project_part(name: &str) -> bool {
    name.rsplit(['/', '\\'])
        .next()
        .is_some_and(|file| file.eq_ignore_ascii_case(VBA_PROJECT_PART))
}
