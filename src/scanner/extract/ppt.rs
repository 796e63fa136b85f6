//! VBA projects embedded in legacy PowerPoint presentations.
//!
//! Unlike Word and Excel, a `.ppt` has no top-level `VBA` storage. The project
//! is a compound file of its own, stored (usually zlib-compressed) in an
//! `ExOleObjStg` record of the `PowerPoint Document` stream. A `VBAInfoAtom`
//! in the same stream says whether the presentation carries macros at all.

use super::MacroModule;
use super::vba::{self, VbaError};
use cfb::CompoundFile;
use flate2::read::ZlibDecoder;
use std::io::{Cursor, Read, Seek};
use thiserror::Error;
use tracing::{debug, trace};

pub const DOCUMENT_STREAM: &str = "/PowerPoint Document";

/// Largest storage inflated from a single record
pub const MAX_STORAGE_BYTES: u64 = 64 * 1024 * 1024;

const RECORD_HEADER_LEN: usize = 8;
const CONTAINER_VERSION: u16 = 0x000F;
const RT_VBA_INFO_ATOM: u16 = 0x0400;
const RT_EX_OLE_OBJ_STG: u16 = 0x1011;
const COMPRESSED_INSTANCE: u16 = 0x0001;
const HAS_MACROS: u32 = 0x0000_0001;

#[derive(Debug, Error)]
pub enum PptError {
    #[error("cannot read PowerPoint Document stream: {0}")]
    Stream(#[source] std::io::Error),

    #[error("record at offset {offset} runs past the end of the PowerPoint Document stream")]
    Truncated { offset: usize },

    #[error("embedded storage at offset {offset} cannot be inflated: {source}")]
    Inflate {
        offset: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("embedded storage at offset {offset} inflates past the size limit")]
    TooLarge { offset: usize },

    #[error(transparent)]
    Project(#[from] VbaError),

    #[error("presentation declares macros but holds no readable VBA storage")]
    MissingProject,
}

/// Payload of one `ExOleObjStg` record
#[derive(Debug, Clone, PartialEq, Eq)]
struct EmbeddedStorage<'a> {
    offset: usize,
    compressed: bool,
    payload: &'a [u8],
}

impl EmbeddedStorage<'_> {
    fn inflate(&self) -> Result<Vec<u8>, PptError> {
        if !self.compressed {
            return Ok(self.payload.to_vec());
        }
        // u32 decompressed size, then the zlib stream
        let body = self
            .payload
            .get(4..)
            .ok_or(PptError::Truncated { offset: self.offset })?;
        let mut out = Vec::new();
        ZlibDecoder::new(body)
            .take(MAX_STORAGE_BYTES + 1)
            .read_to_end(&mut out)
            .map_err(|source| PptError::Inflate {
                offset: self.offset,
                source,
            })?;
        if out.len() as u64 > MAX_STORAGE_BYTES {
            return Err(PptError::TooLarge { offset: self.offset });
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct DocumentRecords<'a> {
    declares_macros: bool,
    storages: Vec<EmbeddedStorage<'a>>,
}

/// Read the presentation's VBA project.
///
/// `Ok(None)` when the presentation neither declares macros nor embeds a
/// storage holding a project.
pub fn read_project<F: Read + Seek>(
    file: &mut CompoundFile<F>,
) -> Result<Option<Vec<MacroModule>>, PptError> {
    let mut stream = Vec::new();
    file.open_stream(DOCUMENT_STREAM)
        .and_then(|mut s| s.read_to_end(&mut stream))
        .map_err(PptError::Stream)?;

    let records = scan_records(&stream)?;
    debug!(
        "PowerPoint document: macros declared {}, {} embedded storage(s)",
        records.declares_macros,
        records.storages.len()
    );

    for storage in &records.storages {
        let bytes = storage.inflate()?;
        // Embedded OLE objects share the record type; only some are projects
        let Ok(mut embedded) = CompoundFile::open(Cursor::new(bytes)) else {
            trace!("Storage at offset {} is not a compound file", storage.offset);
            continue;
        };
        if let Some(modules) = vba::read_project(&mut embedded)? {
            return Ok(Some(modules));
        }
    }

    if records.declares_macros {
        Err(PptError::MissingProject)
    } else {
        Ok(None)
    }
}

/// Flatten the record tree: containers are entered, atoms are skipped by length.
fn scan_records(stream: &[u8]) -> Result<DocumentRecords<'_>, PptError> {
    let mut records = DocumentRecords::default();
    let mut pos = 0usize;

    while stream.len() - pos >= RECORD_HEADER_LEN {
        let header = &stream[pos..pos + RECORD_HEADER_LEN];
        let ver_instance = u16::from_le_bytes([header[0], header[1]]);
        let rec_type = u16::from_le_bytes([header[2], header[3]]);
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let body_start = pos + RECORD_HEADER_LEN;

        if ver_instance & 0x000F == CONTAINER_VERSION {
            pos = body_start;
            continue;
        }

        let body = body_start
            .checked_add(len)
            .and_then(|end| stream.get(body_start..end))
            .ok_or(PptError::Truncated { offset: pos })?;

        match rec_type {
            RT_VBA_INFO_ATOM => {
                let flag = body
                    .get(4..8)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                records.declares_macros |= flag == Some(HAS_MACROS);
            }
            RT_EX_OLE_OBJ_STG => records.storages.push(EmbeddedStorage {
                offset: pos,
                compressed: ver_instance >> 4 == COMPRESSED_INSTANCE,
                payload: body,
            }),
            _ => {}
        }
        pos = body_start + len;
    }

    Ok(records)
}
