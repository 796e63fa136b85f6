//! VBA project reading from an OLE compound file.
//!
//! A project lives in a storage named `VBA` holding a compressed `dir` stream
//! plus one stream per module. The `dir` stream lists each module's stream
//! name and the offset where its compressed source starts.

use super::ovba::{self, OvbaError};
use super::MacroModule;
use cfb::CompoundFile;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

const PROJECT_CODE_PAGE: u16 = 0x0003;
const PROJECT_VERSION: u16 = 0x0009;
const MODULE_NAME: u16 = 0x0019;
const MODULE_NAME_UNICODE: u16 = 0x0047;
const MODULE_STREAM_NAME: u16 = 0x001A;
const MODULE_STREAM_NAME_UNICODE: u16 = 0x0032;
const MODULE_OFFSET: u16 = 0x0031;
const MODULE_TERMINATOR: u16 = 0x002B;
const DIR_TERMINATOR: u16 = 0x0010;

const CODE_PAGE_UTF8: u16 = 65001;
const DEFAULT_CODE_PAGE: u16 = 1252;

#[derive(Debug, Error)]
pub enum VbaError {
    #[error("{context}: {source}")]
    Decompress {
        context: String,
        #[source]
        source: OvbaError,
    },

    #[error("cannot read stream {}: {source}", path.display())]
    Stream {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dir stream: {0}")]
    MalformedDir(String),

    #[error("module {name}: source offset {offset} beyond stream length {len}")]
    BadOffset { name: String, offset: usize, len: usize },
}

/// Module record collected from the `dir` stream
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ModuleRecord {
    name: String,
    stream_name: String,
    text_offset: usize,
}

/// Parsed `dir` stream
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProjectDir {
    code_page: u16,
    modules: Vec<ModuleRecord>,
}

/// Read every module of the first VBA project found in `file`.
///
/// Returns `Ok(None)` when the compound file carries no `VBA` storage with a
/// `dir` stream.
pub fn read_project<F: Read + Seek>(
    file: &mut CompoundFile<F>,
) -> Result<Option<Vec<MacroModule>>, VbaError> {
    let Some(storage) = find_vba_storage(file) else {
        return Ok(None);
    };
    debug!("VBA storage at {}", storage.display());

    let dir_bytes = read_stream(file, &storage.join("dir"))?;
    let dir = ovba::decompress(&dir_bytes).map_err(|source| VbaError::Decompress {
        context: "dir stream".to_string(),
        source,
    })?;
    let project = parse_dir(&dir)?;

    let mut modules = Vec::with_capacity(project.modules.len());
    for record in &project.modules {
        let raw = read_stream(file, &storage.join(&record.stream_name))?;
        let compressed = raw.get(record.text_offset..).ok_or_else(|| VbaError::BadOffset {
            name: record.name.clone(),
            offset: record.text_offset,
            len: raw.len(),
        })?;
        let source = ovba::decompress(compressed).map_err(|source| VbaError::Decompress {
            context: format!("module {}", record.name),
            source,
        })?;
        trace!("Decoded module {} ({} bytes)", record.name, source.len());
        modules.push(MacroModule {
            name: record.name.clone(),
            source: decode_text(&source, project.code_page),
        });
    }

    Ok(Some(modules))
}

fn find_vba_storage<F: Read + Seek>(file: &CompoundFile<F>) -> Option<PathBuf> {
    let storages: Vec<PathBuf> = file
        .walk()
        .filter(|entry| entry.is_storage() && entry.name().eq_ignore_ascii_case("VBA"))
        .map(|entry| entry.path().to_path_buf())
        .collect();

    storages
        .into_iter()
        .find(|storage| file.is_stream(storage.join("dir")))
}

fn read_stream<F: Read + Seek>(file: &mut CompoundFile<F>, path: &Path) -> Result<Vec<u8>, VbaError> {
    let mut buf = Vec::new();
    file.open_stream(path)
        .and_then(|mut stream| stream.read_to_end(&mut buf))
        .map_err(|source| VbaError::Stream {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(buf)
}

fn parse_dir(data: &[u8]) -> Result<ProjectDir, VbaError> {
    let mut reader = RecordReader { data, pos: 0 };
    let mut code_page = DEFAULT_CODE_PAGE;
    let mut modules = Vec::new();
    let mut current: Option<ModuleRecord> = None;

    while let Some((id, body)) = reader.next_record()? {
        match id {
            PROJECT_CODE_PAGE => code_page = read_u16(body).unwrap_or(DEFAULT_CODE_PAGE),
            MODULE_NAME => {
                current = Some(ModuleRecord {
                    name: decode_text(body, code_page),
                    ..Default::default()
                });
            }
            MODULE_NAME_UNICODE => {
                if let Some(module) = current.as_mut() {
                    module.name = decode_utf16(body);
                }
            }
            MODULE_STREAM_NAME => {
                if let Some(module) = current.as_mut() {
                    module.stream_name = decode_text(body, code_page);
                }
            }
            MODULE_STREAM_NAME_UNICODE => {
                if let Some(module) = current.as_mut() {
                    module.stream_name = decode_utf16(body);
                }
            }
            MODULE_OFFSET => {
                let module = current.as_mut().ok_or_else(|| {
                    VbaError::MalformedDir("module offset outside a module record".into())
                })?;
                let offset = read_u32(body)
                    .ok_or_else(|| VbaError::MalformedDir("short module offset record".into()))?;
                module.text_offset = offset as usize;
            }
            MODULE_TERMINATOR => {
                let module = current.take().ok_or_else(|| {
                    VbaError::MalformedDir("module terminator without module".into())
                })?;
                if module.stream_name.is_empty() {
                    return Err(VbaError::MalformedDir(format!(
                        "module {} has no stream name",
                        module.name
                    )));
                }
                trace!(
                    "Module {} -> stream {} at offset {}",
                    module.name, module.stream_name, module.text_offset
                );
                modules.push(module);
            }
            DIR_TERMINATOR => break,
            _ => {}
        }
    }

    if current.is_some() {
        return Err(VbaError::MalformedDir("unterminated module record".into()));
    }

    Ok(ProjectDir { code_page, modules })
}

struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn next_record(&mut self) -> Result<Option<(u16, &'a [u8])>, VbaError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let id = self.take(2).and_then(read_u16).ok_or_else(|| self.truncated())?;
        let size = self.take(4).and_then(read_u32).ok_or_else(|| self.truncated())? as usize;

        // PROJECTVERSION's size field is a reserved constant; its payload is
        // always a u32 major plus a u16 minor version.
        let body_len = if id == PROJECT_VERSION { 6 } else { size };
        let body = self.take(body_len).ok_or_else(|| self.truncated())?;
        Ok(Some((id, body)))
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(bytes)
    }

    fn truncated(&self) -> VbaError {
        VbaError::MalformedDir(format!("record truncated at offset {}", self.pos))
    }
}

fn read_u16(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(..2)?.try_into().ok()?))
}

fn read_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?))
}

/// Decode single-byte or UTF-8 text according to the project code page.
///
/// Code pages other than UTF-8 map each byte to the code point of the same
/// value, which is exact for ASCII and for the Latin-1 range of Windows-1252.
pub fn decode_text(bytes: &[u8], code_page: u16) -> String {
    if code_page == CODE_PAGE_UTF8 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
