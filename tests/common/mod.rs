//! Fixture builders: real compound files and zip packages carrying VBA projects.
#![allow(dead_code)]

use cfb::CompoundFile;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

/// Largest input that fits one literal-only compressed chunk
const LITERAL_CHUNK: usize = 3640;

/// Bytes of fake performance cache in front of each module's source
pub const MODULE_CACHE_LEN: usize = 16;

/// Compress with literal tokens only.
///
/// Valid MS-OVBA output (one flag byte per eight literals), just never
/// emitting copy tokens.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x01];
    for chunk in data.chunks(LITERAL_CHUNK) {
        let mut body = Vec::with_capacity(chunk.len() + chunk.len() / 8 + 1);
        for group in chunk.chunks(8) {
            body.push(0x00);
            body.extend_from_slice(group);
        }
        let header = 0xB000u16 | (body.len() as u16 + 2 - 3);
        out.extend(header.to_le_bytes());
        out.extend(body);
    }
    out
}

fn record(id: u16, body: &[u8]) -> Vec<u8> {
    let mut out = id.to_le_bytes().to_vec();
    out.extend((body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Uncompressed `dir` stream describing `module_names`
pub fn dir_stream(module_names: &[&str]) -> Vec<u8> {
    let mut dir = Vec::new();
    dir.extend(record(0x0001, &1u32.to_le_bytes()));
    dir.extend(record(0x0002, &0x0409u32.to_le_bytes()));
    dir.extend(record(0x0014, &0x0409u32.to_le_bytes()));
    dir.extend(record(0x0003, &1252u16.to_le_bytes()));
    dir.extend(record(0x0004, b"VBAProject"));
    dir.extend(0x0009u16.to_le_bytes());
    dir.extend(4u32.to_le_bytes());
    dir.extend(0x65BE_0257u32.to_le_bytes());
    dir.extend(0x0011u16.to_le_bytes());
    dir.extend(record(0x000F, &(module_names.len() as u16).to_le_bytes()));
    dir.extend(record(0x0013, &0xFFFFu16.to_le_bytes()));
    for name in module_names {
        dir.extend(record(0x0019, name.as_bytes()));
        dir.extend(record(0x0047, &utf16(name)));
        dir.extend(record(0x001A, name.as_bytes()));
        dir.extend(record(0x0032, &utf16(name)));
        dir.extend(record(0x0031, &(MODULE_CACHE_LEN as u32).to_le_bytes()));
        dir.extend(record(0x0021, &[]));
        dir.extend(record(0x002B, &[]));
    }
    dir.extend(record(0x0010, &[]));
    dir
}

/// Bytes of a module stream: cache filler followed by compressed source
pub fn module_stream(source: &str) -> Vec<u8> {
    let mut stream = vec![0u8; MODULE_CACHE_LEN];
    stream.extend(compress(source.as_bytes()));
    stream
}

/// Write a `VBA` storage holding `modules` under `storage` (e.g. "/Macros/VBA")
fn write_vba_storage<F>(compound: &mut CompoundFile<F>, storage: &str, modules: &[(&str, Vec<u8>)])
where
    F: std::io::Read + std::io::Write + std::io::Seek,
{
    compound.create_storage_all(storage).unwrap();
    let names: Vec<&str> = modules.iter().map(|(name, _)| *name).collect();
    {
        let mut dir = compound.create_stream(format!("{storage}/dir")).unwrap();
        dir.write_all(&compress(&dir_stream(&names))).unwrap();
    }
    {
        let mut vba = compound.create_stream(format!("{storage}/_VBA_PROJECT")).unwrap();
        vba.write_all(&[0xCC, 0x61, 0xFF, 0xFF, 0x00, 0x00, 0x00]).unwrap();
    }
    for (name, bytes) in modules {
        let mut stream = compound.create_stream(format!("{storage}/{name}")).unwrap();
        stream.write_all(bytes).unwrap();
    }
}

/// `vbaProject.bin` bytes with the given raw module streams
pub fn vba_project_raw(modules: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut compound = CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    {
        let mut project = compound.create_stream("/PROJECT").unwrap();
        project.write_all(b"ID=\"{00000000-0000-0000-0000-000000000000}\"\r\n").unwrap();
    }
    write_vba_storage(&mut compound, "/VBA", modules);
    compound.flush().unwrap();
    compound.into_inner().into_inner()
}

/// `vbaProject.bin` bytes with one module per `(name, source)`
pub fn vba_project(modules: &[(&str, &str)]) -> Vec<u8> {
    let raw: Vec<(&str, Vec<u8>)> = modules
        .iter()
        .map(|(name, source)| (*name, module_stream(source)))
        .collect();
    vba_project_raw(&raw)
}

/// OOXML package; `vba` is stored as `<folder>/vbaProject.bin` when given
pub fn write_zip_document(path: &Path, folder: &str, vba: Option<&[u8]>) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("[Content_Types].xml", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><Types/>").unwrap();
    zip.start_file(format!("{folder}/document.xml"), SimpleFileOptions::default()).unwrap();
    zip.write_all(b"<document/>").unwrap();
    if let Some(bytes) = vba {
        zip.start_file(format!("{folder}/vbaProject.bin"), SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Legacy compound document. `storage` is the VBA storage path such as
/// "/Macros/VBA" (Word) or "/_VBA_PROJECT_CUR/VBA" (Excel); `None` writes a
/// document without macros.
pub fn write_legacy_document(path: &Path, storage: Option<&str>, modules: &[(&str, &str)]) {
    let mut compound = create_compound(path);
    {
        let mut body = compound.create_stream("/WordDocument").unwrap();
        body.write_all(&[0xEC, 0xA5, 0xC1, 0x00]).unwrap();
    }
    if let Some(storage) = storage {
        let raw: Vec<(&str, Vec<u8>)> = modules
            .iter()
            .map(|(name, source)| (*name, module_stream(source)))
            .collect();
        write_vba_storage(&mut compound, storage, &raw);
    }
    compound.flush().unwrap();
}

fn create_compound(path: &Path) -> CompoundFile<fs::File> {
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .unwrap();
    CompoundFile::create(file).unwrap()
}

fn ppt_record(ver: u16, instance: u16, rec_type: u16, body: &[u8]) -> Vec<u8> {
    let mut out = (ver | (instance << 4)).to_le_bytes().to_vec();
    out.extend(rec_type.to_le_bytes());
    out.extend((body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Legacy presentation. `project` is stored zlib-compressed in an
/// `ExOleObjStg` record after the document container; `declares_macros`
/// adds a `VBAInfoAtom` with the has-macros flag set.
pub fn write_legacy_presentation(path: &Path, project: Option<&[u8]>, declares_macros: bool) {
    let mut children = ppt_record(1, 0, 0x03E9, &[0u8; 40]);
    if declares_macros {
        let mut atom = 7u32.to_le_bytes().to_vec();
        atom.extend(1u32.to_le_bytes());
        atom.extend(2u32.to_le_bytes());
        let info = ppt_record(0xF, 0, 0x03FF, &ppt_record(2, 0, 0x0400, &atom));
        children.extend(ppt_record(0xF, 0, 0x07D0, &info));
    }
    let mut document = ppt_record(0xF, 0, 0x03E8, &children);
    if let Some(bytes) = project {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        let mut body = (bytes.len() as u32).to_le_bytes().to_vec();
        body.extend(encoder.finish().unwrap());
        document.extend(ppt_record(0, 1, 0x1011, &body));
    }

    let mut compound = create_compound(path);
    {
        let mut user = compound.create_stream("/Current User").unwrap();
        user.write_all(&[0u8; 20]).unwrap();
    }
    {
        let mut stream = compound.create_stream("/PowerPoint Document").unwrap();
        stream.write_all(&document).unwrap();
    }
    compound.flush().unwrap();
}

/// Compound file laid out the way Office saves a password-protected package
pub fn write_encrypted_package(path: &Path) {
    let mut compound = create_compound(path);
    {
        let mut info = compound.create_stream("/EncryptionInfo").unwrap();
        info.write_all(&[0x04, 0x00, 0x04, 0x00, 0x40, 0x00, 0x00, 0x00]).unwrap();
    }
    {
        let mut package = compound.create_stream("/EncryptedPackage").unwrap();
        package.write_all(&4096u64.to_le_bytes()).unwrap();
        package.write_all(&[0xA5; 4096]).unwrap();
    }
    compound.flush().unwrap();
}

/// Overwrite the uncompressed size recorded for `entry` in both the local
/// header and the central directory of a zip written without zip64 fields.
pub fn set_declared_size(path: &Path, entry: &str, size: u32) {
    const LOCAL: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
    const CENTRAL: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];

    let mut bytes = fs::read(path).unwrap();
    let name = entry.as_bytes();
    let u16_at = |bytes: &[u8], at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
    let mut patched = 0;
    let mut pos = 0;
    while pos + 46 <= bytes.len() {
        let (size_at, name_len_at, name_at) = match &bytes[pos..pos + 4] {
            sig if sig == LOCAL => (pos + 22, pos + 26, pos + 30),
            sig if sig == CENTRAL => (pos + 24, pos + 28, pos + 46),
            _ => {
                pos += 1;
                continue;
            }
        };
        let name_len = u16_at(&bytes, name_len_at);
        if bytes.get(name_at..name_at + name_len) == Some(name) {
            bytes[size_at..size_at + 4].copy_from_slice(&size.to_le_bytes());
            patched += 1;
        }
        pos += 4;
    }
    assert_eq!(patched, 2, "{entry} not found in both headers");
    fs::write(path, bytes).unwrap();
}

pub const PLAIN_MACRO: &str =
    "Attribute VB_Name = \"Module1\"\r\nSub Hello()\r\n    MsgBox \"Hello\"\r\nEnd Sub\r\n";

pub const UNC_MACRO: &str = "Attribute VB_Name = \"Module1\"\r\nSub Export()\r\n    \
     ActiveWorkbook.SaveAs \"\\\\fileserver01\\finance\\budget.xlsx\"\r\nEnd Sub\r\n";

pub const DRIVE_MACRO: &str = "Attribute VB_Name = \"Module1\"\r\nSub Load()\r\n    \
     Workbooks.Open \"Z:\\data\\file.xlsx\"\r\nEnd Sub\r\n";
