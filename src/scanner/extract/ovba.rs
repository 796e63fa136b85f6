//! MS-OVBA compressed container decoding.
//!
//! VBA stores both the `dir` stream and module source with a simple LZ77
//! variant: a signature byte followed by chunks of at most 4096 decompressed
//! bytes. Each compressed chunk is a run of token sequences, one flag byte
//! followed by up to eight literal bytes or two-byte copy tokens.

use thiserror::Error;

const CONTAINER_SIGNATURE: u8 = 0x01;
const CHUNK_SIGNATURE: u16 = 0b011;
const UNCOMPRESSED_CHUNK_LEN: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OvbaError {
    #[error("compressed container is empty")]
    Empty,

    #[error("bad container signature 0x{0:02x}")]
    BadSignature(u8),

    #[error("bad chunk signature at offset {0}")]
    BadChunkSignature(usize),

    #[error("compressed chunk truncated at offset {0}")]
    Truncated(usize),

    #[error("copy token at offset {0} points before chunk start")]
    InvalidCopyToken(usize),
}

/// Decompress a complete compressed container
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, OvbaError> {
    let (&signature, _) = data.split_first().ok_or(OvbaError::Empty)?;
    if signature != CONTAINER_SIGNATURE {
        return Err(OvbaError::BadSignature(signature));
    }

    let mut out = Vec::with_capacity(data.len() * 2);
    let mut pos = 1;

    while pos < data.len() {
        let chunk_start = pos;
        let header = read_u16(data, pos).ok_or(OvbaError::Truncated(pos))?;
        let chunk_len = (header & 0x0FFF) as usize + 3;
        if (header >> 12) & 0x07 != CHUNK_SIGNATURE {
            return Err(OvbaError::BadChunkSignature(chunk_start));
        }
        let compressed = header & 0x8000 != 0;
        pos += 2;

        if !compressed {
            let end = pos + UNCOMPRESSED_CHUNK_LEN;
            let raw = data.get(pos..end).ok_or(OvbaError::Truncated(pos))?;
            out.extend_from_slice(raw);
            pos = end;
            continue;
        }

        let chunk_end = chunk_start + chunk_len;
        if chunk_end > data.len() {
            return Err(OvbaError::Truncated(chunk_start));
        }
        decompress_chunk(&data[pos..chunk_end], pos, &mut out)?;
        pos = chunk_end;
    }

    Ok(out)
}

fn decompress_chunk(chunk: &[u8], base: usize, out: &mut Vec<u8>) -> Result<(), OvbaError> {
    let decompressed_start = out.len();
    let mut pos = 0;

    while pos < chunk.len() {
        let flags = chunk[pos];
        pos += 1;

        for bit in 0..8 {
            if pos >= chunk.len() {
                break;
            }
            if flags & (1 << bit) == 0 {
                out.push(chunk[pos]);
                pos += 1;
                continue;
            }

            let token = read_u16(chunk, pos).ok_or(OvbaError::Truncated(base + pos))?;
            let difference = out.len() - decompressed_start;
            let (offset, length) = unpack_copy_token(token, difference);
            if offset > difference {
                return Err(OvbaError::InvalidCopyToken(base + pos));
            }
            pos += 2;

            // Source and destination may overlap, so copy byte by byte.
            let source = out.len() - offset;
            for i in 0..length {
                let byte = out[source + i];
                out.push(byte);
            }
        }
    }

    Ok(())
}

/// Split a copy token into (offset, length) given the number of bytes
/// already decompressed in the current chunk.
fn unpack_copy_token(token: u16, difference: usize) -> (usize, usize) {
    let mut bit_count = 0u32;
    while (1usize << bit_count) < difference {
        bit_count += 1;
    }
    let bit_count = bit_count.clamp(4, 12);
    let length_mask = 0xFFFFu16 >> bit_count;
    let offset_mask = !length_mask;
    let length = (token & length_mask) as usize + 3;
    let offset = ((token & offset_mask) >> (16 - bit_count)) as usize + 1;
    (offset, length)
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}
