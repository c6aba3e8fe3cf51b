// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Byte-level layout of a sealed store.
//!
//! ```text
//! [0..64)      header (magic, version, attribute block location + crc, created_at)
//! [64..N)      column chunks, lz4-compressed little-endian u64 words, any interleaving
//! [N..N+len)   attribute block (json)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

pub const STORE_MAGIC: &[u8; 8] = b"SBCOLSTR";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 64;
const WORD_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreHeader {
    pub format_version: u32,
    pub attrs_offset: u64,
    pub attrs_len: u64,
    pub attrs_crc: u32,
    pub created_at_s: i64,
}

impl StoreHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..STORE_MAGIC.len()].copy_from_slice(STORE_MAGIC);
        buf[8..12].copy_from_slice(&self.format_version.to_le_bytes());
        buf[12..20].copy_from_slice(&self.attrs_offset.to_le_bytes());
        buf[20..28].copy_from_slice(&self.attrs_len.to_le_bytes());
        buf[28..32].copy_from_slice(&self.attrs_crc.to_le_bytes());
        buf[32..40].copy_from_slice(&self.created_at_s.to_le_bytes());
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Self, FormatError> {
        if buf.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                detail: format!("header needs {HEADER_SIZE} bytes, file has {}", buf.len()),
            });
        }
        if &buf[..STORE_MAGIC.len()] != STORE_MAGIC {
            return Err(FormatError::BadMagic);
        }
        let format_version = u32::from_le_bytes(le_bytes(&buf[8..12]));
        if format_version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(Self {
            format_version,
            attrs_offset: u64::from_le_bytes(le_bytes(&buf[12..20])),
            attrs_len: u64::from_le_bytes(le_bytes(&buf[20..28])),
            attrs_crc: u32::from_le_bytes(le_bytes(&buf[28..32])),
            created_at_s: i64::from_le_bytes(le_bytes(&buf[32..40])),
        })
    }
}

/// Location and shape of one compressed chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub offset: u64,
    pub len: u32,
    pub rows: u32,
    pub crc32: u32,
}

pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Compresses one chunk of words; returns the bytes to write and their checksum.
pub fn encode_chunk(words: &[u64]) -> (Vec<u8>, u32) {
    let mut raw = Vec::with_capacity(words.len() * WORD_SIZE);
    for word in words {
        raw.extend_from_slice(&word.to_le_bytes());
    }
    let compressed = lz4_flex::compress_prepend_size(&raw);
    let crc = checksum(&compressed);
    (compressed, crc)
}

pub fn decode_chunk(
    column: &str,
    chunk: usize,
    meta: &ChunkMeta,
    bytes: &[u8],
) -> Result<Vec<u64>, FormatError> {
    if checksum(bytes) != meta.crc32 {
        return Err(FormatError::ChunkChecksum {
            column: column.to_string(),
            chunk,
        });
    }
    let raw = lz4_flex::decompress_size_prepended(bytes).map_err(|e| FormatError::Decompress {
        column: column.to_string(),
        chunk,
        reason: e.to_string(),
    })?;
    let expected = meta.rows as usize * WORD_SIZE;
    if raw.len() != expected {
        return Err(FormatError::Decompress {
            column: column.to_string(),
            chunk,
            reason: format!("expected {expected} bytes, got {}", raw.len()),
        });
    }
    Ok(raw
        .chunks_exact(WORD_SIZE)
        .map(|w| u64::from_le_bytes(le_bytes(w)))
        .collect())
}

fn le_bytes<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}
