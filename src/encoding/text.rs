//! Text column codecs.
//!
//! Modern files store text as UTF-16LE, optionally in the "compressed
//! unicode" form: the marker `FF FE` followed by segments separated by
//! `0x00`. Decoding starts in single-byte mode, where each byte is a code
//! unit `0x00XX`; every separator toggles between single-byte and
//! double-byte (little-endian code unit) mode. Legacy files store
//! single-byte text.

use crate::{
    storage::header::JetVersion,
    types::error::{DatabaseError, Result},
};

pub const COMPRESSION_MARKER: [u8; 2] = [0xFF, 0xFE];

const SEGMENT_SEPARATOR: u8 = 0x00;
const BYTE_ORDER_MARK: char = '\u{FEFF}';

pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(&COMPRESSION_MARKER)
}

/// Expand a compressed value back into text.
pub fn decompress(bytes: &[u8]) -> Result<String> {
    let body = bytes
        .strip_prefix(&COMPRESSION_MARKER)
        .ok_or_else(|| DatabaseError::decode("missing compression marker"))?;

    let mut units: Vec<u16> = Vec::with_capacity(body.len());
    let mut single_byte = true;
    let mut position = 0;
    while position < body.len() {
        let byte = body[position];
        if byte == SEGMENT_SEPARATOR {
            single_byte = !single_byte;
            position += 1;
        } else if single_byte {
            units.push(byte as u16);
            position += 1;
        } else {
            let Some(pair) = body.get(position..position + 2) else {
                return Err(DatabaseError::decode(format!(
                    "double-byte segment truncated at offset {}",
                    position + COMPRESSION_MARKER.len()
                )));
            };
            units.push(u16::from_le_bytes([pair[0], pair[1]]));
            position += 2;
        }
    }

    String::from_utf16(&units)
        .map_err(|_| DatabaseError::decode("compressed text holds an unpaired surrogate"))
}

pub fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(DatabaseError::decode(format!(
            "UTF-16 text has odd length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| DatabaseError::decode("text holds an unpaired surrogate"))
}

/// Legacy single-byte text: UTF-8 when it is valid, Latin-1 otherwise.
pub fn decode_single_byte(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Decode a stored text value for the given file version.
///
/// The compressed form is only recognised on columns flagged as compressed;
/// otherwise modern text is plain UTF-16LE, with a leading byte order mark
/// dropped. NUL characters are stripped from the result.
pub fn decode_text(bytes: &[u8], version: JetVersion, compressed: bool) -> Result<String> {
    let text = if version.is_legacy() {
        decode_single_byte(bytes)
    } else if compressed && is_compressed(bytes) {
        decompress(bytes)?
    } else {
        let text = decode_utf16le(bytes)?;
        match text.strip_prefix(BYTE_ORDER_MARK) {
            Some(rest) => rest.to_string(),
            None => text,
        }
    };

    if text.contains('\0') {
        log::debug!("Decoded text contains NUL characters, stripping them");
        return Ok(text.replace('\0', ""));
    }
    Ok(text)
}
