//! Hex encoding for fixed-size tag blocks.
//!
//! Card payloads arrive as hex strings that may carry whitespace or
//! separators (colon-delimited dumps, line breaks). Decoding discards every
//! non-hex character first and only then validates, so `"30:d1 bd"` and
//! `"30d1bd"` decode identically. Encoding is always two lowercase digits per
//! byte.

use crate::{CodecError, CodecResult};

/// Encode bytes as a lowercase hex string, two digits per byte.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(char::from_digit((b >> 4) as u32, 16).unwrap());
        out.push(char::from_digit((b & 0x0f) as u32, 16).unwrap());
    }
    out
}

/// Decode a hex string into bytes.
///
/// Non-hex characters (whitespace, separators) are discarded before
/// validation, case-insensitively. Fails with [`CodecError::MalformedHex`]
/// when an odd number of hex digits remains.
pub fn hex_to_bytes(input: &str) -> CodecResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .chars()
        .filter_map(|c| c.to_digit(16).map(|d| d as u8))
        .collect();

    if digits.len() % 2 != 0 {
        return Err(CodecError::MalformedHex);
    }

    Ok(digits.chunks_exact(2).map(|p| (p[0] << 4) | p[1]).collect())
}
