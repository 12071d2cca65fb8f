//! Primitive binary encoders
//!
//! Every vendor layout is assembled from these writers. Integer writers mask
//! the value to their bit width before encoding, so `0x1_0000_0000` written as
//! a 32-bit cell becomes `00000000`: meters truncate the same way and the
//! reconstructed bytes must match theirs.
//!
//! All writers take an explicit offset and return the number of bytes they
//! wrote. Out-of-range writes fail with [`EncodingError::BufferOverflow`].

use chrono::{DateTime, FixedOffset};
use data_encoding::BASE32_NOPAD;

use crate::error::{EncodingError, Result};

/// Byte order of a multi-byte cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

fn check_write(buffer: &[u8], offset: usize, len: usize) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > buffer.len()) {
        return Err(EncodingError::BufferOverflow {
            offset,
            len,
            capacity: buffer.len(),
        });
    }
    Ok(())
}

fn check_read(buffer: &[u8], offset: usize, len: usize) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > buffer.len()) {
        return Err(EncodingError::BufferUnderflow {
            offset,
            len,
            available: buffer.len(),
        });
    }
    Ok(())
}

fn write_masked(buffer: &mut [u8], offset: usize, value: u64, width: usize, endian: Endian) -> Result<usize> {
    check_write(buffer, offset, width)?;
    let bytes = value.to_be_bytes();
    let cell = &bytes[8 - width..];
    let target = &mut buffer[offset..offset + width];
    match endian {
        Endian::Big => target.copy_from_slice(cell),
        Endian::Little => {
            for (dst, src) in target.iter_mut().zip(cell.iter().rev()) {
                *dst = *src;
            }
        }
    }
    Ok(width)
}

fn read_cell(buffer: &[u8], offset: usize, width: usize, endian: Endian) -> Result<u64> {
    check_read(buffer, offset, width)?;
    let cell = &buffer[offset..offset + width];
    let mut value = 0u64;
    match endian {
        Endian::Big => {
            for byte in cell {
                value = (value << 8) | u64::from(*byte);
            }
        }
        Endian::Little => {
            for byte in cell.iter().rev() {
                value = (value << 8) | u64::from(*byte);
            }
        }
    }
    Ok(value)
}

// ============================================================================
// Integer writers
// ============================================================================

/// Write the low 8 bits of `value`
pub fn set_uint8(buffer: &mut [u8], offset: usize, value: u64) -> Result<usize> {
    write_masked(buffer, offset, value & 0xFF, 1, Endian::Big)
}

/// Write a signed byte (two's complement)
pub fn set_int8(buffer: &mut [u8], offset: usize, value: i64) -> Result<usize> {
    set_uint8(buffer, offset, value as u64)
}

/// Write the low 16 bits of `value`
pub fn set_uint16(buffer: &mut [u8], offset: usize, value: u64, endian: Endian) -> Result<usize> {
    write_masked(buffer, offset, value & 0xFFFF, 2, endian)
}

/// Write the low 32 bits of `value`
pub fn set_uint32(buffer: &mut [u8], offset: usize, value: u64, endian: Endian) -> Result<usize> {
    write_masked(buffer, offset, value & 0xFFFF_FFFF, 4, endian)
}

/// Write a signed 32-bit cell (two's complement, truncated)
pub fn set_int32(buffer: &mut [u8], offset: usize, value: i64, endian: Endian) -> Result<usize> {
    set_uint32(buffer, offset, value as u64, endian)
}

/// Write all 64 bits of `value`
pub fn set_uint64(buffer: &mut [u8], offset: usize, value: u64, endian: Endian) -> Result<usize> {
    write_masked(buffer, offset, value, 8, endian)
}

pub fn get_uint8(buffer: &[u8], offset: usize) -> Result<u64> {
    read_cell(buffer, offset, 1, Endian::Big)
}

pub fn get_int8(buffer: &[u8], offset: usize) -> Result<i64> {
    Ok(i64::from(get_uint8(buffer, offset)? as u8 as i8))
}

pub fn get_uint16(buffer: &[u8], offset: usize, endian: Endian) -> Result<u64> {
    read_cell(buffer, offset, 2, endian)
}

pub fn get_uint32(buffer: &[u8], offset: usize, endian: Endian) -> Result<u64> {
    read_cell(buffer, offset, 4, endian)
}

pub fn get_uint64(buffer: &[u8], offset: usize, endian: Endian) -> Result<u64> {
    read_cell(buffer, offset, 8, endian)
}

// ============================================================================
// Composite cells
// ============================================================================

/// Numeric cell used throughout BSM-style layouts:
/// 4-byte big-endian value, 1-byte signed scale exponent, 1-byte DLMS unit code.
pub fn set_uint32_with_code(
    buffer: &mut [u8],
    offset: usize,
    value: u64,
    scale_exponent: i8,
    unit_code: u8,
) -> Result<usize> {
    check_write(buffer, offset, 6)?;
    set_uint32(buffer, offset, value, Endian::Big)?;
    set_int8(buffer, offset + 4, i64::from(scale_exponent))?;
    set_uint8(buffer, offset + 5, u64::from(unit_code))?;
    Ok(6)
}

/// Decode a cell written by [`set_uint32_with_code`]
pub fn get_uint32_with_code(buffer: &[u8], offset: usize) -> Result<(u64, i8, u8)> {
    let value = get_uint32(buffer, offset, Endian::Big)?;
    let scale = get_int8(buffer, offset + 4)? as i8;
    let unit = get_uint8(buffer, offset + 5)? as u8;
    Ok((value, scale, unit))
}

/// Raw UTF-8 bytes, no terminator
pub fn set_text(buffer: &mut [u8], offset: usize, text: &str) -> Result<usize> {
    let bytes = text.as_bytes();
    check_write(buffer, offset, bytes.len())?;
    buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

/// 4-byte big-endian length, then the UTF-8 bytes
pub fn set_text_with_length_prefix(buffer: &mut [u8], offset: usize, text: &str) -> Result<usize> {
    let bytes = text.as_bytes();
    let len = u32::try_from(bytes.len()).map_err(|_| EncodingError::TextTooLong(bytes.len()))?;
    check_write(buffer, offset, 4 + bytes.len())?;
    set_uint32(buffer, offset, u64::from(len), Endian::Big)?;
    set_text(buffer, offset + 4, text)?;
    Ok(4 + bytes.len())
}

/// Decode a length-prefixed text cell, returning the text and the cell size
pub fn get_text_with_length_prefix(buffer: &[u8], offset: usize) -> Result<(String, usize)> {
    let len = get_uint32(buffer, offset, Endian::Big)? as usize;
    check_read(buffer, offset + 4, len)?;
    let text = std::str::from_utf8(&buffer[offset + 4..offset + 4 + len])
        .map_err(|_| EncodingError::InvalidUtf8)?;
    Ok((text.to_string(), 4 + len))
}

/// Write a hex string as raw bytes, optionally in reversed byte order
pub fn set_hex(buffer: &mut [u8], offset: usize, hex_text: &str, reversed: bool) -> Result<usize> {
    let mut bytes = hex_decode(hex_text)?;
    if reversed {
        bytes.reverse();
    }
    check_write(buffer, offset, bytes.len())?;
    buffer[offset..offset + bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

// ============================================================================
// Timestamps
// ============================================================================

/// Unix epoch seconds of `timestamp`, optionally shifted by its own UTC
/// offset (`60 * offset_minutes`). The shifted form is a vendor convention
/// (local wall-clock seconds), not epoch semantics.
pub fn epoch_seconds(timestamp: &DateTime<FixedOffset>, add_local_offset: bool) -> i64 {
    let epoch = timestamp.timestamp();
    if add_local_offset {
        epoch + i64::from(timestamp.offset().local_minus_utc())
    } else {
        epoch
    }
}

/// 8-byte big-endian epoch seconds
pub fn set_timestamp(
    buffer: &mut [u8],
    offset: usize,
    timestamp: &DateTime<FixedOffset>,
    add_local_offset: bool,
) -> Result<usize> {
    let epoch = epoch_seconds(timestamp, add_local_offset);
    set_uint64(buffer, offset, epoch as u64, Endian::Big)
}

/// 4-byte big-endian epoch seconds (truncated like every 32-bit cell)
pub fn set_timestamp32(
    buffer: &mut [u8],
    offset: usize,
    timestamp: &DateTime<FixedOffset>,
    add_local_offset: bool,
) -> Result<usize> {
    let epoch = epoch_seconds(timestamp, add_local_offset);
    set_uint32(buffer, offset, epoch as u64, Endian::Big)
}

/// Read back an 8-byte timestamp cell as signed epoch seconds
pub fn get_timestamp(buffer: &[u8], offset: usize) -> Result<i64> {
    Ok(get_uint64(buffer, offset, Endian::Big)? as i64)
}

// ============================================================================
// Text transcoding
// ============================================================================

/// Decode hex, accepting upper/lower case and an optional `0x` prefix
pub fn hex_decode(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|_| EncodingError::InvalidHex(text.to_string()))
}

/// Lowercase hex
pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn base64_decode(text: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| EncodingError::InvalidBase64)
}

pub fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// RFC 4648 base32, padding optional, case-insensitive
pub fn base32_decode(text: &str) -> Result<Vec<u8>> {
    let normalized: String = text
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|_| EncodingError::InvalidBase32)
}

/// RFC 4648 base32 without padding
pub fn base32_encode(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes)
}

/// Textual encodings used by vendor containers for keys and signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    Hex,
    Base64,
    Base32,
    Plain,
}

impl TextEncoding {
    /// Parse an encoding label (`hex`/`base16`, `base64`, `base32`, `plain`)
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "hex" | "base16" => Some(TextEncoding::Hex),
            "base64" => Some(TextEncoding::Base64),
            "base32" => Some(TextEncoding::Base32),
            "plain" | "" => Some(TextEncoding::Plain),
            _ => None,
        }
    }

    /// Decode `text`. `Plain` returns the UTF-8 bytes unchanged.
    pub fn decode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Hex => hex_decode(text),
            TextEncoding::Base64 => base64_decode(text),
            TextEncoding::Base32 => base32_decode(text),
            TextEncoding::Plain => Ok(text.as_bytes().to_vec()),
        }
    }
}
