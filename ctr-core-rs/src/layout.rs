//! Signed-layout builder
//!
//! Wraps the codec writers and records each cell it writes, so a verifier
//! gets the proof trace (field name, display value, hex of the written
//! bytes) for free.
//!
//! Two modes:
//! - fixed: a zero-filled buffer of known size, writes at explicit offsets
//! - growable: cells appended at the end

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::codec::{self, Endian};
use crate::error::Result;
use crate::obis::Obis;

/// One cell of a reconstructed layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoField {
    pub name: String,
    pub value: String,
    pub hex: String,
}

#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    buffer: Vec<u8>,
    growable: bool,
    cursor: usize,
    fields: Vec<CryptoField>,
}

impl LayoutBuilder {
    /// Zero-filled buffer of `size` bytes; writes past the end fail
    pub fn fixed(size: usize) -> Self {
        Self {
            buffer: vec![0u8; size],
            growable: false,
            cursor: 0,
            fields: Vec::new(),
        }
    }

    /// Empty buffer that grows as cells are appended
    pub fn growable() -> Self {
        Self {
            buffer: Vec::new(),
            growable: true,
            cursor: 0,
            fields: Vec::new(),
        }
    }

    /// Offset of the next appended cell
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn fields(&self) -> &[CryptoField] {
        &self.fields
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<CryptoField>) {
        (self.buffer, self.fields)
    }

    fn reserve(&mut self, offset: usize, len: usize) {
        if self.growable && offset + len > self.buffer.len() {
            self.buffer.resize(offset + len, 0);
        }
    }

    fn record(&mut self, name: &str, value: String, offset: usize, written: usize) {
        self.cursor = self.cursor.max(offset + written);
        self.fields.push(CryptoField {
            name: name.to_string(),
            value,
            hex: codec::hex_encode(&self.buffer[offset..offset + written]),
        });
    }

    // ------------------------------------------------------------------------
    // Writers at explicit offsets
    // ------------------------------------------------------------------------

    pub fn uint8_at(&mut self, name: &str, offset: usize, value: u64) -> Result<&mut Self> {
        self.reserve(offset, 1);
        let n = codec::set_uint8(&mut self.buffer, offset, value)?;
        self.record(name, value.to_string(), offset, n);
        Ok(self)
    }

    pub fn int8_at(&mut self, name: &str, offset: usize, value: i64) -> Result<&mut Self> {
        self.reserve(offset, 1);
        let n = codec::set_int8(&mut self.buffer, offset, value)?;
        self.record(name, value.to_string(), offset, n);
        Ok(self)
    }

    pub fn uint16_at(&mut self, name: &str, offset: usize, value: u64, endian: Endian) -> Result<&mut Self> {
        self.reserve(offset, 2);
        let n = codec::set_uint16(&mut self.buffer, offset, value, endian)?;
        self.record(name, value.to_string(), offset, n);
        Ok(self)
    }

    pub fn uint32_at(&mut self, name: &str, offset: usize, value: u64, endian: Endian) -> Result<&mut Self> {
        self.reserve(offset, 4);
        let n = codec::set_uint32(&mut self.buffer, offset, value, endian)?;
        self.record(name, value.to_string(), offset, n);
        Ok(self)
    }

    pub fn uint64_at(&mut self, name: &str, offset: usize, value: u64, endian: Endian) -> Result<&mut Self> {
        self.reserve(offset, 8);
        let n = codec::set_uint64(&mut self.buffer, offset, value, endian)?;
        self.record(name, value.to_string(), offset, n);
        Ok(self)
    }

    pub fn hex_at(&mut self, name: &str, offset: usize, hex_text: &str, reversed: bool) -> Result<&mut Self> {
        let len = codec::hex_decode(hex_text)?.len();
        self.reserve(offset, len);
        let n = codec::set_hex(&mut self.buffer, offset, hex_text, reversed)?;
        self.record(name, hex_text.to_string(), offset, n);
        Ok(self)
    }

    pub fn text_at(&mut self, name: &str, offset: usize, text: &str) -> Result<&mut Self> {
        self.reserve(offset, text.len());
        let n = codec::set_text(&mut self.buffer, offset, text)?;
        self.record(name, text.to_string(), offset, n);
        Ok(self)
    }

    pub fn obis_at(&mut self, name: &str, offset: usize, obis: &Obis) -> Result<&mut Self> {
        self.reserve(offset, 6);
        let n = codec::set_hex(&mut self.buffer, offset, &obis.to_hex(), false)?;
        self.record(name, obis.to_string(), offset, n);
        Ok(self)
    }

    pub fn timestamp32_at(
        &mut self,
        name: &str,
        offset: usize,
        timestamp: &DateTime<FixedOffset>,
        add_local_offset: bool,
    ) -> Result<&mut Self> {
        self.reserve(offset, 4);
        let n = codec::set_timestamp32(&mut self.buffer, offset, timestamp, add_local_offset)?;
        self.record(name, timestamp.to_rfc3339(), offset, n);
        Ok(self)
    }

    pub fn timestamp_at(
        &mut self,
        name: &str,
        offset: usize,
        timestamp: &DateTime<FixedOffset>,
        add_local_offset: bool,
    ) -> Result<&mut Self> {
        self.reserve(offset, 8);
        let n = codec::set_timestamp(&mut self.buffer, offset, timestamp, add_local_offset)?;
        self.record(name, timestamp.to_rfc3339(), offset, n);
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Appending writers
    // ------------------------------------------------------------------------

    pub fn push_uint64(&mut self, name: &str, value: u64, endian: Endian) -> Result<&mut Self> {
        let at = self.cursor;
        self.uint64_at(name, at, value, endian)
    }

    pub fn push_uint8(&mut self, name: &str, value: u64) -> Result<&mut Self> {
        let at = self.cursor;
        self.uint8_at(name, at, value)
    }

    pub fn push_int8(&mut self, name: &str, value: i64) -> Result<&mut Self> {
        let at = self.cursor;
        self.int8_at(name, at, value)
    }

    pub fn push_obis(&mut self, name: &str, obis: &Obis) -> Result<&mut Self> {
        let at = self.cursor;
        self.obis_at(name, at, obis)
    }

    pub fn push_timestamp(
        &mut self,
        name: &str,
        timestamp: &DateTime<FixedOffset>,
        add_local_offset: bool,
    ) -> Result<&mut Self> {
        let at = self.cursor;
        self.timestamp_at(name, at, timestamp, add_local_offset)
    }

    pub fn push_text_with_length_prefix(&mut self, name: &str, text: &str) -> Result<&mut Self> {
        let at = self.cursor;
        self.reserve(at, 4 + text.len());
        let n = codec::set_text_with_length_prefix(&mut self.buffer, at, text)?;
        self.record(name, text.to_string(), at, n);
        Ok(self)
    }

    pub fn push_uint32_with_code(
        &mut self,
        name: &str,
        value: u64,
        scale_exponent: i8,
        unit_code: u8,
    ) -> Result<&mut Self> {
        let at = self.cursor;
        self.reserve(at, 6);
        let n = codec::set_uint32_with_code(&mut self.buffer, at, value, scale_exponent, unit_code)?;
        self.record(name, value.to_string(), at, n);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncodingError;

    #[test]
    fn test_fixed_layout_records_fields() {
        let mut layout = LayoutBuilder::fixed(320);
        layout
            .hex_at("meterId", 0, "0a1b2c", false)
            .unwrap()
            .uint32_at("timestamp", 10, 1, Endian::Big)
            .unwrap()
            .obis_at("obis", 23, &Obis::ENERGY_IMPORT)
            .unwrap();

        assert_eq!(layout.bytes().len(), 320);
        assert_eq!(&layout.bytes()[0..3], &[0x0a, 0x1b, 0x2c]);
        assert_eq!(layout.fields().len(), 3);
        assert_eq!(layout.fields()[1].hex, "00000001");
        assert_eq!(layout.fields()[2].value, "1-0:1.8.0*255");
        assert_eq!(layout.fields()[2].hex, "0100010800ff");
    }

    #[test]
    fn test_fixed_layout_overflow() {
        let mut layout = LayoutBuilder::fixed(8);
        let err = layout.uint64_at("value", 4, 1, Endian::Big).unwrap_err();
        assert!(matches!(err, EncodingError::BufferOverflow { .. }));
    }

    #[test]
    fn test_growable_layout_appends() {
        let mut layout = LayoutBuilder::growable();
        layout
            .push_text_with_length_prefix("meterId", "AB")
            .unwrap()
            .push_uint32_with_code("RCnt", 7, 0, 255)
            .unwrap();
        assert_eq!(layout.cursor(), 12);
        assert_eq!(codec::hex_encode(layout.bytes()), "0000000241420000000700ff");
        let (bytes, fields) = layout.into_parts();
        assert_eq!(bytes.len(), 12);
        assert_eq!(fields[1].hex, "0000000700ff");
    }
}
