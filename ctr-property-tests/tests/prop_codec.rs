//! Property tests for the byte codec
//!
//! - Round-trip: every setter is undone by its getter
//! - Masking: values wider than the cell are truncated, never rejected
//! - Text encodings: hex, base64 and base32 decode what they encode

use ctr_core::codec::{self, Endian};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn endian() -> impl Strategy<Value = Endian> {
    prop_oneof![Just(Endian::Big), Just(Endian::Little)]
}

fn offset() -> impl Strategy<Value = usize> {
    0usize..24
}

// ============================================================================
// Round-trip
// ============================================================================

proptest! {
    #[test]
    fn uint16_round_trip(value in 0u64..=0xFFFF, endian in endian(), offset in offset()) {
        let mut buffer = vec![0u8; 32];
        codec::set_uint16(&mut buffer, offset, value, endian).unwrap();
        prop_assert_eq!(codec::get_uint16(&buffer, offset, endian).unwrap(), value);
    }

    #[test]
    fn uint32_round_trip(value in 0u64..=0xFFFF_FFFF, endian in endian(), offset in offset()) {
        let mut buffer = vec![0u8; 32];
        codec::set_uint32(&mut buffer, offset, value, endian).unwrap();
        prop_assert_eq!(codec::get_uint32(&buffer, offset, endian).unwrap(), value);
    }

    #[test]
    fn uint64_round_trip(value in any::<u64>(), endian in endian(), offset in offset()) {
        let mut buffer = vec![0u8; 32];
        codec::set_uint64(&mut buffer, offset, value, endian).unwrap();
        prop_assert_eq!(codec::get_uint64(&buffer, offset, endian).unwrap(), value);
    }

    #[test]
    fn int8_round_trip(value in any::<i8>(), offset in offset()) {
        let mut buffer = vec![0u8; 32];
        codec::set_int8(&mut buffer, offset, i64::from(value)).unwrap();
        prop_assert_eq!(codec::get_int8(&buffer, offset).unwrap(), i64::from(value));
    }

    #[test]
    fn uint32_with_code_round_trip(
        value in 0u64..=0xFFFF_FFFF,
        scale in any::<i8>(),
        unit in any::<u8>(),
    ) {
        let mut buffer = vec![0u8; 6];
        prop_assert_eq!(codec::set_uint32_with_code(&mut buffer, 0, value, scale, unit).unwrap(), 6);
        prop_assert_eq!(codec::get_uint32_with_code(&buffer, 0).unwrap(), (value, scale, unit));
    }

    #[test]
    fn text_with_length_prefix_round_trip(text in "\\PC{0,40}") {
        let mut buffer = vec![0u8; 4 + text.len()];
        let written = codec::set_text_with_length_prefix(&mut buffer, 0, &text).unwrap();
        prop_assert_eq!(written, 4 + text.len());
        prop_assert_eq!(codec::get_text_with_length_prefix(&buffer, 0).unwrap(), (text.clone(), written));
    }

    /// Writes never touch bytes outside their cell
    #[test]
    fn write_stays_in_cell(value in any::<u64>(), endian in endian(), offset in offset()) {
        let mut buffer = vec![0xAAu8; 32];
        codec::set_uint32(&mut buffer, offset, value, endian).unwrap();
        prop_assert!(buffer[..offset].iter().all(|b| *b == 0xAA));
        prop_assert!(buffer[offset + 4..].iter().all(|b| *b == 0xAA));
    }
}

// ============================================================================
// Masking
// ============================================================================

proptest! {
    #[test]
    fn uint32_masks_to_low_bits(value in any::<u64>(), endian in endian()) {
        let mut buffer = vec![0u8; 4];
        codec::set_uint32(&mut buffer, 0, value, endian).unwrap();
        prop_assert_eq!(codec::get_uint32(&buffer, 0, endian).unwrap(), value & 0xFFFF_FFFF);
    }

    #[test]
    fn uint16_masks_to_low_bits(value in any::<u64>(), endian in endian()) {
        let mut buffer = vec![0u8; 2];
        codec::set_uint16(&mut buffer, 0, value, endian).unwrap();
        prop_assert_eq!(codec::get_uint16(&buffer, 0, endian).unwrap(), value & 0xFFFF);
    }

    #[test]
    fn out_of_range_write_is_error(len in 0usize..8, value in any::<u64>()) {
        let mut buffer = vec![0u8; len];
        prop_assert!(codec::set_uint64(&mut buffer, 0, value, Endian::Big).is_err());
    }
}

#[test]
fn uint32_wraps_at_two_to_the_32() {
    let mut buffer = [0u8; 4];
    codec::set_uint32(&mut buffer, 0, 0x1_0000_0000, Endian::Big).unwrap();
    assert_eq!(buffer, [0, 0, 0, 0]);
}

// ============================================================================
// Text encodings
// ============================================================================

proptest! {
    #[test]
    fn hex_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let text = codec::hex_encode(&bytes);
        prop_assert_eq!(codec::hex_decode(&text).unwrap(), bytes.clone());
        prop_assert_eq!(codec::hex_decode(&text.to_uppercase()).unwrap(), bytes);
    }

    #[test]
    fn base64_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(codec::base64_decode(&codec::base64_encode(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn base32_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(codec::base32_decode(&codec::base32_encode(&bytes)).unwrap(), bytes);
    }
}
