//! Unit conversions between logical angles and servo register values.

use crate::error::{BusError, Result};

/// Logical angle span covered by the raw position range, in degrees.
pub const ANGLE_RANGE_DEG: f64 = 200.0;

/// Raw positions per [`ANGLE_RANGE_DEG`].
const RAW_SPAN: f64 = 1024.0;

/// Highest raw goal position.
pub const MAX_RAW_POSITION: u16 = 1023;

/// Largest calibration offset magnitude.
pub const MAX_OFFSET: i16 = 2000;

const OFFSET_SIGN_BIT: u16 = 0x8000;

/// Convert a logical angle to a raw goal position.
///
/// `raw = floor(clamp(deg * 1024 / 200, 0, 1023))`. NaN maps to 0.
pub fn degrees_to_raw(degrees: f64) -> u16 {
    let scaled = degrees * RAW_SPAN / ANGLE_RANGE_DEG;
    scaled.clamp(0.0, f64::from(MAX_RAW_POSITION)).floor() as u16
}

/// Convert a raw position reading back to degrees.
pub fn raw_to_degrees(raw: u16) -> f64 {
    f64::from(raw) * ANGLE_RANGE_DEG / RAW_SPAN
}

/// Decode a big-endian position from a read payload.
pub fn decode_position(params: &[u8]) -> Result<u16> {
    match params {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(BusError::ShortResponse {
            expected: 2,
            actual: params.len(),
        }),
    }
}

/// Check a calibration offset against the encodable range.
pub fn check_offset(offset: i16) -> Result<()> {
    if (-MAX_OFFSET..=MAX_OFFSET).contains(&offset) {
        Ok(())
    } else {
        Err(BusError::OffsetOutOfRange(offset))
    }
}

/// Encode an offset as magnitude in bits 0..15 and sign in bit 15, big-endian.
pub fn encode_offset(offset: i16) -> Result<[u8; 2]> {
    check_offset(offset)?;
    let mut word = offset.unsigned_abs();
    if offset < 0 {
        word |= OFFSET_SIGN_BIT;
    }
    Ok(word.to_be_bytes())
}

/// Inverse of [`encode_offset`].
pub fn decode_offset(bytes: [u8; 2]) -> i16 {
    let word = u16::from_be_bytes(bytes);
    let magnitude = (word & !OFFSET_SIGN_BIT) as i16;
    if word & OFFSET_SIGN_BIT != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_scale_matches_raw_range() {
        assert_eq!(degrees_to_raw(0.0), 0);
        assert_eq!(degrees_to_raw(100.0), 512);
        assert_eq!(degrees_to_raw(45.3), 231);
        assert_eq!(degrees_to_raw(200.0), MAX_RAW_POSITION);
    }

    #[test]
    fn angle_is_clamped() {
        assert_eq!(degrees_to_raw(-15.0), 0);
        assert_eq!(degrees_to_raw(1_000.0), MAX_RAW_POSITION);
        assert_eq!(degrees_to_raw(f64::NAN), 0);
    }

    #[test]
    fn raw_reading_to_degrees() {
        assert_eq!(raw_to_degrees(512), 100.0);
        assert_eq!(raw_to_degrees(0), 0.0);
    }

    #[test]
    fn position_payload_is_big_endian() {
        assert_eq!(decode_position(&[0x02, 0x00]).unwrap(), 512);
        assert_eq!(decode_position(&[0x01, 0xF4, 0x99]).unwrap(), 500);
        assert!(matches!(
            decode_position(&[0x02]),
            Err(BusError::ShortResponse {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn offset_sign_magnitude() {
        assert_eq!(encode_offset(150).unwrap(), [0x00, 0x96]);
        assert_eq!(encode_offset(-150).unwrap(), [0x80, 0x96]);
        assert_eq!(encode_offset(0).unwrap(), [0x00, 0x00]);
        assert_eq!(decode_offset([0x80, 0x96]), -150);
        assert_eq!(decode_offset([0x07, 0xD0]), 2000);
    }

    #[test]
    fn offset_range_limits() {
        assert!(encode_offset(2000).is_ok());
        assert!(encode_offset(-2000).is_ok());
        assert!(matches!(
            encode_offset(2001),
            Err(BusError::OffsetOutOfRange(2001))
        ));
        assert!(matches!(
            encode_offset(i16::MIN),
            Err(BusError::OffsetOutOfRange(i16::MIN))
        ));
    }

    #[test]
    fn every_valid_offset_survives_the_wire() {
        for offset in -MAX_OFFSET..=MAX_OFFSET {
            assert_eq!(decode_offset(encode_offset(offset).unwrap()), offset);
        }
    }
}
