//! Protobuf binary wire format primitives.

/// Longest varint encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    pub const fn from_tag(tag: u32) -> Option<WireType> {
        match tag & 7 {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

pub const fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    field_number << 3 | wire_type as u32
}

pub const fn field_number(tag: u32) -> u32 {
    tag >> 3
}

/// Why reading a primitive off the wire failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The buffer ended in the middle of the value.
    Truncated,
    /// A varint longer than ten bytes.
    Overlong,
}

/// Reads a varint from the front of `buf`, returning the value and the
/// number of bytes consumed.
#[inline]
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize), ReadError> {
    let mut result = 0u64;
    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        result |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(ReadError::Overlong)
    } else {
        Err(ReadError::Truncated)
    }
}

/// Encodes `value` into `out`, returning the number of bytes written.
#[inline]
pub fn write_varint(mut value: u64, out: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        out[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    out[i] = value as u8;
    i + 1
}

pub const fn varint_len(value: u64) -> usize {
    // ceil(significant_bits / 7), with 0 taking one byte.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip_boundaries() {
        for value in [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = [0u8; MAX_VARINT_LEN];
            let n = write_varint(value, &mut buf);
            assert_eq!(n, varint_len(value), "length of {value}");
            assert_eq!(read_varint(&buf[..n]), Ok((value, n)));
        }
    }

    #[test]
    fn known_encodings() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let n = write_varint(300, &mut buf);
        assert_eq!(&buf[..n], &[0xAC, 0x02]);
        assert_eq!(read_varint(&[0x96, 0x01, 0xFF]), Ok((150, 2)));
    }

    #[test]
    fn truncated_and_overlong() {
        assert_eq!(read_varint(&[]), Err(ReadError::Truncated));
        assert_eq!(read_varint(&[0x80, 0x80]), Err(ReadError::Truncated));
        assert_eq!(read_varint(&[0xFF; 11]), Err(ReadError::Overlong));
    }

    #[test]
    fn tags() {
        let tag = make_tag(3, WireType::LengthDelimited);
        assert_eq!(tag, 0x1A);
        assert_eq!(field_number(tag), 3);
        assert_eq!(WireType::from_tag(tag), Some(WireType::LengthDelimited));
        assert_eq!(WireType::from_tag(6), None);
        assert_eq!(WireType::from_tag(7), None);
    }
}
