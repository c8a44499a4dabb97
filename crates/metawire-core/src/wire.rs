//! Wire-level constants and primitive codecs.
//!
//! Tag layout: `(field_number << 3) | wire_type`, varint encoded.
//! Varints store 7 bits per byte, least significant group first, with the
//! high bit set on every byte except the last.

use bytes::{Buf, BufMut};

/// Number of low tag bits holding the wire type.
pub const TAG_TYPE_BITS: u32 = 3;
/// Mask selecting the wire type from a tag.
pub const TAG_TYPE_MASK: u64 = 0x07;
/// Largest field number that fits a tag.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;
/// A u64 varint never needs more than this many bytes.
pub const MAX_VARINT_LEN: usize = 10;

/// Payload framing selected by the low three tag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "length-delimited",
            WireType::Fixed32 => "fixed32",
        }
    }
}

/// Compose a tag value (before varint encoding).
#[inline]
pub fn make_tag(field_number: u32, wire_type: WireType) -> u64 {
    ((field_number as u64) << TAG_TYPE_BITS) | wire_type.bits() as u64
}

/// Split a raw tag into `(field_number, wire_type_bits)`.
#[inline]
pub fn split_tag(tag: u64) -> (u64, u8) {
    (tag >> TAG_TYPE_BITS, (tag & TAG_TYPE_MASK) as u8)
}

/// Append `value` as a varint.
pub fn put_varint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Encoded size of `value` as a varint.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Why a varint could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Buffer ended with the continuation bit still set.
    Truncated,
    /// More than ten bytes, or bits beyond 64.
    Overlong,
}

/// Read one varint, consuming its bytes.
pub fn get_varint<B: Buf>(buf: &mut B) -> Result<u64, VarintError> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(VarintError::Truncated);
        }
        let byte = buf.get_u8();
        let part = (byte & 0x7f) as u64;
        // the tenth byte may only contribute the top bit
        if i == MAX_VARINT_LEN - 1 && part > 1 {
            return Err(VarintError::Overlong);
        }
        value |= part << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(VarintError::Overlong)
}

#[inline]
fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Zigzag-map a signed value of the given bit width: `(n << 1) ^ (n >> (width - 1))`.
#[inline]
pub fn zigzag_encode(n: i64, width: u32) -> u64 {
    let width = width.clamp(8, 64);
    (((n << 1) ^ (n >> (width - 1))) as u64) & width_mask(width)
}

/// Inverse of [`zigzag_encode`]; the caller checks the result fits its width.
#[inline]
pub fn zigzag_decode(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

/// Signed range check for a declared bit width.
#[inline]
pub fn fits_signed(n: i64, width: u32) -> bool {
    if width >= 64 {
        return true;
    }
    let min = -(1i64 << (width - 1));
    let max = (1i64 << (width - 1)) - 1;
    (min..=max).contains(&n)
}

/// Unsigned range check for a declared bit width.
#[inline]
pub fn fits_unsigned(n: u64, width: u32) -> bool {
    n <= width_mask(width)
}
