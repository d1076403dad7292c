//! Variable-length integer encoding.
//!
//! Each byte carries 7 bits of the value (least significant group first) and a
//! continuation bit in its most significant position. Lengths of byte strings and
//! sequences are written this way.

use crate::Error;
use bytes::{Buf, BufMut};

const DATA_BITS_PER_BYTE: u32 = 7;
const DATA_BITS_MASK: u8 = 0x7F;
const CONTINUATION_BIT_MASK: u8 = 0x80;

/// Unsigned integers that can be varint encoded.
pub trait UInt: Copy + Into<u64> + TryFrom<u64> {
    /// Width of the integer in bits.
    const BITS: u32;
}

impl UInt for u8 {
    const BITS: u32 = u8::BITS;
}
impl UInt for u16 {
    const BITS: u32 = u16::BITS;
}
impl UInt for u32 {
    const BITS: u32 = u32::BITS;
}
impl UInt for u64 {
    const BITS: u32 = u64::BITS;
}

/// Writes `value` as a varint.
pub fn write<T: UInt>(value: T, buf: &mut impl BufMut) {
    let mut value: u64 = value.into();
    while value >= CONTINUATION_BIT_MASK as u64 {
        buf.put_u8((value as u8 & DATA_BITS_MASK) | CONTINUATION_BIT_MASK);
        value >>= DATA_BITS_PER_BYTE;
    }
    buf.put_u8(value as u8);
}

/// Reads a varint that must fit in `T`.
///
/// Rejects encodings with set bits beyond the width of `T` and non-canonical
/// encodings (a trailing zero byte after a continuation).
pub fn read<T: UInt>(buf: &mut impl Buf) -> Result<T, Error> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(Error::EndOfBuffer);
        }
        let byte = buf.get_u8();
        let data = (byte & DATA_BITS_MASK) as u64;

        // Bits that would fall beyond the target width make the varint invalid.
        let remaining_bits = T::BITS - shift;
        if remaining_bits < DATA_BITS_PER_BYTE && data >> remaining_bits != 0 {
            return Err(Error::InvalidVarint);
        }
        result |= data << shift;

        if byte & CONTINUATION_BIT_MASK == 0 {
            if byte == 0 && shift > 0 {
                return Err(Error::InvalidVarint);
            }
            return T::try_from(result).map_err(|_| Error::InvalidVarint);
        }

        shift += DATA_BITS_PER_BYTE;
        if shift >= T::BITS {
            return Err(Error::InvalidVarint);
        }
    }
}

/// Returns the number of bytes [write] produces for `value`.
pub fn size<T: UInt>(value: T) -> usize {
    let value: u64 = value.into();
    let bits = u64::BITS - value.leading_zeros();
    (bits.max(1)).div_ceil(DATA_BITS_PER_BYTE) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn test_small_values_take_one_byte() {
        for value in [0u32, 1, 127] {
            let mut buf = BytesMut::new();
            write(value, &mut buf);
            assert_eq!(buf.len(), 1);
            assert_eq!(size(value), 1);
            assert_eq!(read::<u32>(&mut buf.freeze()).unwrap(), value);
        }
    }

    #[test]
    fn test_multi_byte() {
        let mut buf = BytesMut::new();
        write(300u32, &mut buf);
        assert_eq!(&buf[..], &[0xAC, 0x02]);
        assert_eq!(size(300u32), 2);
        assert_eq!(read::<u32>(&mut buf.freeze()).unwrap(), 300);
    }

    #[test]
    fn test_max_values() {
        let mut buf = BytesMut::new();
        write(u64::MAX, &mut buf);
        assert_eq!(buf.len(), 10);
        assert_eq!(size(u64::MAX), 10);
        assert_eq!(read::<u64>(&mut buf.freeze()).unwrap(), u64::MAX);

        let mut buf = BytesMut::new();
        write(u32::MAX, &mut buf);
        assert_eq!(buf.len(), 5);
        assert_eq!(read::<u32>(&mut buf.freeze()).unwrap(), u32::MAX);
    }

    #[test]
    fn test_overflow_rejected() {
        // u32::MAX + 1 does not fit in a u32.
        let mut buf = BytesMut::new();
        write(u32::MAX as u64 + 1, &mut buf);
        assert!(matches!(
            read::<u32>(&mut buf.freeze()),
            Err(Error::InvalidVarint)
        ));
    }

    #[test]
    fn test_non_canonical_rejected() {
        let mut buf = Bytes::from_static(&[0x81, 0x00]);
        assert!(matches!(read::<u32>(&mut buf), Err(Error::InvalidVarint)));
    }

    #[test]
    fn test_truncated() {
        let mut buf = Bytes::from_static(&[0x80]);
        assert!(matches!(read::<u32>(&mut buf), Err(Error::EndOfBuffer)));
    }
}
