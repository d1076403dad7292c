//! Core codec traits.

use crate::error::Error;
use bytes::{Buf, BufMut, BytesMut};

/// Types that can be written (encoded) to a buffer.
pub trait Write {
    /// Writes this value to `buf`.
    ///
    /// Implementations may panic if the buffer does not have enough capacity.
    fn write(&self, buf: &mut impl BufMut);
}

/// Types that know the exact number of bytes [Write::write] will produce.
pub trait EncodeSize {
    /// Returns the encoded length of this value.
    fn encode_size(&self) -> usize;
}

/// Types with a constant encoded length.
pub trait FixedSize {
    /// The length of the encoded value.
    const SIZE: usize;
}

impl<T: FixedSize> EncodeSize for T {
    #[inline]
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

/// Types that can be read (decoded) from a buffer.
///
/// `Cfg` bounds the decoding of untrusted input (for example, the maximum length of
/// a collection). Types that need no configuration use `()`.
pub trait Read: Sized {
    /// Configuration used while reading.
    type Cfg: Clone + Send + Sync + 'static;

    /// Reads a value from `buf`, consuming exactly the bytes that make up the value.
    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, Error>;
}

/// Types that can be encoded into a freshly allocated buffer.
pub trait Encode: Write + EncodeSize {
    /// Encodes this value.
    ///
    /// Panics if [Write::write] does not produce [EncodeSize::encode_size] bytes.
    fn encode(&self) -> BytesMut {
        let len = self.encode_size();
        let mut buffer = BytesMut::with_capacity(len);
        self.write(&mut buffer);
        assert_eq!(buffer.len(), len, "write() did not write expected bytes");
        buffer
    }
}

impl<T: Write + EncodeSize> Encode for T {}

/// Types that can be decoded from a buffer that must be consumed entirely.
pub trait Decode: Read {
    /// Decodes a value, failing if any bytes remain afterwards.
    fn decode_cfg(mut buf: impl Buf, cfg: &Self::Cfg) -> Result<Self, Error> {
        let result = Self::read_cfg(&mut buf, cfg)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(result)
    }
}

impl<T: Read> Decode for T {}

/// Convenience reader for types that need no configuration.
pub trait ReadExt: Read<Cfg = ()> {
    /// Reads a value using the unit config.
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Self::read_cfg(buf, &())
    }
}

impl<T: Read<Cfg = ()>> ReadExt for T {}

/// Convenience decoder for types that need no configuration.
pub trait DecodeExt: Decode<Cfg = ()> {
    /// Decodes a value using the unit config.
    fn decode(buf: impl Buf) -> Result<Self, Error> {
        Self::decode_cfg(buf, &())
    }
}

impl<T: Decode<Cfg = ()>> DecodeExt for T {}

/// Fails with [Error::EndOfBuffer] if `buf` holds fewer than `len` bytes.
#[inline]
pub fn at_least(buf: &impl Buf, len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_insufficient_buffer() {
        let mut reader = Bytes::from_static(&[0x01, 0x02]);
        assert!(matches!(u32::read(&mut reader), Err(Error::EndOfBuffer)));
    }

    #[test]
    fn test_extra_data() {
        let encoded = Bytes::from_static(&[0x01, 0x02]);
        assert!(matches!(u8::decode(encoded), Err(Error::ExtraData(1))));
    }

    #[test]
    fn test_read_leaves_trailing_bytes() {
        let mut reader = Bytes::from_static(&[0x00, 0x00, 0x00, 0x07, 0xFF]);
        assert_eq!(u32::read(&mut reader).unwrap(), 7);
        assert_eq!(reader.remaining(), 1);
    }
}
