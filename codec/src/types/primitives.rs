//! Codec implementations for primitive types.
//!
//! Integers are fixed-width and big-endian so that hashed or signed encodings do not
//! depend on the value being encoded.

use crate::{codec::at_least, Error, FixedSize, Read, Write};
use bytes::{Buf, BufMut};

macro_rules! impl_numeric {
    ($type:ty, $read_method:ident, $write_method:ident) => {
        impl Write for $type {
            #[inline]
            fn write(&self, buf: &mut impl BufMut) {
                buf.$write_method(*self);
            }
        }

        impl Read for $type {
            type Cfg = ();

            #[inline]
            fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
                at_least(buf, core::mem::size_of::<$type>())?;
                Ok(buf.$read_method())
            }
        }

        impl FixedSize for $type {
            const SIZE: usize = core::mem::size_of::<$type>();
        }
    };
}

impl_numeric!(u8, get_u8, put_u8);
impl_numeric!(u16, get_u16, put_u16);
impl_numeric!(u32, get_u32, put_u32);
impl_numeric!(u64, get_u64, put_u64);

impl Write for bool {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl Read for bool {
    type Cfg = ();

    #[inline]
    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        match u8::read_cfg(buf, &())? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::InvalidBool),
        }
    }
}

impl FixedSize for bool {
    const SIZE: usize = 1;
}

impl<const N: usize> Write for [u8; N] {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> Read for [u8; N] {
    type Cfg = ();

    #[inline]
    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        at_least(buf, N)?;
        let mut dst = [0; N];
        buf.copy_to_slice(&mut dst);
        Ok(dst)
    }
}

impl<const N: usize> FixedSize for [u8; N] {
    const SIZE: usize = N;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecodeExt, Encode};
    use bytes::Bytes;

    #[test]
    fn test_big_endian() {
        assert_eq!(&0x0102_0304u32.encode()[..], &[1, 2, 3, 4]);
        assert_eq!(&7u64.encode()[..], &[0, 0, 0, 0, 0, 0, 0, 7]);
        assert_eq!(u16::decode(Bytes::from_static(&[1, 0])).unwrap(), 256);
    }

    #[test]
    fn test_bool() {
        assert!(bool::decode(Bytes::from_static(&[1])).unwrap());
        assert!(!bool::decode(Bytes::from_static(&[0])).unwrap());
        assert!(matches!(
            bool::decode(Bytes::from_static(&[2])),
            Err(Error::InvalidBool)
        ));
    }

    #[test]
    fn test_array() {
        let value = [9u8; 32];
        let encoded = value.encode();
        assert_eq!(encoded.len(), 32);
        assert_eq!(<[u8; 32]>::decode(encoded).unwrap(), value);
        assert!(matches!(
            <[u8; 32]>::decode(Bytes::from_static(&[0; 31])),
            Err(Error::EndOfBuffer)
        ));
    }
}
