//! Codec implementation for [Bytes].
//!
//! The length is written as a varint and must fit within a [u32].

use crate::{codec::at_least, varint, EncodeSize, Error, RangeCfg, Read, Write};
use bytes::{Buf, BufMut, Bytes};

impl Write for Bytes {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        let len = u32::try_from(self.len()).expect("Bytes length exceeds u32");
        varint::write(len, buf);
        buf.put_slice(self);
    }
}

impl EncodeSize for Bytes {
    #[inline]
    fn encode_size(&self) -> usize {
        let len = u32::try_from(self.len()).expect("Bytes length exceeds u32");
        varint::size(len) + self.len()
    }
}

impl Read for Bytes {
    type Cfg = RangeCfg<usize>;

    #[inline]
    fn read_cfg(buf: &mut impl Buf, range: &Self::Cfg) -> Result<Self, Error> {
        let len = varint::read::<u32>(buf)? as usize;
        if !range.contains(&len) {
            return Err(Error::InvalidLength(len));
        }
        at_least(buf, len)?;
        Ok(buf.copy_to_bytes(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Decode, Encode};

    #[test]
    fn test_bytes() {
        let values = [
            Bytes::new(),
            Bytes::from_static(&[1, 2, 3]),
            Bytes::from(vec![0; 300]),
        ];
        for value in values {
            let len = value.len();
            let encoded = value.encode();
            assert_eq!(encoded.len(), varint::size(len as u32) + len);
            let decoded = Bytes::decode_cfg(encoded, &RangeCfg::exact(len)).unwrap();
            assert_eq!(value, decoded);
        }
    }

    #[test]
    fn test_bytes_length_limit() {
        let value = Bytes::from_static(&[1, 2, 3, 4]);
        assert!(matches!(
            Bytes::decode_cfg(value.encode(), &(0..4).into()),
            Err(Error::InvalidLength(4))
        ));
    }

    #[test]
    fn test_bytes_truncated() {
        let mut encoded = Bytes::from_static(&[1, 2, 3]).encode();
        encoded.truncate(3);
        assert!(matches!(
            Bytes::decode_cfg(encoded, &(..).into()),
            Err(Error::EndOfBuffer)
        ));
    }
}
