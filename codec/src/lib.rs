//! Serialize structured data.
//!
//! # Overview
//!
//! A binary serialization library used for every structure that is hashed or signed.
//! Encodings are deterministic:
//! - Integers are fixed-width and big-endian.
//! - Byte strings and sequences are prefixed with a varint length.
//! - Struct fields are written in declaration order.
//!
//! Decoding untrusted input is bounded by a [Read::Cfg] (for example, [RangeCfg]
//! limits on the length of a collection).
//!
//! # Example
//!
//! ```
//! use bytes::{Buf, BufMut};
//! use rapidchain_codec::{DecodeExt, Encode, EncodeSize, Error, Read, ReadExt, Write};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Point {
//!     x: u32,
//!     y: u64,
//! }
//!
//! impl Write for Point {
//!     fn write(&self, buf: &mut impl BufMut) {
//!         self.x.write(buf);
//!         self.y.write(buf);
//!     }
//! }
//!
//! impl EncodeSize for Point {
//!     fn encode_size(&self) -> usize {
//!         self.x.encode_size() + self.y.encode_size()
//!     }
//! }
//!
//! impl Read for Point {
//!     type Cfg = ();
//!
//!     fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
//!         let x = u32::read(buf)?;
//!         let y = u64::read(buf)?;
//!         Ok(Self { x, y })
//!     }
//! }
//!
//! let point = Point { x: 1, y: 2 };
//! let encoded = point.encode();
//! assert_eq!(encoded.len(), 12);
//! assert_eq!(Point::decode(encoded).unwrap(), point);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod types;
pub mod varint;

pub use codec::{
    at_least, Decode, DecodeExt, Encode, EncodeSize, FixedSize, Read, ReadExt, Write,
};
pub use config::RangeCfg;
pub use error::Error;
