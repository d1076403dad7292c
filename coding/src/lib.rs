//! Encode data to enable recovery from a subset of fragments.
//!
//! Shards are processed in contiguous groups. Every group of `data_shards` original
//! shards is extended with `parity_shards` recovery shards (a systematic Reed-Solomon
//! code over GF(2^8)), so any `data_shards` of the `data_shards + parity_shards` shards
//! in a group suffice to recover the originals.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use rapidchain_coding::{encode, reconstruct, Config};
//!
//! let config = Config::new(2, 1);
//! let data = vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")];
//! let shards = encode(&config, &data).unwrap();
//! assert_eq!(shards.len(), 3);
//!
//! // Lose the first original and recover it from the parity shard.
//! let mut received: Vec<_> = shards.into_iter().map(Some).collect();
//! received[0] = None;
//! assert_eq!(reconstruct(&config, received).unwrap(), data);
//! ```

use thiserror::Error;

mod reed_solomon;
pub use reed_solomon::{encode, reconstruct, sufficient};

/// Errors that can occur when encoding or reconstructing shards.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: data_shards must be at least 1")]
    InvalidConfig,
    #[error("invalid shard count: {0} is not a multiple of the group size {1}")]
    InvalidShardCount(usize, usize),
    #[error("invalid shard size: {0}")]
    InvalidShardSize(usize),
    #[error("not enough shards in group {group}: {present} < {required}")]
    NotEnoughShards {
        group: usize,
        present: usize,
        required: usize,
    },
    #[error("reed-solomon: {0}")]
    ReedSolomon(#[from] reed_solomon_simd::Error),
}

/// Shape of a shard group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    /// Original shards per group.
    pub data_shards: usize,
    /// Recovery shards added to each group.
    pub parity_shards: usize,
}

impl Config {
    /// Creates a new group configuration.
    pub const fn new(data_shards: usize, parity_shards: usize) -> Self {
        Self {
            data_shards,
            parity_shards,
        }
    }

    /// Returns the number of shards in an encoded group.
    pub const fn group_size(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Returns the number of encoded shards produced for `data` original shards.
    pub const fn encoded_len(&self, data: usize) -> usize {
        data / self.data_shards * self.group_size()
    }

    fn validate(&self) -> Result<(), Error> {
        if self.data_shards == 0 {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}
