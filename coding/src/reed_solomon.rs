//! Reed-Solomon shard groups.

use crate::{Config, Error};
use bytes::Bytes;

fn is_present(shard: &Option<Bytes>) -> bool {
    shard.as_ref().is_some_and(|shard| !shard.is_empty())
}

/// Pairs each present shard with its position in `shards`.
fn indexed(shards: &[Option<Bytes>]) -> impl Iterator<Item = (usize, &Bytes)> {
    shards
        .iter()
        .enumerate()
        .filter_map(|(i, shard)| shard.as_ref().filter(|shard| !shard.is_empty()).map(|shard| (i, shard)))
}

/// Every shard passed to the coder must have the same non-zero, even length.
fn shard_size<'a>(mut shards: impl Iterator<Item = &'a Bytes>) -> Result<usize, Error> {
    let Some(first) = shards.next() else {
        return Err(Error::InvalidShardSize(0));
    };
    let size = first.len();
    if size == 0 || size % 2 != 0 {
        return Err(Error::InvalidShardSize(size));
    }
    for shard in shards {
        if shard.len() != size {
            return Err(Error::InvalidShardSize(shard.len()));
        }
    }
    Ok(size)
}

/// Extends every group of `config.data_shards` shards in `data` with
/// `config.parity_shards` recovery shards.
///
/// The output holds the groups back-to-back, each laid out as its original shards
/// followed by its recovery shards. With no parity shards, `data` is returned as is.
pub fn encode(config: &Config, data: &[Bytes]) -> Result<Vec<Bytes>, Error> {
    config.validate()?;
    if data.len() % config.data_shards != 0 {
        return Err(Error::InvalidShardCount(data.len(), config.data_shards));
    }
    if config.parity_shards == 0 || data.is_empty() {
        return Ok(data.to_vec());
    }
    shard_size(data.iter())?;

    let mut shards = Vec::with_capacity(config.encoded_len(data.len()));
    for group in data.chunks(config.data_shards) {
        let recovery =
            reed_solomon_simd::encode(config.data_shards, config.parity_shards, group)?;
        shards.extend(group.iter().cloned());
        shards.extend(recovery.into_iter().map(Bytes::from));
    }
    Ok(shards)
}

/// Returns true if every group of `shards` holds at least `config.data_shards`
/// present (non-empty) shards.
pub fn sufficient(config: &Config, shards: &[Option<Bytes>]) -> bool {
    let group_size = config.group_size();
    if config.data_shards == 0 || shards.len() % group_size != 0 {
        return false;
    }
    shards
        .chunks(group_size)
        .all(|group| group.iter().filter(|shard| is_present(shard)).count() >= config.data_shards)
}

/// Recovers the original shards of every group, returning only the originals
/// (`config.data_shards` per group, in order).
pub fn reconstruct(config: &Config, shards: Vec<Option<Bytes>>) -> Result<Vec<Bytes>, Error> {
    config.validate()?;
    let group_size = config.group_size();
    if shards.len() % group_size != 0 {
        return Err(Error::InvalidShardCount(shards.len(), group_size));
    }

    let mut originals = Vec::with_capacity(shards.len() / group_size * config.data_shards);
    for (index, group) in shards.chunks(group_size).enumerate() {
        let present = group.iter().filter(|shard| is_present(shard)).count();
        if present < config.data_shards {
            return Err(Error::NotEnoughShards {
                group: index,
                present,
                required: config.data_shards,
            });
        }

        // Nothing to recover
        let (data, parity) = group.split_at(config.data_shards);
        if data.iter().all(is_present) {
            originals.extend(data.iter().flatten().cloned());
            continue;
        }

        shard_size(group.iter().filter(|shard| is_present(shard)).flatten())?;
        let mut restored = reed_solomon_simd::decode(
            config.data_shards,
            config.parity_shards,
            indexed(data),
            indexed(parity),
        )?;
        for (i, shard) in data.iter().enumerate() {
            match shard {
                Some(shard) if !shard.is_empty() => originals.push(shard.clone()),
                _ => {
                    let shard = restored.remove(&i).ok_or(Error::NotEnoughShards {
                        group: index,
                        present,
                        required: config.data_shards,
                    })?;
                    originals.push(Bytes::from(shard));
                }
            }
        }
    }
    Ok(originals)
}
