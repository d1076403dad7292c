//! Split blocks into authenticated chunks and merge them back.
//!
//! A block is encoded, split into `n` equally sized segments (the last one zero padded),
//! optionally extended with Reed-Solomon parity segments, and authenticated with a
//! binary Merkle tree built over the digests of every segment. Each [BlockChunk] carries
//! the root of that tree along with its inclusion proof, so a chunk can be checked in
//! isolation before the rest of its block arrives.

use crate::{
    config::Erasure,
    types::{Block, BlockChunk, ChunkAuthenticator},
    Error,
};
use bytes::Bytes;
use rapidchain_codec::{Encode, ReadExt};
use rapidchain_cryptography::{
    bmt::{self, Tree},
    ed25519::PublicKey,
    sha256::Digest,
    Hasher, Sha256,
};
use rapidchain_utils::short_hex;

/// Splits `block` into `n` chunks issued by `issuer`.
///
/// Returns the unsigned chunks and the merkle root they are authenticated against.
pub fn chunk(issuer: &PublicKey, block: &Block, n: u32) -> Result<(Vec<BlockChunk>, Digest), Error> {
    if n == 0 {
        return Err(Error::InvalidChunkCount(n));
    }
    let encoded = block.encode();
    let size = encoded.len().div_ceil(n as usize);
    let mut chunks = segments(issuer, block, &encoded, n, size)?;
    let root = authenticate(&mut chunks)?;
    Ok((chunks, root))
}

/// Splits `block` into `n` data chunks and extends every group of
/// `erasure.data_chunks` of them with `erasure.parity_chunks` parity chunks.
///
/// The merkle tree covers parity chunks as well.
pub fn chunk_with_erasure(
    issuer: &PublicKey,
    block: &Block,
    n: u32,
    erasure: &Erasure,
) -> Result<(Vec<BlockChunk>, Digest), Error> {
    if n == 0 || erasure.data_chunks == 0 || n % erasure.data_chunks != 0 {
        return Err(Error::InvalidChunkCount(n));
    }
    let encoded = block.encode();

    // Shards must have an even length
    let mut size = encoded.len().div_ceil(n as usize);
    size += size % 2;
    let chunks = segments(issuer, block, &encoded, n, size)?;
    let mut chunks = encode(chunks, erasure)?;
    let root = authenticate(&mut chunks)?;
    Ok((chunks, root))
}

fn segments(
    issuer: &PublicKey,
    block: &Block,
    encoded: &[u8],
    n: u32,
    size: usize,
) -> Result<Vec<BlockChunk>, Error> {
    if size == 0 {
        return Err(Error::ZeroChunkSize);
    }
    let mut chunks = Vec::with_capacity(n as usize);
    for index in 0..n {
        let start = (index as usize * size).min(encoded.len());
        let end = (start + size).min(encoded.len());
        let mut payload = Vec::with_capacity(size);
        payload.extend_from_slice(&encoded[start..end]);
        payload.resize(size, 0);
        chunks.push(BlockChunk {
            issuer: issuer.clone(),
            round: block.round,
            chunk_count: n,
            chunk_index: index,
            payload: Bytes::from(payload),
            payload_length: (end - start) as u32,
            authenticator: unauthenticated(),
            signature: None,
        });
    }
    Ok(chunks)
}

fn unauthenticated() -> ChunkAuthenticator {
    ChunkAuthenticator {
        merkle_root: Digest::default(),
        path: Vec::new(),
        index: Vec::new(),
    }
}

fn tree<'a>(payloads: impl Iterator<Item = &'a Bytes>) -> Result<Tree<Sha256>, Error> {
    let leaves: Vec<Digest> = payloads.map(|payload| Sha256::hash(payload)).collect();
    Ok(Tree::<Sha256>::new(&leaves)?)
}

/// Builds a merkle tree over the chunk payloads and attaches each chunk's proof.
pub(crate) fn authenticate(chunks: &mut [BlockChunk]) -> Result<Digest, Error> {
    let tree = tree(chunks.iter().map(|chunk| &chunk.payload))?;
    let root = tree.root();
    for (position, chunk) in chunks.iter_mut().enumerate() {
        let proof = tree.proof(position)?;
        chunk.authenticator = ChunkAuthenticator {
            merkle_root: root,
            path: proof.siblings,
            index: proof.directions,
        };
    }
    Ok(root)
}

/// Adds parity chunks to `chunks` (data chunks of a single block, in order).
///
/// Every output chunk is renumbered sequentially and stamped with the issuer and round
/// of the first input chunk and with the new chunk count. Parity chunks are not padded,
/// so their `payload_length` is the full shard length.
pub fn encode(chunks: Vec<BlockChunk>, erasure: &Erasure) -> Result<Vec<BlockChunk>, Error> {
    let Some(first) = chunks.first() else {
        return Ok(chunks);
    };
    let issuer = first.issuer.clone();
    let round = first.round;

    let payloads: Vec<Bytes> = chunks.iter().map(|chunk| chunk.payload.clone()).collect();
    let shards = rapidchain_coding::encode(&erasure.coding(), &payloads)?;
    let count = u32::try_from(shards.len()).map_err(|_| Error::InvalidChunkCount(u32::MAX))?;

    let group = erasure.data_chunks as usize;
    let total = group + erasure.parity_chunks as usize;
    let mut data = chunks.into_iter();
    let mut encoded = Vec::with_capacity(shards.len());
    for (index, shard) in shards.into_iter().enumerate() {
        let payload_length = if index % total < group {
            match data.next() {
                Some(chunk) => chunk.payload_length,
                None => shard.len() as u32,
            }
        } else {
            shard.len() as u32
        };
        encoded.push(BlockChunk {
            issuer: issuer.clone(),
            round,
            chunk_count: count,
            chunk_index: index as u32,
            payload: shard,
            payload_length,
            authenticator: unauthenticated(),
            signature: None,
        });
    }
    Ok(encoded)
}

/// Returns true if every group of `chunks` (indexed by position, absent chunks as
/// `None`) holds enough chunks to recover its data chunks.
pub fn sufficient(chunks: &[Option<&BlockChunk>], erasure: &Erasure) -> bool {
    rapidchain_coding::sufficient(&erasure.coding(), &shards(chunks))
}

/// Recovers the data chunk payloads of a block from its (possibly partial) chunks.
///
/// The recovered payloads are encoded again and the merkle tree over every resulting
/// chunk must have `root`. Otherwise, the chunks authenticated under `root` do not
/// belong to a single encoding and different subsets of them could yield different
/// blocks.
///
/// Only the `data_chunks` payloads of every group are returned, in order.
pub fn reconstruct(
    chunks: &[Option<&BlockChunk>],
    erasure: &Erasure,
    root: &Digest,
) -> Result<Vec<Bytes>, Error> {
    let coding = erasure.coding();
    let data = rapidchain_coding::reconstruct(&coding, shards(chunks))?;
    let round = chunks.iter().flatten().map(|chunk| chunk.round).next().unwrap_or(0);
    let inconsistent = || Error::InconsistentEncoding {
        round,
        root: short_hex(root),
    };
    let encoded = rapidchain_coding::encode(&coding, &data).map_err(|_| inconsistent())?;
    if encoded.len() != chunks.len() || tree(encoded.iter())?.root() != *root {
        return Err(inconsistent());
    }
    Ok(data)
}

fn shards(chunks: &[Option<&BlockChunk>]) -> Vec<Option<Bytes>> {
    chunks
        .iter()
        .map(|chunk| chunk.map(|chunk| chunk.payload.clone()))
        .collect()
}

/// Concatenates the payloads of `chunks` (sorted by index) and decodes the block.
///
/// Completeness is not checked: a missing chunk surfaces as a decoding error.
pub fn merge(chunks: &[BlockChunk]) -> Result<Block, Error> {
    merge_payloads(chunks.iter().map(|chunk| &chunk.payload))
}

/// Concatenates `payloads` and decodes the block, requiring that only zero padding
/// follows it.
pub fn merge_payloads<'a>(payloads: impl IntoIterator<Item = &'a Bytes>) -> Result<Block, Error> {
    let mut encoded = Vec::new();
    for payload in payloads {
        encoded.extend_from_slice(payload);
    }
    let mut buf = &encoded[..];
    let block = Block::read(&mut buf)?;
    if buf.iter().any(|byte| *byte != 0) {
        return Err(Error::InvalidPadding);
    }
    Ok(block)
}

/// Returns true if `content` is included in the tree with `root` at the position
/// described by `path` and `index`.
pub fn verify(root: &Digest, content: &[u8], path: &[Digest], index: &[bool]) -> bool {
    bmt::verify::<Sha256>(path, index, &Sha256::hash(content), root)
}
