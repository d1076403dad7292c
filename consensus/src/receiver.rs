use crate::{
    chunk::{merge_payloads, reconstruct, sufficient},
    config::Layout,
    types::{Block, BlockChunk, Round},
    Error,
};
use rapidchain_cryptography::sha256::Digest;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Collects the chunks of every leader block of a round, grouped by merkle root.
pub struct BlockReceiver {
    round: Round,
    leaders: usize,
    layout: Layout,
    buckets: BTreeMap<Digest, BTreeMap<u32, BlockChunk>>,
}

impl BlockReceiver {
    /// Creates a receiver expecting one block per leader, each chunked with `layout`.
    pub fn new(round: Round, leaders: usize, layout: Layout) -> Self {
        Self {
            round,
            leaders,
            layout,
            buckets: BTreeMap::new(),
        }
    }

    /// Adds an authenticated chunk.
    ///
    /// Returns false if a chunk with the same root and index was already added.
    pub fn add_chunk(&mut self, chunk: BlockChunk) -> Result<bool, Error> {
        let total = self.layout.total();
        if chunk.round != self.round {
            return Err(Error::InvalidChunk {
                round: self.round,
                reason: "round",
            });
        }
        if chunk.chunk_count != total {
            return Err(Error::InvalidChunk {
                round: self.round,
                reason: "chunk count",
            });
        }
        if chunk.chunk_index >= total {
            return Err(Error::InvalidChunk {
                round: self.round,
                reason: "chunk index",
            });
        }

        let root = *chunk.root();
        if !self.buckets.contains_key(&root) && self.buckets.len() >= self.leaders {
            return Err(Error::TooManyBlocks {
                round: self.round,
                leaders: self.leaders,
            });
        }
        let bucket = self.buckets.entry(root).or_default();
        if bucket.contains_key(&chunk.chunk_index) {
            return Ok(false);
        }
        bucket.insert(chunk.chunk_index, chunk);
        Ok(true)
    }

    fn complete(&self, bucket: &BTreeMap<u32, BlockChunk>) -> bool {
        match &self.layout {
            Layout::Plain { chunks } => bucket.len() == *chunks as usize,
            Layout::Coded { erasure, total } => {
                sufficient(&Self::positions(bucket, *total), erasure)
            }
        }
    }

    fn positions(bucket: &BTreeMap<u32, BlockChunk>, total: u32) -> Vec<Option<&BlockChunk>> {
        (0..total).map(|index| bucket.get(&index)).collect()
    }

    /// Returns true once a complete (or recoverable) block has arrived from every leader.
    pub fn received_all(&self) -> bool {
        self.buckets.len() == self.leaders
            && self.buckets.values().all(|bucket| self.complete(bucket))
    }

    /// Returns the number of distinct merkle roots seen.
    pub fn roots(&self) -> usize {
        self.buckets.len()
    }

    fn assemble(&self, root: &Digest, bucket: &BTreeMap<u32, BlockChunk>) -> Result<Block, Error> {
        match &self.layout {
            Layout::Plain { .. } => merge_payloads(bucket.values().map(|chunk| &chunk.payload)),
            Layout::Coded { erasure, total } => {
                let payloads = reconstruct(&Self::positions(bucket, *total), erasure, root)?;
                merge_payloads(&payloads)
            }
        }
    }

    /// Reassembles every block, ordered by ascending merkle root.
    ///
    /// Blocks are reassembled in parallel.
    pub fn blocks(&self) -> Result<(Vec<Block>, Vec<Digest>), Error> {
        if !self.received_all() {
            return Err(Error::Incomplete { round: self.round });
        }
        let buckets: Vec<_> = self.buckets.iter().collect();
        let blocks = buckets
            .par_iter()
            .map(|(root, bucket)| self.assemble(root, bucket))
            .collect::<Result<Vec<_>, _>>()?;
        let roots: Vec<Digest> = self.buckets.keys().copied().collect();
        debug!(round = self.round, blocks = blocks.len(), "reassembled blocks");
        Ok((blocks, roots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunk::{authenticate, chunk, chunk_with_erasure},
        config::Erasure,
    };
    use bytes::Bytes;
    use rapidchain_cryptography::{ed25519::PrivateKey, PrivateKeyExt, Signer};

    fn block(leader: u64, round: Round) -> Block {
        Block::new(
            Bytes::from(format!("node-{leader}")),
            Bytes::from_static(b"parent"),
            round,
            Bytes::from(vec![leader as u8; 300]),
        )
    }

    fn plain(leader: u64, round: Round, n: u32) -> (Block, Vec<BlockChunk>, Digest) {
        let block = block(leader, round);
        let issuer = PrivateKey::from_seed(leader).public_key();
        let (chunks, root) = chunk(&issuer, &block, n).unwrap();
        (block, chunks, root)
    }

    #[test]
    fn test_single_leader() {
        let (block, chunks, root) = plain(0, 1, 4);
        let mut receiver = BlockReceiver::new(1, 1, Layout::Plain { chunks: 4 });
        for chunk in chunks.into_iter().rev() {
            assert!(!receiver.received_all());
            assert!(receiver.add_chunk(chunk).unwrap());
        }
        assert!(receiver.received_all());
        let (blocks, roots) = receiver.blocks().unwrap();
        assert_eq!(blocks, vec![block]);
        assert_eq!(roots, vec![root]);
    }

    #[test]
    fn test_duplicate_index_ignored() {
        let (_, chunks, _) = plain(0, 1, 4);
        let mut receiver = BlockReceiver::new(1, 1, Layout::Plain { chunks: 4 });
        assert!(receiver.add_chunk(chunks[2].clone()).unwrap());
        assert!(!receiver.add_chunk(chunks[2].clone()).unwrap());
        assert_eq!(receiver.roots(), 1);
    }

    #[test]
    fn test_multiple_leaders_sorted_by_root() {
        let leaders = 3;
        let mut receiver = BlockReceiver::new(2, leaders, Layout::Plain { chunks: 5 });
        let mut expected = Vec::new();
        let mut all = Vec::new();
        for leader in 0..leaders as u64 {
            let (block, chunks, root) = plain(leader, 2, 5);
            expected.push((root, block));
            all.extend(chunks);
        }

        // Interleave leaders
        all.sort_by_key(|chunk| chunk.chunk_index);
        for chunk in all {
            receiver.add_chunk(chunk).unwrap();
        }
        expected.sort_by_key(|(root, _)| *root);

        let (blocks, roots) = receiver.blocks().unwrap();
        assert_eq!(roots, expected.iter().map(|(root, _)| *root).collect::<Vec<_>>());
        assert_eq!(blocks, expected.into_iter().map(|(_, block)| block).collect::<Vec<_>>());
    }

    #[test]
    fn test_too_many_blocks() {
        let mut receiver = BlockReceiver::new(1, 1, Layout::Plain { chunks: 4 });
        let (_, first, _) = plain(0, 1, 4);
        let (_, second, _) = plain(1, 1, 4);
        receiver.add_chunk(first[0].clone()).unwrap();
        assert!(matches!(
            receiver.add_chunk(second[0].clone()),
            Err(Error::TooManyBlocks { round: 1, leaders: 1 })
        ));
    }

    #[test]
    fn test_invalid_chunks() {
        let mut receiver = BlockReceiver::new(1, 1, Layout::Plain { chunks: 4 });
        let (_, chunks, _) = plain(0, 1, 8);
        assert!(matches!(
            receiver.add_chunk(chunks[0].clone()),
            Err(Error::InvalidChunk { reason: "chunk count", .. })
        ));

        let mut chunk = chunks[0].clone();
        chunk.chunk_count = 4;
        chunk.chunk_index = 4;
        assert!(matches!(
            receiver.add_chunk(chunk),
            Err(Error::InvalidChunk { reason: "chunk index", .. })
        ));

        let (_, other_round, _) = plain(0, 2, 4);
        assert!(matches!(
            receiver.add_chunk(other_round[0].clone()),
            Err(Error::InvalidChunk { reason: "round", .. })
        ));
    }

    #[test]
    fn test_incomplete() {
        let (_, chunks, _) = plain(0, 1, 4);
        let mut receiver = BlockReceiver::new(1, 2, Layout::Plain { chunks: 4 });
        for chunk in chunks {
            receiver.add_chunk(chunk).unwrap();
        }

        // One of two leaders
        assert!(!receiver.received_all());
        assert!(matches!(receiver.blocks(), Err(Error::Incomplete { round: 1 })));
    }

    #[test]
    fn test_coded_with_missing_chunks() {
        let erasure = Erasure {
            data_chunks: 4,
            parity_chunks: 2,
        };
        let block = block(0, 1);
        let issuer = PrivateKey::from_seed(0).public_key();
        let (chunks, root) = chunk_with_erasure(&issuer, &block, 8, &erasure).unwrap();
        let mut receiver = BlockReceiver::new(1, 1, Layout::Coded { erasure, total: 12 });

        // Withhold two chunks of each group
        for chunk in chunks {
            if matches!(chunk.chunk_index, 0 | 3 | 7 | 8) {
                continue;
            }
            receiver.add_chunk(chunk).unwrap();
        }
        assert!(receiver.received_all());
        let (blocks, roots) = receiver.blocks().unwrap();
        assert_eq!(blocks, vec![block]);
        assert_eq!(roots, vec![root]);
    }

    #[test]
    fn test_coded_insufficient() {
        let erasure = Erasure {
            data_chunks: 2,
            parity_chunks: 1,
        };
        let block = block(0, 1);
        let issuer = PrivateKey::from_seed(0).public_key();
        let (chunks, _) = chunk_with_erasure(&issuer, &block, 2, &erasure).unwrap();
        let mut receiver = BlockReceiver::new(1, 1, Layout::Coded { erasure, total: 3 });
        receiver.add_chunk(chunks[2].clone()).unwrap();
        assert!(!receiver.received_all());
        receiver.add_chunk(chunks[0].clone()).unwrap();
        assert!(receiver.received_all());
        assert_eq!(receiver.blocks().unwrap().0, vec![block]);
    }

    #[test]
    fn test_coded_shards_from_different_encodings() {
        let erasure = Erasure {
            data_chunks: 2,
            parity_chunks: 1,
        };
        let issuer = PrivateKey::from_seed(0).public_key();
        let block = Block::new(
            Bytes::from_static(b"node-0"),
            Bytes::from_static(b"parent"),
            1,
            Bytes::from(vec![7u8; 64]),
        );
        let mut altered = vec![7u8; 64];
        altered[63] = 9;
        let other = Block::new(
            block.issuer.clone(),
            block.prev_block_hash.clone(),
            1,
            Bytes::from(altered),
        );

        // Data chunks of one block with the parity chunk of the other, under one tree
        let (mut chunks, _) = chunk_with_erasure(&issuer, &block, 2, &erasure).unwrap();
        let (parity, _) = chunk_with_erasure(&issuer, &other, 2, &erasure).unwrap();
        assert_eq!(chunks[0].payload, parity[0].payload);
        assert_ne!(chunks[1].payload, parity[1].payload);
        chunks[2] = parity[2].clone();
        let root = authenticate(&mut chunks).unwrap();
        assert!(chunks.iter().all(|chunk| chunk.verify_proof()));

        // Neither subset may reassemble a block
        for subset in [[0usize, 1], [0, 2]] {
            let mut receiver = BlockReceiver::new(1, 1, Layout::Coded { erasure, total: 3 });
            for index in subset {
                receiver.add_chunk(chunks[index].clone()).unwrap();
            }
            assert!(receiver.received_all());
            assert!(matches!(
                receiver.blocks(),
                Err(Error::InconsistentEncoding { round: 1, .. })
            ));
        }
        let mut receiver = BlockReceiver::new(1, 1, Layout::Coded { erasure, total: 3 });
        receiver.add_chunk(chunks[1].clone()).unwrap();
        receiver.add_chunk(chunks[2].clone()).unwrap();
        assert!(receiver.blocks().is_err());
        assert_eq!(root, *chunks[0].root());
    }
}
