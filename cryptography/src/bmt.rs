//! Binary Merkle tree over pre-hashed leaves, with path-and-direction inclusion proofs.
//!
//! # Construction
//!
//! Every level with an odd number of nodes (other than the root level) duplicates its
//! last node before pairing, and each parent is `hash(left || right)`. A tree with a
//! single leaf has that leaf as its root (and proofs with no siblings).
//!
//! # Proofs
//!
//! A [Proof] holds the sibling digests from the leaf level up to (but excluding) the
//! root, together with one direction bit per sibling: `true` when the running digest
//! is the left child (the sibling follows it), `false` when the sibling precedes it.
//! Because every leaf of a tree has a path of the same length, the direction bits of a
//! valid proof also encode the position of the leaf (see [Proof::position]).
//!
//! # Example
//!
//! ```rust
//! use rapidchain_cryptography::{bmt::Tree, hash, Sha256};
//!
//! let leaves: Vec<_> = (0u8..5).map(|i| hash(&[i])).collect();
//! let tree = Tree::<Sha256>::new(&leaves).unwrap();
//! let proof = tree.proof(3).unwrap();
//! assert!(proof.verify::<Sha256>(&leaves[3], &tree.root()));
//! assert_eq!(proof.position(), Some(3));
//! ```

use crate::{Digest, Error, Hasher};
use bytes::{Buf, BufMut};
use rapidchain_codec::{EncodeSize, Error as CodecError, RangeCfg, Read, Write};

/// Maximum number of siblings accepted when decoding a [Proof].
pub const MAX_DEPTH: usize = 64;

/// A binary Merkle tree.
#[derive(Clone, Debug)]
pub struct Tree<H: Hasher> {
    /// Levels from the leaves (index 0) to the root, each already padded to an even
    /// length (except the root level).
    levels: Vec<Vec<H::Digest>>,
    leaves: usize,
}

impl<H: Hasher> Tree<H> {
    /// Builds a tree over `leaves` (which should already be digests of the items).
    pub fn new(leaves: &[H::Digest]) -> Result<Self, Error> {
        if leaves.is_empty() {
            return Err(Error::NoLeaves);
        }

        let mut hasher = H::new();
        let mut levels = Vec::new();
        let mut current = leaves.to_vec();
        while current.len() > 1 {
            if current.len() % 2 == 1 {
                let last = current[current.len() - 1];
                current.push(last);
            }
            let next = current
                .chunks_exact(2)
                .map(|pair| {
                    hasher.update(pair[0].as_ref());
                    hasher.update(pair[1].as_ref());
                    hasher.finalize()
                })
                .collect();
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Ok(Self {
            levels,
            leaves: leaves.len(),
        })
    }

    /// Returns the root of the tree.
    pub fn root(&self) -> H::Digest {
        self.levels[self.levels.len() - 1][0]
    }

    /// Returns the number of leaves the tree was built over.
    pub fn leaves(&self) -> usize {
        self.leaves
    }

    /// Generates the inclusion proof for the leaf at `position`.
    pub fn proof(&self, position: usize) -> Result<Proof<H::Digest>, Error> {
        if position >= self.leaves {
            return Err(Error::InvalidPosition(position, self.leaves));
        }

        let depth = self.levels.len() - 1;
        let mut siblings = Vec::with_capacity(depth);
        let mut directions = Vec::with_capacity(depth);
        let mut index = position;
        for level in &self.levels[..depth] {
            let is_left = index % 2 == 0;
            siblings.push(level[index ^ 1]);
            directions.push(is_left);
            index /= 2;
        }
        Ok(Proof {
            siblings,
            directions,
        })
    }
}

/// An inclusion proof for a single leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof<D: Digest> {
    /// Sibling digests, from the leaf level upwards.
    pub siblings: Vec<D>,
    /// Direction bits (`true` when the sibling follows the running digest).
    pub directions: Vec<bool>,
}

impl<D: Digest> Proof<D> {
    /// Recomputes the root from `leaf` and returns true if it matches `root`.
    ///
    /// Returns false (rather than failing) if the number of siblings does not match the
    /// number of direction bits.
    pub fn verify<H: Hasher<Digest = D>>(&self, leaf: &D, root: &D) -> bool {
        verify::<H>(&self.siblings, &self.directions, leaf, root)
    }

    /// Returns the leaf position encoded by the direction bits, if it fits in a `usize`.
    pub fn position(&self) -> Option<usize> {
        position(&self.directions)
    }
}

/// Folds `leaf` with each sibling (in the order given by `directions`) and compares the
/// result with `root`.
pub fn verify<H: Hasher>(
    siblings: &[H::Digest],
    directions: &[bool],
    leaf: &H::Digest,
    root: &H::Digest,
) -> bool {
    if siblings.len() != directions.len() {
        return false;
    }
    let mut hasher = H::new();
    let mut running = *leaf;
    for (sibling, sibling_follows) in siblings.iter().zip(directions) {
        if *sibling_follows {
            hasher.update(running.as_ref());
            hasher.update(sibling.as_ref());
        } else {
            hasher.update(sibling.as_ref());
            hasher.update(running.as_ref());
        }
        running = hasher.finalize();
    }
    running == *root
}

/// Returns the leaf position encoded by a sequence of direction bits.
///
/// At depth `i` a left child contributes nothing and a right child contributes `1 << i`.
pub fn position(directions: &[bool]) -> Option<usize> {
    if directions.len() > usize::BITS as usize {
        return None;
    }
    Some(
        directions
            .iter()
            .enumerate()
            .filter(|(_, sibling_follows)| !**sibling_follows)
            .fold(0usize, |acc, (depth, _)| acc | (1 << depth)),
    )
}

impl<D: Digest> Write for Proof<D> {
    fn write(&self, buf: &mut impl BufMut) {
        self.siblings.write(buf);
        self.directions.write(buf);
    }
}

impl<D: Digest> EncodeSize for Proof<D> {
    fn encode_size(&self) -> usize {
        self.siblings.encode_size() + self.directions.encode_size()
    }
}

impl<D: Digest> Read for Proof<D> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let range: RangeCfg<usize> = (..=MAX_DEPTH).into();
        let siblings = Vec::<D>::read_cfg(buf, &(range, ()))?;
        let directions = Vec::<bool>::read_cfg(buf, &(range, ()))?;
        Ok(Self {
            siblings,
            directions,
        })
    }
}
