//! Blocks, chunks, and votes exchanged between participants.
//!
//! Every structure that is hashed or signed is encoded with `rapidchain-codec`, so field
//! order and integer widths are fixed. Changing either invalidates existing signatures.

use crate::chunk;
use bytes::{Buf, BufMut, Bytes};
use rapidchain_codec::{EncodeSize, Encode, Error as CodecError, RangeCfg, Read, ReadExt, Write};
use rapidchain_cryptography::{
    bmt,
    ed25519::{PrivateKey, PublicKey, Signature},
    sha256::Digest,
    Hasher, Sha256, Signer, Verifier,
};
use rapidchain_utils::union;
use std::{fmt::Display, time::Duration};

/// Protocol round. Round 0 is reserved for the genesis block.
pub type Round = u64;

/// Maximum length of a block's issuer or previous hash.
pub const MAX_FIELD_LENGTH: usize = 256;

/// Maximum number of merkle roots a vote may reference.
pub const MAX_BLOCK_HASHES: usize = 1024;

const CHUNK_SUFFIX: &[u8] = b"_CHUNK";
const VOTE_SUFFIX: &[u8] = b"_VOTE";

/// Namespace used to sign chunks.
pub(crate) fn chunk_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, CHUNK_SUFFIX)
}

/// Namespace used to sign votes.
pub(crate) fn vote_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, VOTE_SUFFIX)
}

/// Kind of a [Vote].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    Propose = 0,
    Echo = 1,
    Accept = 2,
}

impl Tag {
    /// All tags, in protocol order.
    pub const ALL: [Tag; 3] = [Tag::Propose, Tag::Echo, Tag::Accept];

    /// Returns the position of the tag in [Tag::ALL].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::Propose => write!(f, "propose"),
            Tag::Echo => write!(f, "echo"),
            Tag::Accept => write!(f, "accept"),
        }
    }
}

impl Write for Tag {
    fn write(&self, buf: &mut impl BufMut) {
        (*self as u8).write(buf);
    }
}

impl EncodeSize for Tag {
    fn encode_size(&self) -> usize {
        1
    }
}

impl Read for Tag {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        match u8::read(buf)? {
            0 => Ok(Tag::Propose),
            1 => Ok(Tag::Echo),
            2 => Ok(Tag::Accept),
            tag => Err(CodecError::InvalidEnum("Tag", tag)),
        }
    }
}

/// Phase of a round, used for telemetry and timeouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Propose,
    Block,
    Echo,
    Accept,
    EndOfRound,
}

impl Phase {
    /// Returns the label of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Propose => "propose",
            Phase::Block => "block",
            Phase::Echo => "echo",
            Phase::Accept => "accept",
            Phase::EndOfRound => "end_of_round",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block proposed by a leader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub issuer: Bytes,
    pub prev_block_hash: Bytes,
    pub round: Round,
    pub payload: Bytes,
}

impl Block {
    pub fn new(issuer: Bytes, prev_block_hash: Bytes, round: Round, payload: Bytes) -> Self {
        Self {
            issuer,
            prev_block_hash,
            round,
            payload,
        }
    }

    /// Returns the SHA-256 digest of the encoded block.
    pub fn digest(&self) -> Digest {
        Sha256::hash(&self.encode())
    }
}

/// Returns the digest of a sequence of decided blocks: the digest of the block itself when
/// there is exactly one, otherwise the SHA-256 of the concatenated block digests.
pub fn digest_blocks(blocks: &[Block]) -> Digest {
    if let [block] = blocks {
        return block.digest();
    }
    let mut hasher = Sha256::new();
    for block in blocks {
        hasher.update(&block.digest());
    }
    hasher.finalize()
}

impl Write for Block {
    fn write(&self, buf: &mut impl BufMut) {
        self.issuer.write(buf);
        self.prev_block_hash.write(buf);
        self.round.write(buf);
        self.payload.write(buf);
    }
}

impl EncodeSize for Block {
    fn encode_size(&self) -> usize {
        self.issuer.encode_size()
            + self.prev_block_hash.encode_size()
            + self.round.encode_size()
            + self.payload.encode_size()
    }
}

impl Read for Block {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let field: RangeCfg<usize> = (..=MAX_FIELD_LENGTH).into();
        let issuer = Bytes::read_cfg(buf, &field)?;
        let prev_block_hash = Bytes::read_cfg(buf, &field)?;
        let round = Round::read(buf)?;
        let payload = Bytes::read_cfg(buf, &(..).into())?;
        Ok(Self {
            issuer,
            prev_block_hash,
            round,
            payload,
        })
    }
}

/// Merkle inclusion proof of a chunk in the tree built over all chunks of its block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkAuthenticator {
    pub merkle_root: Digest,
    pub path: Vec<Digest>,
    /// One bit per path entry: `true` when the sibling follows the running digest.
    pub index: Vec<bool>,
}

impl ChunkAuthenticator {
    /// Returns the chunk position encoded by the index bits.
    pub fn position(&self) -> Option<usize> {
        bmt::position(&self.index)
    }
}

impl Write for ChunkAuthenticator {
    fn write(&self, buf: &mut impl BufMut) {
        self.merkle_root.write(buf);
        self.path.write(buf);
        self.index.write(buf);
    }
}

impl EncodeSize for ChunkAuthenticator {
    fn encode_size(&self) -> usize {
        self.merkle_root.encode_size() + self.path.encode_size() + self.index.encode_size()
    }
}

impl Read for ChunkAuthenticator {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let depth: RangeCfg<usize> = (..=bmt::MAX_DEPTH).into();
        let merkle_root = Digest::read(buf)?;
        let path = Vec::<Digest>::read_cfg(buf, &(depth, ()))?;
        let index = Vec::<bool>::read_cfg(buf, &(depth, ()))?;
        Ok(Self {
            merkle_root,
            path,
            index,
        })
    }
}

/// A fragment of an encoded block (or a parity fragment when erasure coding is enabled).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockChunk {
    pub issuer: PublicKey,
    pub round: Round,
    pub chunk_count: u32,
    pub chunk_index: u32,
    pub payload: Bytes,
    /// Length of `payload` before zero padding.
    pub payload_length: u32,
    pub authenticator: ChunkAuthenticator,
    /// Unset until the proposer signs the chunk.
    pub signature: Option<Signature>,
}

impl BlockChunk {
    /// Returns the digest of every field except the authenticator and the signature.
    pub fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(&self.issuer.encode());
        hasher.update(&self.round.encode());
        hasher.update(&self.chunk_count.encode());
        hasher.update(&self.chunk_index.encode());
        hasher.update(&self.payload.encode());
        hasher.update(&self.payload_length.encode());
        hasher.finalize()
    }

    /// Returns the digest of the full encoding, used to recognize repeated deliveries.
    pub fn key(&self) -> Digest {
        Sha256::hash(&self.encode())
    }

    /// Returns the merkle root of the block this chunk belongs to.
    pub fn root(&self) -> &Digest {
        &self.authenticator.merkle_root
    }

    /// Signs the chunk digest (the issuer must be the signer's public key).
    pub fn sign(&mut self, signer: &PrivateKey, namespace: &[u8]) {
        let namespace = chunk_namespace(namespace);
        self.signature = Some(signer.sign(Some(&namespace), &self.digest()));
    }

    /// Returns true if the chunk carries a valid signature from its issuer.
    pub fn verify_signature(&self, namespace: &[u8]) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        let namespace = chunk_namespace(namespace);
        self.issuer
            .verify(Some(&namespace), &self.digest(), signature)
    }

    /// Returns true if the authenticator proves the payload is the leaf at `chunk_index`
    /// of the tree with the claimed root.
    pub fn verify_proof(&self) -> bool {
        let authenticator = &self.authenticator;
        if authenticator.position() != Some(self.chunk_index as usize) {
            return false;
        }
        chunk::verify(
            &authenticator.merkle_root,
            &self.payload,
            &authenticator.path,
            &authenticator.index,
        )
    }
}

impl Write for BlockChunk {
    fn write(&self, buf: &mut impl BufMut) {
        self.issuer.write(buf);
        self.round.write(buf);
        self.chunk_count.write(buf);
        self.chunk_index.write(buf);
        self.payload.write(buf);
        self.payload_length.write(buf);
        self.authenticator.write(buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for BlockChunk {
    fn encode_size(&self) -> usize {
        self.issuer.encode_size()
            + self.round.encode_size()
            + self.chunk_count.encode_size()
            + self.chunk_index.encode_size()
            + self.payload.encode_size()
            + self.payload_length.encode_size()
            + self.authenticator.encode_size()
            + self.signature.encode_size()
    }
}

impl Read for BlockChunk {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let issuer = PublicKey::read(buf)?;
        let round = Round::read(buf)?;
        let chunk_count = u32::read(buf)?;
        let chunk_index = u32::read(buf)?;
        let payload = Bytes::read_cfg(buf, &(..).into())?;
        let payload_length = u32::read(buf)?;
        if payload_length as usize > payload.len() {
            return Err(CodecError::Invalid("BlockChunk", "payload length"));
        }
        let authenticator = ChunkAuthenticator::read(buf)?;
        let signature = Option::<Signature>::read(buf)?;
        Ok(Self {
            issuer,
            round,
            chunk_count,
            chunk_index,
            payload,
            payload_length,
            authenticator,
            signature,
        })
    }
}

/// Quorum certificate carried by an Accept vote: the Echo votes it certifies.
///
/// The digest of an empty proof is all zeros.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptProof {
    pub echo_votes: Vec<Vote>,
}

impl AcceptProof {
    pub fn new(echo_votes: Vec<Vote>) -> Self {
        Self { echo_votes }
    }

    pub fn is_empty(&self) -> bool {
        self.echo_votes.is_empty()
    }

    /// Returns the SHA-256 of the concatenated echo vote digests.
    pub fn digest(&self) -> Digest {
        if self.echo_votes.is_empty() {
            return Digest::default();
        }
        let mut hasher = Sha256::new();
        for vote in &self.echo_votes {
            hasher.update(&vote.digest());
        }
        hasher.finalize()
    }
}

impl Write for AcceptProof {
    fn write(&self, buf: &mut impl BufMut) {
        self.echo_votes.write(buf);
    }
}

impl EncodeSize for AcceptProof {
    fn encode_size(&self) -> usize {
        self.echo_votes.encode_size()
    }
}

impl Read for AcceptProof {
    /// Maximum number of echo votes.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        // Embedded echo votes may not carry proofs of their own.
        let echo_votes = Vec::<Vote>::read_cfg(buf, &((..=*max).into(), 0))?;
        Ok(Self { echo_votes })
    }
}

/// A signed statement about the merkle roots of a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub issuer: PublicKey,
    pub tag: Tag,
    pub round: Round,
    pub block_hashes: Vec<Digest>,
    pub proof: AcceptProof,
    pub signature: Signature,
}

impl Vote {
    /// Creates a vote signed by `signer`.
    pub fn sign(
        signer: &PrivateKey,
        namespace: &[u8],
        tag: Tag,
        round: Round,
        block_hashes: Vec<Digest>,
        proof: AcceptProof,
    ) -> Self {
        let issuer = signer.public_key();
        let digest = Self::payload_digest(&issuer, tag, round, &block_hashes, &proof);
        let namespace = vote_namespace(namespace);
        let signature = signer.sign(Some(&namespace), &digest);
        Self {
            issuer,
            tag,
            round,
            block_hashes,
            proof,
            signature,
        }
    }

    fn payload_digest(
        issuer: &PublicKey,
        tag: Tag,
        round: Round,
        block_hashes: &[Digest],
        proof: &AcceptProof,
    ) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(&issuer.encode());
        hasher.update(&tag.encode());
        hasher.update(&round.encode());
        for hash in block_hashes {
            hasher.update(hash);
        }
        hasher.update(&proof.digest());
        hasher.finalize()
    }

    /// Returns the digest of every field except the signature.
    pub fn digest(&self) -> Digest {
        Self::payload_digest(
            &self.issuer,
            self.tag,
            self.round,
            &self.block_hashes,
            &self.proof,
        )
    }

    /// Returns the digest of the full encoding, used to recognize repeated deliveries.
    pub fn key(&self) -> Digest {
        Sha256::hash(&self.encode())
    }

    /// Returns true if the signature is valid under the issuer's key.
    pub fn verify(&self, namespace: &[u8]) -> bool {
        let namespace = vote_namespace(namespace);
        self.issuer
            .verify(Some(&namespace), &self.digest(), &self.signature)
    }
}

impl Write for Vote {
    fn write(&self, buf: &mut impl BufMut) {
        self.issuer.write(buf);
        self.tag.write(buf);
        self.round.write(buf);
        self.block_hashes.write(buf);
        self.proof.write(buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for Vote {
    fn encode_size(&self) -> usize {
        self.issuer.encode_size()
            + self.tag.encode_size()
            + self.round.encode_size()
            + self.block_hashes.encode_size()
            + self.proof.encode_size()
            + self.signature.encode_size()
    }
}

impl Read for Vote {
    /// Maximum number of echo votes in the proof.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max_echoes: &usize) -> Result<Self, CodecError> {
        let issuer = PublicKey::read(buf)?;
        let tag = Tag::read(buf)?;
        let round = Round::read(buf)?;
        let block_hashes = Vec::<Digest>::read_cfg(buf, &((..=MAX_BLOCK_HASHES).into(), ()))?;
        let proof = AcceptProof::read_cfg(buf, max_echoes)?;
        let signature = Signature::read(buf)?;
        Ok(Self {
            issuer,
            tag,
            round,
            block_hashes,
            proof,
            signature,
        })
    }
}

/// Misbehavior observed in a message from a participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Signature does not verify under the issuer's key.
    InvalidSignature,
    /// Merkle proof does not authenticate the chunk.
    InvalidProof,
    /// Chunk or Propose vote from a participant that is not a leader of the round.
    NotLeader,
    /// Vote from a key outside the participant set.
    NotParticipant,
    /// Vote references a different set of merkle roots.
    Mismatch,
    /// Accept vote whose echo quorum does not verify.
    InvalidCertificate,
    /// Message is structurally inconsistent with the round configuration.
    Malformed,
}

impl Fault {
    /// Returns the label of the fault.
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::InvalidSignature => "invalid_signature",
            Fault::InvalidProof => "invalid_proof",
            Fault::NotLeader => "not_leader",
            Fault::NotParticipant => "not_participant",
            Fault::Mismatch => "mismatch",
            Fault::InvalidCertificate => "invalid_certificate",
            Fault::Malformed => "malformed",
        }
    }
}

/// Activity observed by the engine, delivered to a [crate::Reporter].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Activity {
    /// A phase of the round completed `elapsed` after the round started.
    Phase {
        round: Round,
        phase: Phase,
        elapsed: Duration,
    },
    /// A message from `issuer` was dropped.
    Fault {
        round: Round,
        issuer: PublicKey,
        fault: Fault,
    },
    /// The round decided on the blocks with these merkle roots.
    Decided { round: Round, roots: Vec<Digest> },
}
