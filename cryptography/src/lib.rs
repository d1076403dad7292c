//! Generate keys, sign arbitrary messages, deterministically verify signatures, and
//! authenticate fragments of a message against a Merkle root.

use rand::{CryptoRng, Rng, SeedableRng};
use rapidchain_codec::{Encode, FixedSize, Read};
use std::{
    fmt::{Debug, Display},
    hash::Hash,
};
use thiserror::Error;

pub mod bmt;
pub mod ed25519;
pub mod sha256;
pub use sha256::{hash, Sha256};

/// Errors that can occur when interacting with cryptographic primitives.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid digest length")]
    InvalidDigestLength,
    #[error("invalid private key length")]
    InvalidPrivateKeyLength,
    #[error("invalid public key length")]
    InvalidPublicKeyLength,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature length")]
    InvalidSignatureLength,
    #[error("tree has no leaves")]
    NoLeaves,
    #[error("invalid position: {0} (leaves: {1})")]
    InvalidPosition(usize, usize),
}

/// Produces [Signature]s over messages that can be verified with a corresponding [PublicKey].
pub trait Signer: Send + Sync + Clone + 'static {
    /// The type of [Signature] produced by this [Signer].
    type Signature: Signature;

    /// The corresponding [PublicKey] type.
    type PublicKey: PublicKey<Signature = Self::Signature>;

    /// Returns the [PublicKey] corresponding to this [Signer].
    fn public_key(&self) -> Self::PublicKey;

    /// Sign a message with the given namespace.
    ///
    /// The namespace is prepended to the message (see [rapidchain_utils::union_unique]) so a
    /// signature produced for one context cannot be replayed in another.
    fn sign(&self, namespace: Option<&[u8]>, msg: &[u8]) -> Self::Signature;
}

/// A [Signer] that can be generated from a seed or RNG.
pub trait PrivateKeyExt: Signer {
    /// Create a signer from a seed.
    ///
    /// # Warning
    ///
    /// This function is insecure and should only be used for simulations and testing.
    fn from_seed(seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        Self::from_rng(&mut rng)
    }

    /// Create a fresh signer using the supplied RNG.
    fn from_rng<R: Rng + CryptoRng>(rng: &mut R) -> Self;
}

/// Verifies [Signature]s over messages.
pub trait Verifier {
    /// The type of [Signature] that this verifier can verify.
    type Signature: Signature;

    /// Verify that a [Signature] is valid over a given message.
    ///
    /// The namespace provided here must match the namespace provided during signing.
    fn verify(&self, namespace: Option<&[u8]>, msg: &[u8], sig: &Self::Signature) -> bool;
}

/// A [PublicKey], able to verify [Signature]s.
pub trait PublicKey:
    Verifier
    + Clone
    + Eq
    + Ord
    + Hash
    + Debug
    + Display
    + AsRef<[u8]>
    + Send
    + Sync
    + Read<Cfg = ()>
    + Encode
    + FixedSize
    + 'static
{
}

/// A [Signature] over a message.
pub trait Signature:
    Clone + Eq + Debug + AsRef<[u8]> + Send + Sync + Read<Cfg = ()> + Encode + FixedSize + 'static
{
}

/// A fixed-size output of a [Hasher].
pub trait Digest:
    Copy
    + Eq
    + Ord
    + Hash
    + Debug
    + Display
    + AsRef<[u8]>
    + Default
    + Send
    + Sync
    + Read<Cfg = ()>
    + Encode
    + FixedSize
    + 'static
{
}

/// Interface relied on for hashing.
///
/// Implementations do not clone the hasher state: a clone starts from the initial state.
pub trait Hasher: Clone + Send + Sync + 'static {
    /// Digest generated by the hasher.
    type Digest: Digest;

    /// Create a new hasher.
    fn new() -> Self;

    /// Append message to previously recorded data.
    fn update(&mut self, message: &[u8]);

    /// Hash all recorded data and reset the hasher to the initial state.
    fn finalize(&mut self) -> Self::Digest;

    /// Reset the hasher without generating a hash.
    fn reset(&mut self);

    /// Hash a single message with a fresh hasher.
    fn hash(message: &[u8]) -> Self::Digest {
        let mut hasher = Self::new();
        hasher.update(message);
        hasher.finalize()
    }
}
