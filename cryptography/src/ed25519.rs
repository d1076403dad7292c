//! Ed25519 implementation of the [Signer] and [Verifier] traits.
//!
//! This implementation uses the `ed25519-consensus` crate to adhere to a strict
//! set of validation rules for Ed25519 signatures (which is necessary for
//! stability in a consensus context).
//!
//! # Example
//! ```rust
//! use rapidchain_cryptography::{ed25519, PrivateKeyExt, Signer, Verifier};
//! use rand::rngs::OsRng;
//!
//! let signer = ed25519::PrivateKey::from_rng(&mut OsRng);
//! let namespace = Some(&b"demo"[..]);
//! let msg = b"hello, world!";
//! let signature = signer.sign(namespace, msg);
//! assert!(signer.public_key().verify(namespace, msg, &signature));
//! ```

use crate::{Error, PrivateKeyExt, Signer, Verifier};
use bytes::{Buf, BufMut};
use rand::{CryptoRng, Rng};
use rapidchain_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use rapidchain_utils::{hex, union_unique};
use std::{
    cmp::Ordering,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
};

const CURVE_NAME: &str = "ed25519";
const PRIVATE_KEY_LENGTH: usize = 32;
const PUBLIC_KEY_LENGTH: usize = 32;
const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 Private Key.
#[derive(Clone)]
pub struct PrivateKey {
    raw: [u8; PRIVATE_KEY_LENGTH],
    key: ed25519_consensus::SigningKey,
}

impl Signer for PrivateKey {
    type Signature = Signature;
    type PublicKey = PublicKey;

    fn public_key(&self) -> PublicKey {
        PublicKey::from(self.key.verification_key())
    }

    fn sign(&self, namespace: Option<&[u8]>, msg: &[u8]) -> Signature {
        let sig = match namespace {
            Some(namespace) => self.key.sign(&union_unique(namespace, msg)),
            None => self.key.sign(msg),
        };
        Signature::from(sig)
    }
}

impl PrivateKeyExt for PrivateKey {
    fn from_rng<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        Self::from(ed25519_consensus::SigningKey::new(rng))
    }
}

impl From<ed25519_consensus::SigningKey> for PrivateKey {
    fn from(key: ed25519_consensus::SigningKey) -> Self {
        let raw = key.to_bytes();
        Self { raw, key }
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; PRIVATE_KEY_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidPrivateKeyLength)?;
        let key = ed25519_consensus::SigningKey::from(raw);
        Ok(Self { raw, key })
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PrivateKey {}

// Private keys are never printed.
impl Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey({})", PublicKey::from(self.key.verification_key()))
    }
}

/// Ed25519 Public Key.
#[derive(Clone)]
pub struct PublicKey {
    raw: [u8; PUBLIC_KEY_LENGTH],
    key: ed25519_consensus::VerificationKey,
}

impl Verifier for PublicKey {
    type Signature = Signature;

    fn verify(&self, namespace: Option<&[u8]>, msg: &[u8], sig: &Signature) -> bool {
        match namespace {
            Some(namespace) => {
                let payload = union_unique(namespace, msg);
                self.key.verify(&sig.signature, &payload).is_ok()
            }
            None => self.key.verify(&sig.signature, msg).is_ok(),
        }
    }
}

impl crate::PublicKey for PublicKey {}

impl Write for PublicKey {
    fn write(&self, buf: &mut impl BufMut) {
        self.raw.write(buf);
    }
}

impl Read for PublicKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; PUBLIC_KEY_LENGTH]>::read(buf)?;
        Self::try_from(&raw[..]).map_err(|_| CodecError::Invalid(CURVE_NAME, "public key"))
    }
}

impl FixedSize for PublicKey {
    const SIZE: usize = PUBLIC_KEY_LENGTH;
}

impl From<ed25519_consensus::VerificationKey> for PublicKey {
    fn from(key: ed25519_consensus::VerificationKey) -> Self {
        let raw = key.to_bytes();
        Self { raw, key }
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; PUBLIC_KEY_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidPublicKeyLength)?;
        let key = ed25519_consensus::VerificationKey::try_from(raw)
            .map_err(|_| Error::InvalidPublicKey)?;
        Ok(Self { raw, key })
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

/// Ed25519 Signature.
#[derive(Clone)]
pub struct Signature {
    raw: [u8; SIGNATURE_LENGTH],
    signature: ed25519_consensus::Signature,
}

impl crate::Signature for Signature {}

impl Write for Signature {
    fn write(&self, buf: &mut impl BufMut) {
        self.raw.write(buf);
    }
}

impl Read for Signature {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; SIGNATURE_LENGTH]>::read(buf)?;
        Ok(Self::from(ed25519_consensus::Signature::from(raw)))
    }
}

impl FixedSize for Signature {
    const SIZE: usize = SIGNATURE_LENGTH;
}

impl From<ed25519_consensus::Signature> for Signature {
    fn from(value: ed25519_consensus::Signature) -> Self {
        let raw = value.to_bytes();
        Self {
            raw,
            signature: value,
        }
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; SIGNATURE_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidSignatureLength)?;
        Ok(Self::from(ed25519_consensus::Signature::from(raw)))
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Signature {}

impl Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidchain_codec::{DecodeExt, Encode};
    use rapidchain_utils::from_hex_formatted;

    /// Test vector 1 from https://datatracker.ietf.org/doc/html/rfc8032#section-7.1.
    fn vector_1() -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>) {
        (
            from_hex_formatted(
                "
                9d61b19deffd5a60ba844af492ec2cc4
                4449c5697b326919703bac031cae7f60
                ",
            )
            .unwrap(),
            from_hex_formatted(
                "
                d75a980182b10ab7d54bfed3c964073a
                0ee172f3daa62325af021a68f707511a
                ",
            )
            .unwrap(),
            b"".to_vec(),
            from_hex_formatted(
                "
                e5564300c360ac729086e2cc806e828a
                84877f1eb8e5d974d873e06522490155
                5fb8821590a33bacc61e39701cf9b46b
                d25bf5f0595bbe24655141438e7a100b
                ",
            )
            .unwrap(),
        )
    }

    #[test]
    fn rfc8032_test_vector_1() {
        let (secret, public, message, signature) = vector_1();
        let signer = PrivateKey::try_from(&secret[..]).unwrap();
        assert_eq!(signer.public_key().as_ref(), &public[..]);
        let computed = signer.sign(None, &message);
        assert_eq!(computed.as_ref(), &signature[..]);
        let public = PublicKey::try_from(&public[..]).unwrap();
        assert!(public.verify(None, &message, &computed));
        assert!(!public.verify(None, b"different", &computed));
    }

    #[test]
    fn test_namespace() {
        let signer = PrivateKey::from_seed(0);
        let signature = signer.sign(Some(b"rapidchain"), b"message");
        let public = signer.public_key();
        assert!(public.verify(Some(b"rapidchain"), b"message", &signature));
        assert!(!public.verify(Some(b"other"), b"message", &signature));
        assert!(!public.verify(None, b"message", &signature));
    }

    #[test]
    fn test_from_seed_is_deterministic() {
        assert_eq!(PrivateKey::from_seed(7), PrivateKey::from_seed(7));
        assert_ne!(
            PrivateKey::from_seed(7).public_key(),
            PrivateKey::from_seed(8).public_key()
        );
    }

    #[test]
    fn test_codec() {
        let signer = PrivateKey::from_seed(1);
        let public = signer.public_key();
        let decoded = PublicKey::decode(public.encode()).unwrap();
        assert_eq!(public, decoded);

        let signature = signer.sign(None, b"hello");
        let decoded = Signature::decode(signature.encode()).unwrap();
        assert_eq!(signature, decoded);
    }
}
