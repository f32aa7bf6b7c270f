//! Ed25519 signing and verification over document digests.
//!
//! The message signed is always a 32-byte digest, never the raw TLV bytes,
//! so the signing side can hand the digest to an external signer without
//! shipping the whole manifest.
//!
//! # Security
//!
//! - Key-parse failure is an error ([`KeyError`]); a signature that simply
//!   does not verify is a `false`, not an error. The session layer treats
//!   the former as an external failure and the latter as a tampered group.
//! - Seed bytes handed in through [`SigningKeyPair::from_seed_bytes`] are
//!   wiped after the key is derived.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroize;

use crate::digest::Digest;

/// Width of a serialized verifying key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Width of a serialized signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Errors for key material that cannot be used at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A serialized verifying key did not decode to a curve point.
    #[error("verifying key bytes do not form a valid Ed25519 point")]
    InvalidVerifyingKey,

    /// Seed material had the wrong length.
    #[error("signing key seed must be {expected} bytes, got {actual}")]
    InvalidSeedLength {
        /// Required seed length
        expected: usize,
        /// Length supplied
        actual: usize,
    },
}

/// An Ed25519 key pair owned by the signing side.
pub struct SigningKeyPair {
    key: SigningKey,
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material.
        f.debug_struct("SigningKeyPair")
            .field("verifying_key", &hex_prefix(&self.verifying_key_bytes()))
            .finish_non_exhaustive()
    }
}

fn hex_prefix(bytes: &[u8; PUBLIC_KEY_SIZE]) -> String {
    bytes[..4].iter().map(|b| format!("{b:02x}")).collect()
}

impl SigningKeyPair {
    /// Generate a fresh key pair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self { key: SigningKey::generate(&mut OsRng) }
    }

    /// Derive a key pair from externally supplied seed bytes.
    ///
    /// The input is zeroed once the key is derived.
    pub fn from_seed_bytes(seed: &mut [u8]) -> Result<Self, KeyError> {
        if seed.len() != PUBLIC_KEY_SIZE {
            return Err(KeyError::InvalidSeedLength {
                expected: PUBLIC_KEY_SIZE,
                actual: seed.len(),
            });
        }
        let mut fixed = [0u8; PUBLIC_KEY_SIZE];
        fixed.copy_from_slice(seed);
        let key = SigningKey::from_bytes(&fixed);
        fixed.zeroize();
        seed.zeroize();
        Ok(Self { key })
    }

    /// Sign a document digest.
    #[must_use]
    pub fn sign(&self, digest: &Digest) -> [u8; SIGNATURE_SIZE] {
        self.key.sign(digest.as_bytes()).to_bytes()
    }

    /// The serialized verifying key to publish in recurrent SEIs.
    #[must_use]
    pub fn verifying_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.key.verifying_key().to_bytes()
    }
}

/// Check that verifying-key bytes decode to a usable Ed25519 key.
///
/// The validator calls this once when caching a key received in-stream, so
/// later verifications cannot fail on the key itself.
pub fn validate_verifying_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> Result<(), KeyError> {
    VerifyingKey::from_bytes(public_key).map(|_| ()).map_err(|_| KeyError::InvalidVerifyingKey)
}

/// Verify a signature over a document digest.
///
/// Returns `Ok(true)` when the signature is valid, `Ok(false)` when it is
/// not, and `Err` only when the key bytes themselves are unusable.
pub fn verify_digest(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    digest: &Digest,
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<bool, KeyError> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| KeyError::InvalidVerifyingKey)?;
    let signature = Signature::from_bytes(signature);
    Ok(key.verify(digest.as_bytes(), &signature).is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::digest::hash_unit;

    #[test]
    fn sign_verify_round_trip() {
        let pair = SigningKeyPair::generate();
        let digest = hash_unit(b"group document");
        let signature = pair.sign(&digest);
        assert_eq!(verify_digest(&pair.verifying_key_bytes(), &digest, &signature), Ok(true));
    }

    #[test]
    fn wrong_digest_fails_verification() {
        let pair = SigningKeyPair::generate();
        let signature = pair.sign(&hash_unit(b"one"));
        assert_eq!(
            verify_digest(&pair.verifying_key_bytes(), &hash_unit(b"two"), &signature),
            Ok(false)
        );
    }

    #[test]
    fn wrong_key_fails_verification() {
        let signer = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let digest = hash_unit(b"document");
        let signature = signer.sign(&digest);
        assert_eq!(verify_digest(&other.verifying_key_bytes(), &digest, &signature), Ok(false));
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let mut seed_a = [7u8; 32];
        let mut seed_b = [7u8; 32];
        let a = SigningKeyPair::from_seed_bytes(&mut seed_a).unwrap();
        let b = SigningKeyPair::from_seed_bytes(&mut seed_b).unwrap();
        assert_eq!(a.verifying_key_bytes(), b.verifying_key_bytes());
        // Seed material is wiped after derivation.
        assert_eq!(seed_a, [0u8; 32]);
    }

    #[test]
    fn short_seed_is_rejected() {
        let mut seed = [0u8; 16];
        assert!(matches!(
            SigningKeyPair::from_seed_bytes(&mut seed),
            Err(KeyError::InvalidSeedLength { expected: 32, actual: 16 })
        ));
    }
}
