//! Unit digests and the chained group hash.
//!
//! Every hashable unit is digested with SHA-256. A group's digest evolves by
//! chaining: `running = H(running ‖ next)`, starting from the zero digest
//! when the group opens. The chain is order-sensitive by construction, which
//! is what makes reordering detectable at GOP-level authenticity.

use std::fmt;

use sha2::{Digest as _, Sha256};

/// Width of every digest in the protocol, in bytes.
pub const HASH_SIZE: usize = 32;

/// A SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; HASH_SIZE]);

impl Digest {
    /// The all-zero digest: seed of every group-hash chain.
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    /// Wrap raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Copy out the raw digest bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars identify a digest well enough in logs.
        write!(f, "Digest(")?;
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "…)")
    }
}

/// Digest a unit's hashable span.
#[must_use]
pub fn hash_unit(hashable: &[u8]) -> Digest {
    Digest(Sha256::digest(hashable).into())
}

/// Digest the signed prefix of a manifest TLV body.
#[must_use]
pub fn document_hash(signed_prefix: &[u8]) -> Digest {
    Digest(Sha256::digest(signed_prefix).into())
}

/// The evolving chained digest of one group of pictures.
///
/// Deterministic: the same unit digests in the same order always produce the
/// same group hash, on the signing and the validating side alike.
#[derive(Debug, Clone)]
pub struct GopHash {
    running: Digest,
}

impl Default for GopHash {
    fn default() -> Self {
        Self::new()
    }
}

impl GopHash {
    /// Start a chain from the zero digest.
    #[must_use]
    pub fn new() -> Self {
        Self { running: Digest::ZERO }
    }

    /// Absorb one unit digest: `running = H(running ‖ digest)`.
    pub fn update(&mut self, digest: &Digest) {
        let mut hasher = Sha256::new();
        hasher.update(self.running.as_bytes());
        hasher.update(digest.as_bytes());
        self.running = Digest(hasher.finalize().into());
    }

    /// The chain value after every update so far.
    #[must_use]
    pub fn current(&self) -> Digest {
        self.running
    }

    /// Rewind to the zero digest for the next group.
    pub fn reset(&mut self) {
        self.running = Digest::ZERO;
    }

    /// Chain an iterator of digests in one call.
    #[must_use]
    pub fn over<'a>(digests: impl IntoIterator<Item = &'a Digest>) -> Digest {
        let mut chain = Self::new();
        for d in digests {
            chain.update(d);
        }
        chain.current()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unit_hash_is_sha256() {
        let digest = hash_unit(b"abc");
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn chain_is_deterministic() {
        let a = hash_unit(b"first");
        let b = hash_unit(b"second");

        let mut one = GopHash::new();
        one.update(&a);
        one.update(&b);

        let two = GopHash::over([&a, &b]);
        assert_eq!(one.current(), two);
    }

    #[test]
    fn chain_is_order_sensitive() {
        let a = hash_unit(b"first");
        let b = hash_unit(b"second");
        assert_ne!(GopHash::over([&a, &b]), GopHash::over([&b, &a]));
    }

    #[test]
    fn reset_rewinds_to_zero() {
        let mut chain = GopHash::new();
        chain.update(&hash_unit(b"x"));
        chain.reset();
        assert_eq!(chain.current(), Digest::ZERO);
    }

    #[test]
    fn empty_chain_is_zero() {
        assert_eq!(GopHash::over(std::iter::empty::<&Digest>()), Digest::ZERO);
    }
}
