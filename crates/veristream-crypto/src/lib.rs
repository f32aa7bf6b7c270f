//! Cryptographic primitives for Veristream.
//!
//! Two concerns live here, both deliberately small:
//!
//! - [`digest`]: SHA-256 unit digests, the chained group hash, and the
//!   document hash a manifest signature covers.
//! - [`keys`]: Ed25519 signing/verification over 32-byte digests.
//!
//! The session layer never touches `sha2` or `ed25519-dalek` directly; key
//! and digest material crosses the crate boundary as fixed-width byte
//! arrays.

pub mod digest;
pub mod keys;

pub use digest::{Digest, GopHash, HASH_SIZE, document_hash, hash_unit};
pub use keys::{
    KeyError, PUBLIC_KEY_SIZE, SIGNATURE_SIZE, SigningKeyPair, validate_verifying_key,
    verify_digest,
};
