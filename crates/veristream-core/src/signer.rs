//! The signing side: turns a coded stream into a signed stream.
//!
//! Every primary I slice closes the group being accumulated: the I's digest
//! is absorbed as the group's linking tail, the chained group hash is
//! finalized, a manifest is built and signed, and the resulting SEI is
//! queued for the caller to prepend before that I in the outgoing stream.
//! The same I digest then seeds the next group, which is what lets the
//! validator verify it from both sides.
//!
//! Recurrent tags (product info, public key, vendor attestation) are carried
//! only when `counter % interval == offset`, so heavyweight metadata is not
//! repeated in every SEI.

use tracing::debug;
use veristream_crypto::{SigningKeyPair, document_hash, hash_unit};
use veristream_proto::tlv::{ManifestBody, ProductInfo, VendorAttestation};
use veristream_proto::{Codec, TLV_VERSION, append_signature, build_sei_unit, parse_unit};

use crate::error::{Result, SessionError};
use crate::gop::GroupTracker;

/// Which granularity the emitted signatures cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticityLevel {
    /// One signed digest per group; any tampering invalidates the group.
    Gop,
    /// A signed list of per-unit digests; tampering is pinpointed per unit.
    #[default]
    Frame,
}

/// A signing session.
///
/// Single-threaded; callers serialize access. One session per stream.
pub struct Signer {
    codec: Codec,
    level: AuthenticityLevel,
    recurrence_interval: u32,
    recurrence_offset: u32,
    keypair: Option<SigningKeyPair>,
    product_info: ProductInfo,
    vendor_attestation: Option<VendorAttestation>,
    arbitrary_data: Option<Vec<u8>>,
    tracker: GroupTracker,
    queue: Vec<Vec<u8>>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("codec", &self.codec)
            .field("level", &self.level)
            .field("recurrence_interval", &self.recurrence_interval)
            .field("queued_seis", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Create a signing session for `codec`.
    #[must_use]
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            level: AuthenticityLevel::default(),
            recurrence_interval: 1,
            recurrence_offset: 0,
            keypair: None,
            product_info: ProductInfo::default(),
            vendor_attestation: None,
            arbitrary_data: None,
            tracker: GroupTracker::new(),
            queue: Vec::new(),
        }
    }

    /// Select the authenticity level for subsequently closed groups.
    pub fn set_authenticity_level(&mut self, level: AuthenticityLevel) {
        self.level = level;
    }

    /// Install the signing key pair.
    pub fn set_signing_key(&mut self, keypair: SigningKeyPair) {
        self.keypair = Some(keypair);
    }

    /// Derive and install a signing key from seed bytes; wipes the input.
    pub fn set_private_key(&mut self, seed: &mut [u8]) -> Result<()> {
        self.keypair = Some(SigningKeyPair::from_seed_bytes(seed)?);
        Ok(())
    }

    /// How often recurrent tags are emitted (in groups). Must be ≥ 1.
    pub fn set_recurrence_interval(&mut self, interval: u32) -> Result<()> {
        if interval == 0 {
            return Err(SessionError::InvalidParameter);
        }
        self.recurrence_interval = interval;
        Ok(())
    }

    /// Product information carried in recurrent SEIs.
    pub fn set_product_info(&mut self, info: ProductInfo) {
        self.product_info = info;
    }

    /// Vendor attestation report carried in recurrent SEIs.
    pub fn set_vendor_attestation(&mut self, attestation: VendorAttestation) {
        self.vendor_attestation = Some(attestation);
    }

    /// Opaque application data carried in every SEI.
    pub fn set_arbitrary_data(&mut self, data: Vec<u8>) {
        self.arbitrary_data = Some(data);
    }

    /// Shift which groups carry the recurrent tags. Test builds only.
    #[cfg(feature = "test-utils")]
    pub fn set_recurrence_offset(&mut self, offset: u32) -> Result<()> {
        if self.recurrence_interval == 1 && offset > 0 {
            return Err(SessionError::NotSupported);
        }
        self.recurrence_offset = offset;
        Ok(())
    }

    /// Cap the per-unit digest list to force GOP fallback. Test builds only.
    #[cfg(feature = "test-utils")]
    pub fn set_hash_list_capacity(&mut self, capacity: usize) {
        self.tracker.set_list_capacity(capacity);
    }

    /// The verifying key published in recurrent SEIs, once a key is set.
    #[must_use]
    pub fn verifying_key_bytes(&self) -> Option<[u8; 32]> {
        self.keypair.as_ref().map(SigningKeyPair::verifying_key_bytes)
    }

    /// Feed one coded unit of the outgoing stream.
    ///
    /// When the unit opens a new group, the SEI closing the previous group
    /// becomes available from [`Self::take_seis_to_prepend`] and must be
    /// inserted before this unit in the emitted stream.
    pub fn add_unit(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(SessionError::InvalidParameter);
        }
        if self.keypair.is_none() {
            return Err(SessionError::NotSupported);
        }

        let unit = parse_unit(data, self.codec, true);
        let Some(hashable) = unit.hashable_bytes() else {
            return Ok(());
        };
        let digest = hash_unit(hashable);

        if unit.is_first_in_gop() {
            self.close_group(&digest)?;
        }
        self.tracker.absorb(&digest, self.level == AuthenticityLevel::Frame);
        Ok(())
    }

    /// Drain the SEIs queued for prepending, oldest first.
    pub fn take_seis_to_prepend(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.queue)
    }

    /// Forget all group state and queued SEIs; configuration and the key
    /// survive.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.queue.clear();
    }

    /// Close the current group with `tail` as its linking digest and queue
    /// the signed SEI.
    fn close_group(&mut self, tail: &veristream_crypto::Digest) -> Result<()> {
        let Some(keypair) = &self.keypair else {
            return Err(SessionError::NotSupported);
        };
        self.tracker.absorb(tail, self.level == AuthenticityLevel::Frame);

        let recurrent =
            self.tracker.counter % self.recurrence_interval
                == self.recurrence_offset % self.recurrence_interval;
        let body = ManifestBody {
            version: TLV_VERSION,
            gop_counter: self.tracker.counter,
            hashable_count: self.tracker.count,
            gop_hash: self.tracker.gop_hash().to_bytes(),
            hash_list: self
                .tracker
                .hash_list()
                .filter(|_| self.level == AuthenticityLevel::Frame)
                .map(|digests| digests.iter().map(|d| d.to_bytes()).collect()),
            product_info: recurrent.then(|| self.product_info.clone()),
            public_key: recurrent.then(|| keypair.verifying_key_bytes()),
            arbitrary_data: self.arbitrary_data.clone(),
            vendor_attestation: recurrent.then(|| self.vendor_attestation.clone()).flatten(),
        };

        let mut tlv = body.encode();
        let signature = keypair.sign(&document_hash(&tlv));
        append_signature(&mut tlv, &signature);
        self.queue.push(build_sei_unit(self.codec, &tlv));
        debug!(
            counter = self.tracker.counter,
            units = self.tracker.count,
            recurrent,
            "group closed and signed"
        );

        self.tracker.reopen();
        Ok(())
    }
}
