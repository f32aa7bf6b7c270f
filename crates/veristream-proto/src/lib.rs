//! Wire formats for the Veristream protocol.
//!
//! This crate owns everything that touches raw bytes of an H.264/H.265
//! stream:
//!
//! - [`nalu`] parses one coded unit (start-code or length-prefixed),
//!   classifies it and locates the hashable span,
//! - [`emulation`] strips and inserts emulation-prevention bytes,
//! - [`tlv`] encodes and decodes the signed SEI manifest
//!   (tag / length / value body),
//! - [`sei`] assembles a complete signed SEI unit for emission.
//!
//! No cryptography happens here; digests and signatures are opaque byte
//! arrays. The session logic lives in `veristream-core`.

pub mod emulation;
pub mod errors;
pub mod nalu;
pub mod sei;
pub mod tlv;

pub use emulation::{EmulationWriter, strip_emulation_prevention};
pub use errors::{ProtocolError, Result};
pub use nalu::{Codec, CodedUnit, SeiInfo, StartCode, UnitKind, UuidKind, Validity, parse_unit};
pub use sei::{SEI_UUID, build_sei_unit};
pub use tlv::{
    DecodedManifest, HASH_LEN, ManifestBody, ProductInfo, SIGNATURE_LEN, TLV_VERSION,
    VendorAttestation, append_signature,
};
