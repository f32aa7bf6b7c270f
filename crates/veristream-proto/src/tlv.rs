//! The signed SEI manifest: a tag / length / value body.
//!
//! Every field is `tag (1 byte) | length (2 bytes, big endian) | value`.
//! Tags are written in table order, the signature tag is always last, and
//! the signature covers every byte before its own tag header (the "signed
//! prefix"). Decoding walks tags until the body is exhausted; unknown tags
//! are skipped by length so newer emitters stay readable; a length that
//! would overrun the body is a fatal decode error.
//!
//! # Invariants
//!
//! - Re-encoding a decoded body is byte-identical (round-trip property
//!   tested in `tests/tlv_properties.rs`).
//! - `GopInfo` and `Signature` are mandatory; everything else is optional.
//!   The recurrent tags (product info, public key, vendor attestation) are
//!   populated by the signer only on recurrence boundaries.

use crate::errors::{ProtocolError, Result};

/// Width of every digest carried in a manifest.
pub const HASH_LEN: usize = 32;

/// Width of the Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Manifest wire version (major, minor). Decoders reject a different major.
pub const TLV_VERSION: (u8, u8) = (1, 0);

/// Tag values of the manifest body.
pub mod tag {
    /// Group counter, hashable-unit count, group hash. Mandatory.
    pub const GOP_INFO: u8 = 0x01;
    /// Product information strings. Recurrent.
    pub const PRODUCT_INFO: u8 = 0x02;
    /// Per-unit digest list (frame-level authenticity).
    pub const HASH_LIST: u8 = 0x03;
    /// Ed25519 verifying key. Recurrent.
    pub const PUBLIC_KEY: u8 = 0x04;
    /// Opaque application data.
    pub const ARBITRARY_DATA: u8 = 0x05;
    /// Signature over the signed prefix. Mandatory, always last.
    pub const SIGNATURE: u8 = 0x7F;
    /// Vendor attestation report. Recurrent. First tag of the
    /// vendor-reserved range `0x80..=0xFF`.
    pub const VENDOR_ATTESTATION: u8 = 0x80;
}

/// Product information carried in the recurrent `ProductInfo` tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductInfo {
    /// Hardware identifier.
    pub hardware_id: String,
    /// Firmware version string.
    pub firmware_version: String,
    /// Device serial number.
    pub serial_number: String,
    /// Manufacturer name.
    pub manufacturer: String,
    /// Manufacturer contact address.
    pub address: String,
}

/// Vendor attestation report: an opaque blob plus its certificate chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorAttestation {
    /// Opaque attestation bytes, verified by vendor tooling.
    pub attestation: Vec<u8>,
    /// PEM certificate chain accompanying the attestation.
    pub certificate_chain: String,
}

/// The manifest body — everything the signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestBody {
    /// Wire version of the emitter.
    pub version: (u8, u8),
    /// Counter of the group this manifest closes.
    pub gop_counter: u32,
    /// Number of hashable units the group hash absorbed (linking unit
    /// included).
    pub hashable_count: u16,
    /// Finalized chained group hash.
    pub gop_hash: [u8; HASH_LEN],
    /// Per-unit digests, present at frame-level authenticity unless the
    /// group fell back to GOP semantics.
    pub hash_list: Option<Vec<[u8; HASH_LEN]>>,
    /// Recurrent product information.
    pub product_info: Option<ProductInfo>,
    /// Recurrent verifying key.
    pub public_key: Option<[u8; HASH_LEN]>,
    /// Opaque application data.
    pub arbitrary_data: Option<Vec<u8>>,
    /// Recurrent vendor attestation.
    pub vendor_attestation: Option<VendorAttestation>,
}

/// A decoded manifest: body, signature, and the signed prefix length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedManifest {
    /// Decoded body fields.
    pub body: ManifestBody,
    /// Signature over the first `signed_len` bytes of the TLV body.
    pub signature: [u8; SIGNATURE_LEN],
    /// Length of the signed prefix (everything before the signature tag).
    pub signed_len: usize,
}

/// One entry of the data-driven encoder table.
///
/// `write` appends the tag's value bytes and reports whether the field was
/// present; absent optional fields emit nothing. `recurrent` records which
/// tags the signer gates on the recurrence interval.
struct TagSpec {
    tag: u8,
    #[allow(dead_code, reason = "documents the recurrence contract per tag")]
    recurrent: bool,
    write: fn(&ManifestBody, &mut Vec<u8>) -> bool,
}

const TAG_TABLE: &[TagSpec] = &[
    TagSpec { tag: tag::GOP_INFO, recurrent: false, write: write_gop_info },
    TagSpec { tag: tag::PRODUCT_INFO, recurrent: true, write: write_product_info },
    TagSpec { tag: tag::HASH_LIST, recurrent: false, write: write_hash_list },
    TagSpec { tag: tag::PUBLIC_KEY, recurrent: true, write: write_public_key },
    TagSpec { tag: tag::ARBITRARY_DATA, recurrent: false, write: write_arbitrary_data },
    TagSpec { tag: tag::VENDOR_ATTESTATION, recurrent: true, write: write_vendor_attestation },
];

fn write_gop_info(body: &ManifestBody, out: &mut Vec<u8>) -> bool {
    out.push(body.version.0);
    out.push(body.version.1);
    out.extend_from_slice(&body.gop_counter.to_be_bytes());
    out.extend_from_slice(&body.hashable_count.to_be_bytes());
    out.extend_from_slice(&body.gop_hash);
    true
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn write_product_info(body: &ManifestBody, out: &mut Vec<u8>) -> bool {
    let Some(info) = &body.product_info else { return false };
    write_string(&info.hardware_id, out);
    write_string(&info.firmware_version, out);
    write_string(&info.serial_number, out);
    write_string(&info.manufacturer, out);
    write_string(&info.address, out);
    true
}

fn write_hash_list(body: &ManifestBody, out: &mut Vec<u8>) -> bool {
    let Some(list) = &body.hash_list else { return false };
    for digest in list {
        out.extend_from_slice(digest);
    }
    true
}

fn write_public_key(body: &ManifestBody, out: &mut Vec<u8>) -> bool {
    let Some(key) = &body.public_key else { return false };
    out.extend_from_slice(key);
    true
}

fn write_arbitrary_data(body: &ManifestBody, out: &mut Vec<u8>) -> bool {
    let Some(data) = &body.arbitrary_data else { return false };
    out.extend_from_slice(data);
    true
}

fn write_vendor_attestation(body: &ManifestBody, out: &mut Vec<u8>) -> bool {
    let Some(vendor) = &body.vendor_attestation else { return false };
    out.extend_from_slice(&(vendor.attestation.len() as u16).to_be_bytes());
    out.extend_from_slice(&vendor.attestation);
    out.extend_from_slice(vendor.certificate_chain.as_bytes());
    true
}

impl ManifestBody {
    /// Encode the body without its signature tag.
    ///
    /// The returned bytes are the signed prefix: hash them, sign the digest,
    /// then call [`append_signature`].
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        let mut value = Vec::with_capacity(64);
        for spec in TAG_TABLE {
            value.clear();
            if (spec.write)(self, &mut value) {
                out.push(spec.tag);
                out.extend_from_slice(&(value.len() as u16).to_be_bytes());
                out.extend_from_slice(&value);
            }
        }
        out
    }
}

/// Append the signature tag to an encoded body, completing the TLV.
pub fn append_signature(body: &mut Vec<u8>, signature: &[u8; SIGNATURE_LEN]) {
    body.push(tag::SIGNATURE);
    body.extend_from_slice(&(SIGNATURE_LEN as u16).to_be_bytes());
    body.extend_from_slice(signature);
}

fn read_string(tag: u8, value: &[u8], pos: &mut usize) -> Result<String> {
    if *pos + 2 > value.len() {
        return Err(ProtocolError::Truncated { needed: 2, offset: *pos });
    }
    let len = u16::from_be_bytes([value[*pos], value[*pos + 1]]) as usize;
    *pos += 2;
    if *pos + len > value.len() {
        return Err(ProtocolError::Overrun { tag, length: len, remaining: value.len() - *pos });
    }
    let s = std::str::from_utf8(&value[*pos..*pos + len])
        .map_err(|_| ProtocolError::InvalidUtf8 { tag })?;
    *pos += len;
    Ok(s.to_owned())
}

fn decode_gop_info(value: &[u8]) -> Result<(u8, u8, u32, u16, [u8; HASH_LEN])> {
    if value.len() != 2 + 4 + 2 + HASH_LEN {
        return Err(ProtocolError::InvalidFieldLength {
            tag: tag::GOP_INFO,
            expected: 2 + 4 + 2 + HASH_LEN,
            actual: value.len(),
        });
    }
    let major = value[0];
    let minor = value[1];
    if major != TLV_VERSION.0 {
        return Err(ProtocolError::UnsupportedVersion { major, minor, supported: TLV_VERSION.0 });
    }
    let counter = u32::from_be_bytes([value[2], value[3], value[4], value[5]]);
    let count = u16::from_be_bytes([value[6], value[7]]);
    let mut gop_hash = [0u8; HASH_LEN];
    gop_hash.copy_from_slice(&value[8..8 + HASH_LEN]);
    Ok((major, minor, counter, count, gop_hash))
}

fn decode_product_info(value: &[u8]) -> Result<ProductInfo> {
    let mut pos = 0usize;
    let info = ProductInfo {
        hardware_id: read_string(tag::PRODUCT_INFO, value, &mut pos)?,
        firmware_version: read_string(tag::PRODUCT_INFO, value, &mut pos)?,
        serial_number: read_string(tag::PRODUCT_INFO, value, &mut pos)?,
        manufacturer: read_string(tag::PRODUCT_INFO, value, &mut pos)?,
        address: read_string(tag::PRODUCT_INFO, value, &mut pos)?,
    };
    if pos != value.len() {
        return Err(ProtocolError::TrailingBytes { count: value.len() - pos });
    }
    Ok(info)
}

fn decode_hash_list(value: &[u8]) -> Result<Vec<[u8; HASH_LEN]>> {
    if value.len() % HASH_LEN != 0 {
        return Err(ProtocolError::InvalidFieldLength {
            tag: tag::HASH_LIST,
            expected: HASH_LEN * (value.len() / HASH_LEN + 1),
            actual: value.len(),
        });
    }
    Ok(value
        .chunks_exact(HASH_LEN)
        .map(|chunk| {
            let mut digest = [0u8; HASH_LEN];
            digest.copy_from_slice(chunk);
            digest
        })
        .collect())
}

fn decode_vendor_attestation(value: &[u8]) -> Result<VendorAttestation> {
    if value.len() < 2 {
        return Err(ProtocolError::Truncated { needed: 2 - value.len(), offset: 0 });
    }
    let att_len = u16::from_be_bytes([value[0], value[1]]) as usize;
    if 2 + att_len > value.len() {
        return Err(ProtocolError::Overrun {
            tag: tag::VENDOR_ATTESTATION,
            length: att_len,
            remaining: value.len() - 2,
        });
    }
    let chain = std::str::from_utf8(&value[2 + att_len..])
        .map_err(|_| ProtocolError::InvalidUtf8 { tag: tag::VENDOR_ATTESTATION })?;
    Ok(VendorAttestation {
        attestation: value[2..2 + att_len].to_vec(),
        certificate_chain: chain.to_owned(),
    })
}

impl DecodedManifest {
    /// Decode a TLV body (emulation-prevention bytes already stripped).
    pub fn decode(tlv: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let mut gop_info = None;
        let mut hash_list = None;
        let mut product_info = None;
        let mut public_key = None;
        let mut arbitrary_data = None;
        let mut vendor_attestation = None;
        let mut signature: Option<([u8; SIGNATURE_LEN], usize)> = None;

        while pos < tlv.len() {
            if signature.is_some() {
                return Err(ProtocolError::TrailingBytes { count: tlv.len() - pos });
            }
            if pos + 3 > tlv.len() {
                return Err(ProtocolError::Truncated { needed: pos + 3 - tlv.len(), offset: pos });
            }
            let t = tlv[pos];
            let len = u16::from_be_bytes([tlv[pos + 1], tlv[pos + 2]]) as usize;
            let value_start = pos + 3;
            if value_start + len > tlv.len() {
                return Err(ProtocolError::Overrun {
                    tag: t,
                    length: len,
                    remaining: tlv.len() - value_start,
                });
            }
            let value = &tlv[value_start..value_start + len];

            match t {
                tag::GOP_INFO => gop_info = Some(decode_gop_info(value)?),
                tag::PRODUCT_INFO => product_info = Some(decode_product_info(value)?),
                tag::HASH_LIST => hash_list = Some(decode_hash_list(value)?),
                tag::PUBLIC_KEY => {
                    if value.len() != HASH_LEN {
                        return Err(ProtocolError::InvalidFieldLength {
                            tag: t,
                            expected: HASH_LEN,
                            actual: value.len(),
                        });
                    }
                    let mut key = [0u8; HASH_LEN];
                    key.copy_from_slice(value);
                    public_key = Some(key);
                }
                tag::ARBITRARY_DATA => arbitrary_data = Some(value.to_vec()),
                tag::VENDOR_ATTESTATION => {
                    vendor_attestation = Some(decode_vendor_attestation(value)?);
                }
                tag::SIGNATURE => {
                    if value.len() != SIGNATURE_LEN {
                        return Err(ProtocolError::InvalidFieldLength {
                            tag: t,
                            expected: SIGNATURE_LEN,
                            actual: value.len(),
                        });
                    }
                    let mut sig = [0u8; SIGNATURE_LEN];
                    sig.copy_from_slice(value);
                    signature = Some((sig, pos));
                }
                // Unknown tags (including the rest of the vendor range) are
                // skipped by length.
                _ => {}
            }
            pos = value_start + len;
        }

        let Some((major, minor, gop_counter, hashable_count, gop_hash)) = gop_info else {
            return Err(ProtocolError::MissingTag { tag: tag::GOP_INFO });
        };
        let Some((signature, signed_len)) = signature else {
            return Err(ProtocolError::MissingTag { tag: tag::SIGNATURE });
        };

        Ok(Self {
            body: ManifestBody {
                version: (major, minor),
                gop_counter,
                hashable_count,
                gop_hash,
                hash_list,
                product_info,
                public_key,
                arbitrary_data,
                vendor_attestation,
            },
            signature,
            signed_len,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_body() -> ManifestBody {
        ManifestBody {
            version: TLV_VERSION,
            gop_counter: 7,
            hashable_count: 4,
            gop_hash: [0x11; HASH_LEN],
            hash_list: Some(vec![[0x22; HASH_LEN], [0x33; HASH_LEN]]),
            product_info: Some(ProductInfo {
                hardware_id: "hw-0001".into(),
                firmware_version: "9.80.1".into(),
                serial_number: "ACCC8E012345".into(),
                manufacturer: "Veristream AB".into(),
                address: "Lund, Sweden".into(),
            }),
            public_key: Some([0x44; HASH_LEN]),
            arbitrary_data: None,
            vendor_attestation: None,
        }
    }

    fn encode_signed(body: &ManifestBody, signature: [u8; SIGNATURE_LEN]) -> Vec<u8> {
        let mut tlv = body.encode();
        append_signature(&mut tlv, &signature);
        tlv
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let body = sample_body();
        let tlv = encode_signed(&body, [0xAB; SIGNATURE_LEN]);
        let decoded = DecodedManifest::decode(&tlv).unwrap();
        assert_eq!(decoded.body, body);
        assert_eq!(decoded.signature, [0xAB; SIGNATURE_LEN]);
        assert_eq!(decoded.signed_len, body.encode().len());

        let reencoded = encode_signed(&decoded.body, decoded.signature);
        assert_eq!(reencoded, tlv);
    }

    #[test]
    fn optional_tags_are_omitted() {
        let body = ManifestBody {
            hash_list: None,
            product_info: None,
            public_key: None,
            ..sample_body()
        };
        let tlv = encode_signed(&body, [0u8; SIGNATURE_LEN]);
        let decoded = DecodedManifest::decode(&tlv).unwrap();
        assert!(decoded.body.hash_list.is_none());
        assert!(decoded.body.product_info.is_none());
        assert!(decoded.body.public_key.is_none());
    }

    #[test]
    fn unknown_tag_is_skipped() {
        let body = sample_body();
        let mut tlv = body.encode();
        // Inject an unknown tag before the signature.
        tlv.push(0x42);
        tlv.extend_from_slice(&3u16.to_be_bytes());
        tlv.extend_from_slice(&[0xDE, 0xAD, 0xBE]);
        append_signature(&mut tlv, &[0u8; SIGNATURE_LEN]);
        let decoded = DecodedManifest::decode(&tlv).unwrap();
        assert_eq!(decoded.body.gop_counter, 7);
    }

    #[test]
    fn overrun_is_fatal() {
        let body = sample_body();
        let mut tlv = encode_signed(&body, [0u8; SIGNATURE_LEN]);
        // Inflate the first tag's length beyond the body.
        tlv[1] = 0xFF;
        tlv[2] = 0xFF;
        assert!(matches!(
            DecodedManifest::decode(&tlv),
            Err(ProtocolError::Overrun { tag: tag::GOP_INFO, .. })
        ));
    }

    #[test]
    fn missing_signature_is_fatal() {
        let tlv = sample_body().encode();
        assert_eq!(
            DecodedManifest::decode(&tlv),
            Err(ProtocolError::MissingTag { tag: tag::SIGNATURE })
        );
    }

    #[test]
    fn bytes_after_signature_are_rejected() {
        let mut tlv = encode_signed(&sample_body(), [0u8; SIGNATURE_LEN]);
        tlv.push(0x00);
        tlv.extend_from_slice(&0u16.to_be_bytes());
        assert!(matches!(
            DecodedManifest::decode(&tlv),
            Err(ProtocolError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn foreign_major_version_is_rejected() {
        let mut body = sample_body();
        body.version = (TLV_VERSION.0 + 1, 0);
        let tlv = encode_signed(&body, [0u8; SIGNATURE_LEN]);
        assert!(matches!(
            DecodedManifest::decode(&tlv),
            Err(ProtocolError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn vendor_attestation_round_trip() {
        let body = ManifestBody {
            vendor_attestation: Some(VendorAttestation {
                attestation: vec![0x01, 0x02, 0x03],
                certificate_chain: "-----BEGIN CERTIFICATE-----".into(),
            }),
            ..sample_body()
        };
        let tlv = encode_signed(&body, [0x5A; SIGNATURE_LEN]);
        let decoded = DecodedManifest::decode(&tlv).unwrap();
        assert_eq!(decoded.body.vendor_attestation, body.vendor_attestation);
    }
}
