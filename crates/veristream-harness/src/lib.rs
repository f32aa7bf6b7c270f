//! Deterministic stream synthesis for Veristream scenario tests.
//!
//! Streams are described by character specs over the scenario alphabet:
//!
//! | char | unit |
//! |------|------|
//! | `I`  | primary slice of an I frame (opens a group) |
//! | `i`  | secondary I slice |
//! | `P`  | primary P slice |
//! | `p`  | secondary P slice |
//! | `V`  | parameter set |
//! | `S`  | SEI that is not ours |
//! | `X`  | unit of unspecified type |
//! | `G`  | signed SEI inserted by the signer (output only) |
//!
//! [`signed_stream`] runs the spec through a real [`Signer`] and interleaves
//! the emitted SEIs the way a camera would; the manipulation helpers then
//! damage the stream (remove, modify, move) the way the original end-to-end
//! suite does. [`validate_units`] drives a [`Validator`] over a stream and
//! folds the reports into aggregate totals for assertions.

use rand::{RngCore as _, SeedableRng as _};
use rand_chacha::ChaCha20Rng;
use veristream_core::{Authenticity, AuthenticityLevel, SessionError, Signer, Validator};
use veristream_crypto::SigningKeyPair;
use veristream_proto::Codec;
use veristream_proto::tlv::{ProductInfo, VendorAttestation};

/// One unit of a synthetic stream, tagged with its spec character.
#[derive(Debug, Clone)]
pub struct TestUnit {
    /// Spec character this unit was generated from (`G` for signer SEIs).
    pub label: char,
    /// Framed unit bytes.
    pub data: Vec<u8>,
}

/// Signing-side configuration for stream synthesis.
#[derive(Debug, Clone)]
pub struct SignSettings {
    /// Stream codec.
    pub codec: Codec,
    /// Authenticity level the signer emits at.
    pub level: AuthenticityLevel,
    /// Recurrence interval for the heavy tags.
    pub recurrence_interval: u32,
    /// Recurrence offset (test surface).
    pub recurrence_offset: u32,
    /// Override of the signer's hash-list capacity, to force GOP fallback.
    pub hash_list_capacity: Option<usize>,
}

impl Default for SignSettings {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            level: AuthenticityLevel::Frame,
            recurrence_interval: 1,
            recurrence_offset: 0,
            hash_list_capacity: None,
        }
    }
}

impl SignSettings {
    /// Default settings for a codec.
    #[must_use]
    pub fn for_codec(codec: Codec) -> Self {
        Self { codec, ..Self::default() }
    }

    /// Default settings at GOP level.
    #[must_use]
    pub fn gop_level(codec: Codec) -> Self {
        Self { codec, level: AuthenticityLevel::Gop, ..Self::default() }
    }
}

/// Product information used by every synthesized signer.
#[must_use]
pub fn test_product_info() -> ProductInfo {
    ProductInfo {
        hardware_id: "vs-hw-0042".into(),
        firmware_version: "11.2.38".into(),
        serial_number: "VS123456789".into(),
        manufacturer: "Veristream AB".into(),
        address: "Testgatan 1, Lund".into(),
    }
}

/// Deterministic key pair derived from a test seed.
#[must_use]
pub fn deterministic_keypair(seed: u64) -> SigningKeyPair {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    match SigningKeyPair::from_seed_bytes(&mut bytes) {
        Ok(pair) => pair,
        Err(_) => unreachable!("seed length is fixed at 32"),
    }
}

/// Synthesize one raw (unsigned) unit for a spec character.
///
/// `id` makes payloads distinct so every unit hashes differently.
fn raw_unit(codec: Codec, label: char, id: u8) -> TestUnit {
    let mut data = vec![0x00, 0x00, 0x00, 0x01];
    match codec {
        Codec::H264 => match label {
            'I' => {
                data.push(0x65);
                data.extend_from_slice(&[0x88, id, 0x55]);
            }
            'i' => {
                data.push(0x65);
                data.extend_from_slice(&[0x28, id, 0x55]);
            }
            'P' => {
                data.push(0x41);
                data.extend_from_slice(&[0xA0, id, 0x66]);
            }
            'p' => {
                data.push(0x41);
                data.extend_from_slice(&[0x20, id, 0x66]);
            }
            'V' => {
                data.push(0x67);
                data.extend_from_slice(&[0x42, id]);
            }
            'S' => {
                data.push(0x06);
                data.extend_from_slice(&[0x04, 0x03, 0xAA, id, 0xBB, 0x80]);
            }
            _ => {
                data.push(0x00);
                data.extend_from_slice(&[0x12, id]);
            }
        },
        Codec::H265 => match label {
            'I' => {
                data.extend_from_slice(&[0x26, 0x01]);
                data.extend_from_slice(&[0x90, id, 0x55]);
            }
            'i' => {
                data.extend_from_slice(&[0x26, 0x01]);
                data.extend_from_slice(&[0x10, id, 0x55]);
            }
            'P' => {
                data.extend_from_slice(&[0x02, 0x01]);
                data.extend_from_slice(&[0xA0, id, 0x66]);
            }
            'p' => {
                data.extend_from_slice(&[0x02, 0x01]);
                data.extend_from_slice(&[0x20, id, 0x66]);
            }
            'V' => {
                data.extend_from_slice(&[0x40, 0x01]);
                data.extend_from_slice(&[0x0C, id]);
            }
            'S' => {
                data.extend_from_slice(&[0x4E, 0x01]);
                data.extend_from_slice(&[0x04, 0x03, 0xAA, id, 0xBB, 0x80]);
            }
            _ => {
                data.extend_from_slice(&[0x7C, 0x01]);
                data.extend_from_slice(&[0x12, id]);
            }
        },
    }
    TestUnit { label, data }
}

/// Build a stream without any signing.
#[must_use]
pub fn unsigned_stream(spec: &str, codec: Codec) -> Vec<TestUnit> {
    spec.chars()
        .enumerate()
        .map(|(i, label)| raw_unit(codec, label, i as u8))
        .collect()
}

/// Build a signed stream with a fresh deterministic key.
#[must_use]
pub fn signed_stream(spec: &str, settings: &SignSettings) -> Vec<TestUnit> {
    signed_stream_with_key(spec, settings, deterministic_keypair(1))
}

/// Build a signed stream with the given key pair.
///
/// The signer's SEIs are inserted before the I slice that triggered them,
/// labelled `G`, exactly where a camera would prepend them.
#[must_use]
pub fn signed_stream_with_key(
    spec: &str,
    settings: &SignSettings,
    key: SigningKeyPair,
) -> Vec<TestUnit> {
    let mut signer = configure_signer(settings, key);
    let mut out = Vec::with_capacity(spec.len() * 2);
    for (i, label) in spec.chars().enumerate() {
        let unit = raw_unit(settings.codec, label, i as u8);
        let added = signer.add_unit(&unit.data).is_ok();
        assert!(added, "signer rejected a synthesized unit");
        for sei in signer.take_seis_to_prepend() {
            out.push(TestUnit { label: 'G', data: sei });
        }
        out.push(unit);
    }
    out
}

fn configure_signer(settings: &SignSettings, key: SigningKeyPair) -> Signer {
    let mut signer = Signer::new(settings.codec);
    signer.set_signing_key(key);
    signer.set_authenticity_level(settings.level);
    signer.set_product_info(test_product_info());
    let interval_ok = signer.set_recurrence_interval(settings.recurrence_interval).is_ok();
    assert!(interval_ok, "invalid recurrence interval in settings");
    if settings.recurrence_offset > 0 {
        let offset_ok = signer.set_recurrence_offset(settings.recurrence_offset).is_ok();
        assert!(offset_ok, "invalid recurrence offset in settings");
    }
    if let Some(capacity) = settings.hash_list_capacity {
        signer.set_hash_list_capacity(capacity);
    }
    signer
}

/// Spec-character view of a stream (`"GIPPGI"` style).
#[must_use]
pub fn labels(units: &[TestUnit]) -> String {
    units.iter().map(|u| u.label).collect()
}

/// Remove and return the unit at `index`.
pub fn remove_unit(units: &mut Vec<TestUnit>, index: usize) -> TestUnit {
    units.remove(index)
}

/// Flip one payload bit of the unit at `index` (single-bit tampering).
pub fn modify_unit(units: &mut [TestUnit], index: usize) {
    let data = &mut units[index].data;
    let last = data.len() - 1;
    data[last] ^= 0x01;
}

/// Move the unit at `from` so that it ends up at index `to`.
pub fn move_unit(units: &mut Vec<TestUnit>, from: usize, to: usize) {
    let unit = units.remove(from);
    units.insert(to, unit);
}

/// Delay every signed SEI by two slots, producing the "all SEIs arrive
/// late" shape (`GIPPP…` becomes `IPGPP…`).
pub fn delay_all_seis(units: &mut Vec<TestUnit>) {
    let mut cursor = 0;
    while let Some(pos) =
        units.iter().skip(cursor).position(|u| u.label == 'G').map(|p| p + cursor)
    {
        let target = usize::min(pos + 2, units.len() - 1);
        move_unit(units, pos, target);
        cursor = target + 1;
    }
}

/// Aggregate totals over every report a validation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationTotals {
    /// Reports with outcome `Ok`.
    pub valid: u32,
    /// Reports with outcome `OkWithMissingInfo`.
    pub valid_with_missing: u32,
    /// Reports with outcome `NotOk`.
    pub invalid: u32,
    /// Reports with outcome `NotSigned`.
    pub unsigned: u32,
    /// Reports with outcome `SignaturePresent`.
    pub signature_present: u32,
    /// Sum of pending units over all reports.
    pub pending: u64,
    /// Sum of `expected − received` over reports that carried an expected
    /// count; negative when more units arrived than were declared.
    pub missed: i64,
    /// Whether any report flagged a public-key change.
    pub key_changed: bool,
    /// Number of reports seen.
    pub reports: u32,
}

/// Drive a validator over a stream and fold all reports into totals.
pub fn validate_units(
    validator: &mut Validator,
    units: &[TestUnit],
) -> Result<ValidationTotals, SessionError> {
    let mut totals = ValidationTotals::default();
    for unit in units {
        let Some(report) = validator.add_unit(&unit.data)? else { continue };
        totals.reports += 1;
        match report.latest.authenticity {
            Authenticity::Ok => totals.valid += 1,
            Authenticity::OkWithMissingInfo => totals.valid_with_missing += 1,
            Authenticity::NotOk => totals.invalid += 1,
            Authenticity::NotSigned => totals.unsigned += 1,
            Authenticity::SignaturePresent => totals.signature_present += 1,
        }
        totals.pending += u64::from(report.latest.pending_picture_units);
        if let Some(expected) = report.latest.expected_picture_units {
            totals.missed +=
                i64::from(expected) - i64::from(report.latest.received_picture_units);
        }
        totals.key_changed |= report.latest.public_key_has_changed;
    }
    Ok(totals)
}

/// Validate a stream on a fresh session.
pub fn validate_fresh(
    units: &[TestUnit],
    codec: Codec,
) -> Result<ValidationTotals, SessionError> {
    let mut validator = Validator::new(codec);
    validate_units(&mut validator, units)
}

/// A small vendor attestation for tests.
#[must_use]
pub fn test_attestation() -> VendorAttestation {
    VendorAttestation {
        attestation: vec![0x02, 0x00, 0xC4, 0xFE],
        certificate_chain: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n"
            .into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn signing_prepends_one_sei_per_group() {
        let units = signed_stream("IPPIPPIPPIPPI", &SignSettings::default());
        assert_eq!(labels(&units), "GIPPGIPPGIPPGIPPGI");
    }

    #[test]
    fn multislice_groups_close_on_primary_slices_only() {
        let units = signed_stream("IiPpPpIiPpPpIi", &SignSettings::default());
        assert_eq!(labels(&units), "GIiPpPpGIiPpPpGIi");
    }

    #[test]
    fn parameter_sets_do_not_trigger_seis() {
        let units = signed_stream("VIPPIPPI", &SignSettings::default());
        assert_eq!(labels(&units), "VGIPPGIPPGI");
    }

    #[test]
    fn delay_shifts_every_sei_two_slots() {
        let mut units = signed_stream("IPPPIPPPIPPPIPPPIP", &SignSettings::default());
        assert_eq!(labels(&units), "GIPPPGIPPPGIPPPGIPPPGIP");
        delay_all_seis(&mut units);
        assert_eq!(labels(&units), "IPGPPIPGPPIPGPPIPGPPIPG");
    }

    #[test]
    fn units_are_distinct() {
        let units = unsigned_stream("PPPP", Codec::H264);
        for pair in units.windows(2) {
            assert_ne!(pair[0].data, pair[1].data);
        }
    }

    #[test]
    fn deterministic_keys_are_stable() {
        assert_eq!(
            deterministic_keypair(7).verifying_key_bytes(),
            deterministic_keypair(7).verifying_key_bytes()
        );
        assert_ne!(
            deterministic_keypair(7).verifying_key_bytes(),
            deterministic_keypair(8).verifying_key_bytes()
        );
    }
}
