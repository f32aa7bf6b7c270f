//! Parsing of one H.264/H.265 coded unit.
//!
//! The parser consumes exactly one unit, prefixed either by an Annex B start
//! code (`00 00 01` / `00 00 00 01`) or by a 4-byte big-endian length, and
//! produces a fully populated [`CodedUnit`] record. Parsing never fails:
//! malformed input yields a record whose [`Validity`] is downgraded, and the
//! session layer maps that to an `unknown` verdict and keeps consuming the
//! stream.
//!
//! Validation order follows the usual cheapest-first rule: framing, then the
//! unit header, then (for SEIs only) the payload structure.

use std::borrow::Cow;
use std::ops::Range;

use crate::emulation::strip_emulation_prevention;
use crate::sei::SEI_UUID;

/// Codec the stream was encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// H.264 / AVC: 1-byte unit headers.
    H264,
    /// H.265 / HEVC: 2-byte unit headers.
    H265,
}

/// Coarse classification of a coded unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Unrecognized or reserved unit type.
    Undefined,
    /// Intra-coded slice (IDR / IRAP).
    I,
    /// Predicted slice.
    P,
    /// Parameter set (VPS/SPS/PPS).
    ParamSet,
    /// Supplemental enhancement information.
    Sei,
    /// Recognized type that carries neither picture data nor metadata we
    /// care about (access unit delimiters, filler, ...).
    Other,
}

/// Whether the SEI payload starts with the Veristream UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidKind {
    /// Not a Veristream SEI.
    None,
    /// Payload begins with [`SEI_UUID`].
    Veristream,
}

/// Structural soundness of the parsed unit.
///
/// Ordered: `Malformed < Unknown < Valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Validity {
    /// Framing or header could not be parsed.
    Malformed,
    /// Parsed, but the unit type is not recognized.
    Unknown,
    /// Recognized, structurally sound unit.
    Valid,
}

/// How the unit was framed in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCode {
    /// 3-byte start code `00 00 01`.
    Short,
    /// 4-byte start code `00 00 00 01`.
    Long,
    /// 4-byte big-endian length prefix (AVCC/HVCC style).
    LengthPrefixed(u32),
}

impl StartCode {
    /// Bytes occupied by the prefix.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Short => 3,
            Self::Long | Self::LengthPrefixed(_) => 4,
        }
    }

    /// Whether the prefix is zero-sized (never; kept for clippy symmetry).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// SEI-specific attributes of a parsed unit.
#[derive(Debug, Clone)]
pub struct SeiInfo<'a> {
    /// SEI payload type (5 = `user_data_unregistered`).
    pub payload_type: u32,
    /// Payload bytes, UUID included, emulation-prevention bytes intact.
    pub payload: &'a [u8],
    /// Whether the payload begins with the Veristream UUID.
    pub uuid: UuidKind,
    /// First payload byte after the UUID (format marker / flag bits).
    pub reserved_byte: u8,
    /// TLV body with emulation-prevention bytes stripped. Borrows the input
    /// when none were present.
    pub tlv: Cow<'a, [u8]>,
    /// Number of emulation-prevention bytes removed from the TLV span.
    pub emulation_prevention_bytes: usize,
}

/// One parsed coded unit.
#[derive(Debug, Clone)]
pub struct CodedUnit<'a> {
    /// The complete framed unit, prefix included.
    pub data: &'a [u8],
    /// Recognized framing, if any.
    pub start_code: Option<StartCode>,
    /// Unit classification.
    pub kind: UnitKind,
    /// Structural soundness.
    pub validity: Validity,
    /// For I/P slices: whether this is the primary slice of its picture.
    pub is_primary_slice: bool,
    /// SEI attributes when `kind == Sei`.
    pub sei: Option<SeiInfo<'a>>,
    hashable: Option<Range<usize>>,
}

impl CodedUnit<'_> {
    /// Whether this unit participates in the group hash.
    ///
    /// Only primary I/P slices are hashable; parameter sets, secondary
    /// slices, and foreign SEIs are ignored by the signing protocol, and a
    /// Veristream SEI is covered by its own signed document instead.
    #[must_use]
    pub fn is_hashable(&self) -> bool {
        self.hashable.is_some()
    }

    /// Whether this unit opens a new group of pictures.
    #[must_use]
    pub fn is_first_in_gop(&self) -> bool {
        self.validity == Validity::Valid && self.kind == UnitKind::I && self.is_primary_slice
    }

    /// Whether this is a structurally valid Veristream SEI.
    #[must_use]
    pub fn is_signed_sei(&self) -> bool {
        self.validity == Validity::Valid
            && matches!(&self.sei, Some(info) if info.uuid == UuidKind::Veristream)
    }

    /// The span covered by the unit digest, when the unit is hashable.
    #[must_use]
    pub fn hashable_bytes(&self) -> Option<&[u8]> {
        self.hashable.clone().map(|r| &self.data[r])
    }
}

/// Classify an H.264 unit type (`header & 0x1F`).
fn classify_h264(unit_type: u8) -> UnitKind {
    match unit_type {
        1 => UnitKind::P,
        5 => UnitKind::I,
        6 => UnitKind::Sei,
        7 | 8 => UnitKind::ParamSet,
        0 => UnitKind::Undefined,
        _ => UnitKind::Other,
    }
}

/// Classify an H.265 unit type (`(header >> 1) & 0x3F`).
fn classify_h265(unit_type: u8) -> UnitKind {
    match unit_type {
        0..=9 => UnitKind::P,
        16..=21 => UnitKind::I,
        32..=34 => UnitKind::ParamSet,
        39 | 40 => UnitKind::Sei,
        48..=63 => UnitKind::Undefined,
        _ => UnitKind::Other,
    }
}

/// Read a `0xFF`-continued value (SEI payload type / payload size).
fn read_ff_continued(data: &[u8], pos: &mut usize) -> Option<u32> {
    let mut value = 0u32;
    while *pos < data.len() && data[*pos] == 0xFF {
        value += 255;
        *pos += 1;
    }
    if *pos >= data.len() {
        return None;
    }
    value += u32::from(data[*pos]);
    *pos += 1;
    Some(value)
}

fn malformed(data: &[u8]) -> CodedUnit<'_> {
    CodedUnit {
        data,
        start_code: None,
        kind: UnitKind::Undefined,
        validity: Validity::Malformed,
        is_primary_slice: false,
        sei: None,
        hashable: None,
    }
}

/// Parse one coded unit.
///
/// `check_trailing` controls whether a final `0x80` byte is treated as the
/// RBSP stop bit and excluded from the hashable span.
#[must_use]
pub fn parse_unit<'a>(data: &'a [u8], codec: Codec, check_trailing: bool) -> CodedUnit<'a> {
    let start_code = match data {
        [0x00, 0x00, 0x00, 0x01, ..] => StartCode::Long,
        [0x00, 0x00, 0x01, ..] => StartCode::Short,
        [a, b, c, d, ..] => {
            let len = u32::from_be_bytes([*a, *b, *c, *d]);
            if len as usize == data.len() - 4 && len > 0 {
                StartCode::LengthPrefixed(len)
            } else {
                return malformed(data);
            }
        }
        _ => return malformed(data),
    };

    let header_start = start_code.len();
    let header_len = match codec {
        Codec::H264 => 1,
        Codec::H265 => 2,
    };
    if data.len() < header_start + header_len {
        return malformed(data);
    }
    let header = &data[header_start..header_start + header_len];

    // The forbidden zero bit must be clear in both codecs.
    if header[0] & 0x80 != 0 {
        return malformed(data);
    }

    let kind = match codec {
        Codec::H264 => classify_h264(header[0] & 0x1F),
        Codec::H265 => classify_h265((header[0] >> 1) & 0x3F),
    };

    let payload = &data[header_start + header_len..];
    let mut unit = CodedUnit {
        data,
        start_code: Some(start_code),
        kind,
        validity: if kind == UnitKind::Undefined { Validity::Unknown } else { Validity::Valid },
        is_primary_slice: false,
        sei: None,
        hashable: None,
    };

    match kind {
        UnitKind::I | UnitKind::P => {
            // first_mb_in_slice (H.264) / first_slice_segment_in_pic_flag
            // (H.265): a set leading bit marks the primary slice.
            unit.is_primary_slice = payload.first().is_some_and(|b| b & 0x80 != 0);
            if unit.is_primary_slice {
                let mut end = data.len();
                if check_trailing && end > header_start + header_len && data[end - 1] == 0x80 {
                    end -= 1;
                }
                unit.hashable = Some(header_start..end);
            }
        }
        UnitKind::Sei => match parse_sei_payload(payload) {
            Some(info) => unit.sei = Some(info),
            None => return malformed(data),
        },
        UnitKind::ParamSet | UnitKind::Other | UnitKind::Undefined => {}
    }

    unit
}

/// Parse the first SEI message of a SEI unit's RBSP.
fn parse_sei_payload(rbsp: &[u8]) -> Option<SeiInfo<'_>> {
    let mut pos = 0usize;
    let payload_type = read_ff_continued(rbsp, &mut pos)?;
    let payload_size = read_ff_continued(rbsp, &mut pos)? as usize;
    if pos + payload_size > rbsp.len() {
        return None;
    }
    let payload = &rbsp[pos..pos + payload_size];

    // Only user_data_unregistered payloads opening with our UUID are ours;
    // anything else passes through untouched.
    if payload_type != 5 || payload.len() < SEI_UUID.len() + 1 || payload[..16] != SEI_UUID {
        return Some(SeiInfo {
            payload_type,
            payload,
            uuid: UuidKind::None,
            reserved_byte: 0,
            tlv: Cow::Borrowed(&[]),
            emulation_prevention_bytes: 0,
        });
    }

    let (tlv, removed) = strip_emulation_prevention(&payload[17..]);
    Some(SeiInfo {
        payload_type,
        payload,
        uuid: UuidKind::Veristream,
        reserved_byte: payload[16],
        tlv,
        emulation_prevention_bytes: removed,
    })
}
