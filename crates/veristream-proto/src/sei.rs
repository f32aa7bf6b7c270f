//! Assembly of a complete signed SEI unit.
//!
//! Layout of an emitted unit:
//!
//! ```text
//! start code | NAL header | payload type (5) | payload size | UUID (16)
//!            | reserved byte | TLV body (EPB-escaped) | stop bit (0x80)
//! ```
//!
//! The payload size is `0xFF`-continued the same way the parser reads it.
//! Emulation-prevention bytes are inserted into the TLV region only; the
//! UUID and the size fields are chosen so they can never form a start code.

use crate::emulation::EmulationWriter;
use crate::nalu::Codec;

/// The 16-byte UUID opening every Veristream SEI payload.
pub const SEI_UUID: [u8; 16] = [
    0x76, 0x65, 0x72, 0x69, 0x73, 0x74, 0x72, 0x65, 0x61, 0x6D, 0x01, 0x9A, 0x5E, 0x11, 0xCD,
    0x42,
];

/// Value of the reserved byte following the UUID. The high bit is a format
/// marker; the remaining bits are flag space for future minor versions.
pub const RESERVED_BYTE: u8 = 0x80;

/// SEI payload type for `user_data_unregistered`.
const PAYLOAD_TYPE_USER_DATA: u8 = 5;

/// H.265 prefix-SEI NAL header (`nal_unit_type` 39, layer 0, tid 1).
const H265_SEI_HEADER: [u8; 2] = [0x4E, 0x01];

fn push_ff_continued(out: &mut Vec<u8>, mut value: usize) {
    while value >= 255 {
        out.push(0xFF);
        value -= 255;
    }
    out.push(value as u8);
}

/// Build one signed SEI unit around a complete TLV body.
///
/// The body must already carry its signature tag; this function only frames
/// it (escaping included) into a unit ready for stream insertion.
#[must_use]
pub fn build_sei_unit(codec: Codec, tlv: &[u8]) -> Vec<u8> {
    let mut escaped = EmulationWriter::new();
    escaped.extend(tlv);
    let escaped = escaped.into_inner();

    let payload_size = SEI_UUID.len() + 1 + escaped.len();

    let mut unit = Vec::with_capacity(payload_size + 16);
    unit.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
    match codec {
        Codec::H264 => unit.push(0x06),
        Codec::H265 => unit.extend_from_slice(&H265_SEI_HEADER),
    }
    unit.push(PAYLOAD_TYPE_USER_DATA);
    push_ff_continued(&mut unit, payload_size);
    unit.extend_from_slice(&SEI_UUID);
    unit.push(RESERVED_BYTE);
    unit.extend_from_slice(&escaped);
    unit.push(0x80); // rbsp stop bit

    unit
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::nalu::{UnitKind, UuidKind, parse_unit};

    #[test]
    fn built_unit_parses_back() {
        let tlv = vec![0x01, 0x00, 0x02, 0xAA, 0xBB];
        let unit = build_sei_unit(Codec::H264, &tlv);
        let parsed = parse_unit(&unit, Codec::H264, true);
        assert_eq!(parsed.kind, UnitKind::Sei);
        let sei = parsed.sei.as_ref().unwrap();
        assert_eq!(sei.uuid, UuidKind::Veristream);
        assert_eq!(sei.reserved_byte, RESERVED_BYTE);
        assert_eq!(sei.tlv.as_ref(), tlv.as_slice());
    }

    #[test]
    fn escaping_survives_round_trip() {
        // A body full of zero runs forces emulation-prevention insertion.
        let tlv = vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x03];
        let unit = build_sei_unit(Codec::H265, &tlv);
        let parsed = parse_unit(&unit, Codec::H265, true);
        let sei = parsed.sei.as_ref().unwrap();
        assert!(sei.emulation_prevention_bytes > 0);
        assert_eq!(sei.tlv.as_ref(), tlv.as_slice());
    }

    #[test]
    fn large_payload_size_encoding() {
        let tlv = vec![0x55; 400];
        let unit = build_sei_unit(Codec::H264, &tlv);
        let parsed = parse_unit(&unit, Codec::H264, true);
        let sei = parsed.sei.as_ref().unwrap();
        assert_eq!(sei.payload.len(), 417);
        assert_eq!(sei.tlv.as_ref(), tlv.as_slice());
    }
}
