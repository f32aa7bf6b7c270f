//! Property-based end-to-end checks over randomly shaped streams.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use veristream_harness::{SignSettings, modify_unit, signed_stream, validate_fresh};
use veristream_proto::Codec;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// An intact signed stream, replayed verbatim, validates every group.
    #[test]
    fn intact_streams_always_validate(spec in "(I[PpiVSX]{0,6}){2,6}") {
        for codec in [Codec::H264, Codec::H265] {
            let units = signed_stream(&spec, &SignSettings::for_codec(codec));
            let totals = validate_fresh(&units, codec).unwrap();
            prop_assert_eq!(totals.invalid, 0);
            prop_assert_eq!(totals.unsigned, 0);
            prop_assert_eq!(totals.missed, 0);
            prop_assert_eq!(totals.valid as usize, spec.matches('I').count());
        }
    }

    /// Same at GOP level: the chained hash alone carries the group.
    #[test]
    fn intact_streams_validate_at_gop_level(spec in "(I[Pp]{0,6}){2,6}") {
        let units = signed_stream(&spec, &SignSettings::gop_level(Codec::H264));
        let totals = validate_fresh(&units, Codec::H264).unwrap();
        prop_assert_eq!(totals.invalid, 0);
        prop_assert_eq!(totals.valid as usize, spec.matches('I').count());
    }

    /// Tampering with any primary slice of a closed group is detected.
    #[test]
    fn tampered_primary_slice_is_detected(extra in 0usize..3, which in any::<prop::sample::Index>()) {
        let spec = match extra {
            0 => "IPPIPPI",
            1 => "IPIPPPI",
            _ => "IPPPIPI",
        };
        let mut units = signed_stream(spec, &SignSettings::default());
        // Only primary slices inside a concluded group are covered.
        let candidates: Vec<usize> = units
            .iter()
            .enumerate()
            .filter(|(i, u)| matches!(u.label, 'I' | 'P') && *i + 2 < units.len())
            .map(|(i, _)| i)
            .collect();
        let index = *which.get(&candidates);
        modify_unit(&mut units, index);
        let totals = validate_fresh(&units, Codec::H264).unwrap();
        prop_assert!(totals.invalid > 0, "tamper at {} escaped", index);
    }
}
