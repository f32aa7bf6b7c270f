//! Fuzz target for the coded-unit parser.
//!
//! The parser must never panic: malformed framing, truncated headers, bogus
//! SEI payload sizes and random emulation-prevention patterns all have to
//! come back as a record with a downgraded validity.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veristream_proto::{Codec, parse_unit};

fuzz_target!(|data: &[u8]| {
    for codec in [Codec::H264, Codec::H265] {
        for check_trailing in [false, true] {
            let unit = parse_unit(data, codec, check_trailing);
            // The hashable span, when present, must be a non-empty slice of
            // the unit.
            if let Some(span) = unit.hashable_bytes() {
                assert!(!span.is_empty());
                assert!(span.len() <= data.len());
            }
        }
    }
});
