//! Fuzz target for the manifest TLV decoder.
//!
//! Arbitrary bytes must decode to an error or a manifest, never panic. When
//! they do decode, re-encoding the body and signature must decode again to
//! the same manifest (the round-trip invariant holds even for inputs we did
//! not produce ourselves, modulo unknown tags which are dropped).

#![no_main]

use libfuzzer_sys::fuzz_target;
use veristream_proto::{DecodedManifest, append_signature};

fuzz_target!(|data: &[u8]| {
    let Ok(decoded) = DecodedManifest::decode(data) else {
        return;
    };
    let mut reencoded = decoded.body.encode();
    append_signature(&mut reencoded, &decoded.signature);
    let again = DecodedManifest::decode(&reencoded).expect("re-encoded manifest must decode");
    assert_eq!(again.body, decoded.body);
    assert_eq!(again.signature, decoded.signature);
});
