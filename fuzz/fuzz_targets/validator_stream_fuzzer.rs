//! Fuzz target for the validation pipeline.
//!
//! A validator fed arbitrary unit-sized chunks must never panic; fatal
//! errors are allowed and must be recoverable through reset.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veristream_core::Validator;
use veristream_proto::Codec;

fuzz_target!(|data: &[u8]| {
    let mut validator = Validator::new(Codec::H264);
    // First byte steers the chunking so the corpus explores unit boundaries.
    let Some((&step, rest)) = data.split_first() else { return };
    let step = usize::from(step % 32) + 1;
    for chunk in rest.chunks(step) {
        if validator.add_unit(chunk).is_err() {
            validator.reset();
        }
    }
});
