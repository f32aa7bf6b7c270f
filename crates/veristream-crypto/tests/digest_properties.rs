//! Property-based tests for digest chaining and signatures.

use proptest::prelude::*;
use veristream_crypto::{Digest, GopHash, SigningKeyPair, hash_unit, verify_digest};

proptest! {
    #[test]
    fn chain_matches_incremental(units in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 0..10)) {
        let digests: Vec<Digest> = units.iter().map(|u| hash_unit(u)).collect();

        let mut incremental = GopHash::new();
        for d in &digests {
            incremental.update(d);
        }
        prop_assert_eq!(incremental.current(), GopHash::over(digests.iter()));
    }

    #[test]
    fn any_prefix_differs_from_full_chain(units in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 2..8)) {
        let digests: Vec<Digest> = units.iter().map(|u| hash_unit(u)).collect();
        let full = GopHash::over(digests.iter());
        let prefix = GopHash::over(digests[..digests.len() - 1].iter());
        prop_assert_ne!(full, prefix);
    }

    #[test]
    fn signature_binds_digest(doc in prop::collection::vec(any::<u8>(), 1..64), flip in 0usize..32) {
        let pair = SigningKeyPair::generate();
        let digest = hash_unit(&doc);
        let signature = pair.sign(&digest);
        prop_assert_eq!(verify_digest(&pair.verifying_key_bytes(), &digest, &signature), Ok(true));

        // Any single-bit change of the digest defeats the signature.
        let mut tampered = digest.to_bytes();
        tampered[flip] ^= 0x01;
        prop_assert_eq!(
            verify_digest(&pair.verifying_key_bytes(), &Digest::from_bytes(tampered), &signature),
            Ok(false)
        );
    }
}
