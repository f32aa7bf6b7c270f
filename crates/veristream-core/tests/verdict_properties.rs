//! Property-based tests for the verdict lattice.
//!
//! The second verification pass relies on the join being a real lattice
//! operation: commutative, associative, idempotent, and never decreasing —
//! that is what guarantees a later pass can only worsen a verdict.

use proptest::prelude::*;
use veristream_core::Verdict;

fn arbitrary_verdict() -> impl Strategy<Value = Verdict> {
    prop_oneof![
        Just(Verdict::Pending),
        Just(Verdict::Unknown),
        Just(Verdict::Ignored),
        Just(Verdict::Authentic),
        Just(Verdict::Missing),
        Just(Verdict::NotAuthentic),
        Just(Verdict::Error),
    ]
}

proptest! {
    #[test]
    fn join_is_commutative(a in arbitrary_verdict(), b in arbitrary_verdict()) {
        prop_assert_eq!(a.join(b), b.join(a));
    }

    #[test]
    fn join_is_associative(
        a in arbitrary_verdict(),
        b in arbitrary_verdict(),
        c in arbitrary_verdict(),
    ) {
        prop_assert_eq!(a.join(b).join(c), a.join(b.join(c)));
    }

    #[test]
    fn join_is_idempotent(a in arbitrary_verdict()) {
        prop_assert_eq!(a.join(a), a);
    }

    #[test]
    fn second_pass_never_whitewashes(a in arbitrary_verdict()) {
        // Once a unit is not authentic, no later pass may clear it.
        prop_assert_eq!(Verdict::NotAuthentic.join(a), a.join(Verdict::NotAuthentic));
        prop_assert_ne!(Verdict::NotAuthentic.join(a), Verdict::Authentic);
        prop_assert_ne!(Verdict::Error.join(a), Verdict::Authentic);
    }
}
