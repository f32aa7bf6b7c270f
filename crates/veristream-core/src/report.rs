//! Validation reports: the per-group "latest" view and the session-wide
//! accumulated view.

use veristream_proto::tlv::{ProductInfo, VendorAttestation};

/// Outcome of validating one group (or of failing to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticity {
    /// No Veristream SEI has been seen; the stream carries no signatures.
    NotSigned,
    /// A signature was seen and is plausible, but the group could not be
    /// (fully) validated — typically the first group after a reset or fast
    /// forward, or a group awaiting a late public key.
    SignaturePresent,
    /// Group validated authentic.
    Ok,
    /// Group validated authentic, with units missing.
    OkWithMissingInfo,
    /// Group validated not authentic.
    NotOk,
}

impl Authenticity {
    fn rank(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::SignaturePresent => 1,
            Self::OkWithMissingInfo => 2,
            Self::NotSigned => 3,
            Self::NotOk => 4,
        }
    }

    /// The worse of two outcomes; used for the accumulated view.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

/// Validation result of the group(s) covered by one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestValidation {
    /// Outcome for the covered group(s).
    pub authenticity: Authenticity,
    /// Whether this validation consumed a manifest carrying a different
    /// public key than the one cached before.
    pub public_key_has_changed: bool,
    /// Hashable picture units the manifest declared, when one was consumed.
    pub expected_picture_units: Option<u32>,
    /// Hashable picture units actually observed in the covered span.
    pub received_picture_units: u32,
    /// Units still pending after this validation (the linking I at least).
    pub pending_picture_units: u32,
    /// Missing units detected by this validation.
    pub missing_picture_units: u32,
    /// `received − expected`, signed: negative when units were lost, positive
    /// when more units arrived than the signer declared (e.g. a signer reset
    /// mid-stream).
    pub picture_unit_surplus: Option<i32>,
    /// Verdict characters for the covered window, oldest first.
    pub validation: String,
}

/// Monotonically growing totals over the whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatedValidation {
    /// Worst outcome reported so far, once any report exists.
    pub authenticity: Option<Authenticity>,
    /// Every unit ever ingested.
    pub received_units: u64,
    /// Units currently awaiting a verdict.
    pub pending_units: u32,
    /// Units finalized authentic.
    pub authentic_units: u64,
    /// Units finalized unknown.
    pub unknown_units: u64,
    /// Units finalized not authentic or errored.
    pub invalid_units: u64,
    /// Missing units detected.
    pub missing_units: u64,
    /// Units outside the signature (parameter sets, foreign SEIs, secondary
    /// slices).
    pub ignored_units: u64,
    /// Whether the public key changed at any point of the session.
    pub public_key_has_changed: bool,
}

impl AccumulatedValidation {
    /// Fold one report outcome into the worst-case view.
    pub(crate) fn absorb_outcome(&mut self, outcome: Authenticity) {
        self.authenticity = Some(match self.authenticity {
            Some(current) => current.worst(outcome),
            None => outcome,
        });
    }
}

/// One report returned by the validator when a group is concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticityReport {
    /// Validation result for the concluded group(s).
    pub latest: LatestValidation,
    /// Session-wide totals.
    pub accumulated: AccumulatedValidation,
    /// Product information from the most recent recurrent tag.
    pub product_info: Option<ProductInfo>,
    /// Vendor attestation from the most recent recurrent tag.
    pub vendor_attestation: Option<VendorAttestation>,
    /// Version of this validator build.
    pub this_version: String,
    /// Wire version the signing side declared.
    pub version_on_signing_side: Option<String>,
}
