//! Group-of-pictures bookkeeping for both session sides.
//!
//! The validator tracks group closures (a closure is the arrival of the
//! primary I slice opening the next group) and how far verdicts have been
//! reported; the signer tracks the evolving group being built: its chained
//! hash, its bounded per-unit digest list, and its counter.
//!
//! # State machine
//!
//! A group cycles `Open → Closed → Verified → Reported`. `Closed` happens on
//! the next group's I slice (or is forced by a second manifest with no
//! closure in between); `Verified` when its manifest's signature is checked;
//! `Reported` when verdicts are written back and the report is emitted. With
//! late manifests and late public keys, several groups can sit between
//! `Closed` and `Verified` at once — that distance is what the validator's
//! counters measure.

use std::collections::VecDeque;

use tracing::debug;
use veristream_crypto::{Digest, GopHash};

/// Validation phase of the group currently being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GopPhase {
    /// Accumulating units.
    Open,
    /// Closure observed, awaiting signature verification.
    Closed,
    /// Signature checked, verdicts not yet written back.
    Verified,
    /// Verdicts written and reported.
    Reported,
}

/// Validator-side group tracking.
#[derive(Debug)]
pub(crate) struct GopState {
    /// Phase of the newest group (observability only; decisions run on the
    /// counters below).
    pub phase: GopPhase,
    /// Whether any Veristream SEI was ever seen on this stream.
    pub signing_present: bool,
    /// Number of group closures observed.
    pub closures_seen: u32,
    /// Closure number through which verdicts have been reported.
    pub reported_through: u32,
    /// Counter of the last manifest that was consumed.
    pub last_counter: Option<u32>,
    /// Groups reported as unverifiable since the last consumed manifest;
    /// keeps the expected counter honest across lost SEIs.
    pub lost_gops_reported: u32,
    /// Whether a lost SEI has been detected on this stream.
    pub has_lost_sei: bool,
    /// Recent closures as (closure number, window handle).
    closures: VecDeque<(u32, u64)>,
}

impl GopState {
    pub fn new() -> Self {
        Self {
            phase: GopPhase::Open,
            signing_present: false,
            closures_seen: 0,
            reported_through: 0,
            last_counter: None,
            lost_gops_reported: 0,
            has_lost_sei: false,
            closures: VecDeque::new(),
        }
    }

    /// Record a group closure at `seq`; returns its closure number
    /// (1-based).
    pub fn record_closure(&mut self, seq: u64) -> u32 {
        self.closures_seen += 1;
        self.closures.push_back((self.closures_seen, seq));
        self.phase = GopPhase::Closed;
        debug!(closure = self.closures_seen, seq, "group closed");
        // Closures at or before the reported point are never needed again.
        while let Some(&(num, _)) = self.closures.front() {
            if num + 1 < self.reported_through || self.closures.len() > 8 {
                self.closures.pop_front();
            } else {
                break;
            }
        }
        self.closures_seen
    }

    /// Window handle of a recorded closure number.
    pub fn closure_seq(&self, number: u32) -> Option<u64> {
        self.closures.iter().find(|(num, _)| *num == number).map(|&(_, seq)| seq)
    }

    /// The manifest counter the next consumed manifest should carry.
    pub fn expected_counter(&self) -> Option<u32> {
        self.last_counter.map(|c| c + 1 + self.lost_gops_reported)
    }

    /// Note a consumed manifest; resyncs the expected counter.
    pub fn note_manifest_consumed(&mut self, counter: u32, reported_through: u32) {
        self.last_counter = Some(counter);
        self.lost_gops_reported = 0;
        self.reported_through = self.reported_through.max(reported_through);
        self.phase = GopPhase::Reported;
    }

    /// Note a group reported without verification (lost SEI or unsigned).
    pub fn note_unverified_report(&mut self, through: u32, lost: bool) {
        self.reported_through = self.reported_through.max(through);
        if lost {
            self.lost_gops_reported += 1;
            self.has_lost_sei = true;
        }
        self.phase = GopPhase::Reported;
    }
}

/// Default capacity of the signing-side per-unit digest list.
pub(crate) const DEFAULT_HASH_LIST_CAPACITY: usize = 300;

/// Bounded per-unit digest list with fallback semantics.
///
/// When a group outgrows the capacity, `push` reports demotion instead of
/// failing: the group falls back to GOP-level authenticity and the list is
/// discarded for the remainder of the group.
#[derive(Debug)]
pub(crate) struct HashList {
    digests: Vec<Digest>,
    capacity: usize,
    demoted: bool,
}

impl HashList {
    pub fn new(capacity: usize) -> Self {
        Self { digests: Vec::new(), capacity, demoted: false }
    }

    /// Append a digest; returns `false` once the group is demoted.
    pub fn push(&mut self, digest: Digest) -> bool {
        if self.demoted {
            return false;
        }
        if self.digests.len() >= self.capacity {
            self.demoted = true;
            self.digests.clear();
            return false;
        }
        self.digests.push(digest);
        true
    }

    pub fn is_demoted(&self) -> bool {
        self.demoted
    }

    pub fn digests(&self) -> &[Digest] {
        &self.digests
    }

    pub fn reset(&mut self) {
        self.digests.clear();
        self.demoted = false;
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }
}

/// Signer-side tracker of the group being built.
#[derive(Debug)]
pub(crate) struct GroupTracker {
    /// Counter of the group being accumulated.
    pub counter: u32,
    chain: GopHash,
    list: HashList,
    /// Hashable units absorbed into the current group.
    pub count: u16,
}

impl GroupTracker {
    pub fn new() -> Self {
        Self {
            counter: 0,
            chain: GopHash::new(),
            list: HashList::new(DEFAULT_HASH_LIST_CAPACITY),
            count: 0,
        }
    }

    /// Absorb one unit digest into the group.
    pub fn absorb(&mut self, digest: &Digest, keep_list: bool) {
        self.chain.update(digest);
        self.count = self.count.saturating_add(1);
        if keep_list && !self.list.push(*digest) {
            debug!(counter = self.counter, "hash list full, group demoted to GOP level");
        }
    }

    /// Finalized chained hash of the group so far.
    pub fn gop_hash(&self) -> Digest {
        self.chain.current()
    }

    /// The per-unit digest list, unless the group was demoted.
    pub fn hash_list(&self) -> Option<&[Digest]> {
        (!self.list.is_demoted()).then(|| self.list.digests())
    }

    /// Close the group and open the next one.
    pub fn reopen(&mut self) {
        self.counter = self.counter.wrapping_add(1);
        self.chain.reset();
        self.list.reset();
        self.count = 0;
    }

    /// Reset to a fresh stream (counter included).
    pub fn reset(&mut self) {
        self.counter = 0;
        self.chain.reset();
        self.list.reset();
        self.count = 0;
    }

    pub fn set_list_capacity(&mut self, capacity: usize) {
        self.list.set_capacity(capacity);
    }
}
