//! The unit window: every ingested unit awaiting or carrying a verdict.
//!
//! The original doubly linked list is realised as a deque of items addressed
//! by monotonically increasing sequence numbers — the sequence numbers are
//! the handles, the deque gives O(1) access at both ends, and there is no
//! cyclic ownership to manage. Windows stay small (a few groups of
//! pictures), so the occasional linear lookup by sequence number is cheap.
//!
//! Synthetic missing-unit markers are items without a unit and without a
//! sequence number, inserted where validation detected a gap; they render as
//! `M` in report strings and are torn down with the rest of the window.

use std::collections::VecDeque;

use veristream_crypto::Digest;
use veristream_proto::{CodedUnit, UnitKind};

use crate::verdict::Verdict;

/// The attributes of an ingested unit the session needs to keep.
///
/// Everything decision-relevant (hashability, group boundaries, SEI
/// payloads) is consumed at ingest time; what remains here identifies the
/// unit in logs and dumps.
#[derive(Debug, Clone)]
pub(crate) struct OwnedUnit {
    /// Coarse classification.
    pub kind: UnitKind,
    /// Total framed size in bytes.
    pub size: usize,
}

impl From<&CodedUnit<'_>> for OwnedUnit {
    fn from(unit: &CodedUnit<'_>) -> Self {
        Self { kind: unit.kind, size: unit.data.len() }
    }
}

/// One entry of the window.
#[derive(Debug, Clone)]
pub(crate) struct WindowItem {
    /// Handle of the item; `None` for synthetic missing markers.
    pub seq: Option<u64>,
    /// The ingested unit; `None` for synthetic missing markers.
    pub unit: Option<OwnedUnit>,
    /// Digest of the hashable span, when the unit is hashable.
    pub digest: Option<Digest>,
    /// Current verdict.
    pub verdict: Verdict,
    /// Set when the first verification pass could not vouch for this unit;
    /// forces the second pass to `N`.
    pub first_verification_failed: bool,
}

impl WindowItem {
    fn marker() -> Self {
        Self {
            seq: None,
            unit: None,
            digest: None,
            verdict: Verdict::Missing,
            first_verification_failed: false,
        }
    }

}

/// The window of ingested units.
#[derive(Debug, Default)]
pub(crate) struct UnitWindow {
    items: VecDeque<WindowItem>,
    next_seq: u64,
}

impl UnitWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit; returns its sequence-number handle.
    pub fn push(&mut self, unit: OwnedUnit, digest: Option<Digest>, verdict: Verdict) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push_back(WindowItem {
            seq: Some(seq),
            unit: Some(unit),
            digest,
            verdict,
            first_verification_failed: false,
        });
        seq
    }

    /// Handle that the next pushed unit will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn get_mut(&mut self, seq: u64) -> Option<&mut WindowItem> {
        self.items.iter_mut().find(|item| item.seq == Some(seq))
    }

    /// Insert `count` missing markers directly before the item at `seq`, or
    /// at the back when `seq` is past every item.
    pub fn insert_missing_before(&mut self, seq: Option<u64>, count: usize) {
        let index = seq
            .and_then(|s| self.items.iter().position(|item| item.seq == Some(s)))
            .unwrap_or(self.items.len());
        for _ in 0..count {
            self.items.insert(index, WindowItem::marker());
        }
    }

    /// Iterate all items front to back.
    pub fn iter(&self) -> impl Iterator<Item = &WindowItem> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WindowItem> {
        self.items.iter_mut()
    }

    /// Items with a digest whose handle lies in `[from, to)`.
    pub fn observed(&self, from: u64, to: u64) -> Vec<(u64, Digest)> {
        self.items
            .iter()
            .filter_map(|item| match (item.seq, item.digest) {
                (Some(seq), Some(digest)) if seq >= from && seq < to => Some((seq, digest)),
                _ => None,
            })
            .collect()
    }

    /// Number of items still pending.
    pub fn count_pending(&self) -> u32 {
        self.items.iter().filter(|item| item.verdict.is_pending()).count() as u32
    }

    /// Render the verdict string over the whole window.
    pub fn verdict_string(&self) -> String {
        self.items.iter().map(|item| item.verdict.symbol()).collect()
    }

    /// Pop finalized items from the front until `retain_from` (markers in
    /// between go too). Returns the popped items for tallying.
    pub fn drop_finalized(&mut self, retain_from: u64) -> Vec<WindowItem> {
        let mut dropped = Vec::new();
        while let Some(front) = self.items.front() {
            let droppable = !front.verdict.is_pending()
                && match front.seq {
                    Some(seq) => seq < retain_from,
                    None => true,
                };
            if !droppable {
                break;
            }
            if let Some(item) = self.items.pop_front() {
                dropped.push(item);
            }
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Clear the window, keeping the handle counter monotonic.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn picture_unit() -> OwnedUnit {
        OwnedUnit { kind: UnitKind::P, size: 10 }
    }

    #[test]
    fn push_assigns_monotonic_handles() {
        let mut window = UnitWindow::new();
        let a = window.push(picture_unit(), None, Verdict::Pending);
        let b = window.push(picture_unit(), None, Verdict::Pending);
        assert_eq!(b, a + 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn markers_sit_before_their_anchor() {
        let mut window = UnitWindow::new();
        let a = window.push(picture_unit(), None, Verdict::Authentic);
        let b = window.push(picture_unit(), None, Verdict::Pending);
        window.insert_missing_before(Some(b), 2);
        assert_eq!(window.verdict_string(), ".MMP");
        assert_eq!(window.iter().filter(|i| i.unit.is_none()).count(), 2);
        let _ = a;
    }

    #[test]
    fn drop_stops_at_pending() {
        let mut window = UnitWindow::new();
        let _a = window.push(picture_unit(), None, Verdict::Authentic);
        window.insert_missing_before(None, 1);
        let b = window.push(picture_unit(), None, Verdict::Pending);
        let dropped = window.drop_finalized(b);
        assert_eq!(dropped.len(), 2);
        assert_eq!(window.len(), 1);
        assert_eq!(window.count_pending(), 1);
    }

    #[test]
    fn observed_is_bounded_and_ordered() {
        let mut window = UnitWindow::new();
        let d = veristream_crypto::hash_unit(b"x");
        let a = window.push(picture_unit(), Some(d), Verdict::Pending);
        let b = window.push(picture_unit(), None, Verdict::Ignored);
        let c = window.push(picture_unit(), Some(d), Verdict::Pending);
        let observed = window.observed(a, c + 1);
        assert_eq!(observed.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![a, c]);
        let _ = b;
    }

    #[test]
    fn clear_keeps_handles_monotonic() {
        let mut window = UnitWindow::new();
        let a = window.push(picture_unit(), None, Verdict::Pending);
        window.clear();
        let b = window.push(picture_unit(), None, Verdict::Pending);
        assert!(b > a);
    }
}
