//! The authenticity validator: the receiving end of a signed stream.
//!
//! Every ingested unit is parsed, windowed, and hashed; every Veristream SEI
//! is decoded into a manifest; every group closure (the primary I slice of
//! the next group) triggers validation of the closed group against its
//! manifest. The pipeline is sans-IO and deterministic: one call in, at most
//! one report out, nothing blocks.
//!
//! # Out-of-order tolerance
//!
//! Manifests normally precede the closure of their group. Three departures
//! are handled without stopping the stream:
//!
//! - **Late manifest** — the group already closed; the manifest is applied
//!   retroactively with the recorded closure as linking tail. Units ingested
//!   after that closure simply stay pending a little longer.
//! - **Lost manifest** — detected through the group-counter gap (or a second
//!   closure with nothing to validate against); the unverifiable group is
//!   reported not authentic and the linking unit is flagged so the next pass
//!   cannot vouch for it either.
//! - **Late public key** — validation state is snapshotted into a bounded
//!   ring (at most [`MAX_PENDING_GOPS`] groups) and replayed in order when a
//!   key finally arrives; until then groups report `SignaturePresent`.

use std::collections::VecDeque;

use tracing::{debug, warn};
use veristream_crypto::{
    Digest, GopHash, document_hash, hash_unit, validate_verifying_key, verify_digest,
};
use veristream_proto::tlv::{ManifestBody, ProductInfo, VendorAttestation};
use veristream_proto::{Codec, DecodedManifest, ProtocolError, Validity, parse_unit};

use crate::error::{Result, SessionError};
use crate::gop::{GopPhase, GopState};
use crate::report::{
    AccumulatedValidation, Authenticity, AuthenticityReport, LatestValidation,
};
use crate::verdict::Verdict;
use crate::window::{OwnedUnit, UnitWindow};

/// Upper bound on groups whose verdicts may wait for a late public key.
pub const MAX_PENDING_GOPS: usize = 120;

/// A decoded manifest waiting for its group to close.
struct PendingManifest {
    sei_seq: u64,
    body: ManifestBody,
    signature: [u8; 64],
    doc_hash: Digest,
}

/// Snapshot of a validation deferred until a public key arrives.
struct PendingGop {
    sei_seq: u64,
    body: ManifestBody,
    signature: [u8; 64],
    doc_hash: Digest,
    from_seq: u64,
    tail_seq: Option<u64>,
    first_manifest: bool,
}

/// Outcome of one validation step inside a single ingest call.
struct StepDraft {
    outcome: Authenticity,
    expected: Option<u32>,
    received: u32,
    missing: u32,
    surplus: Option<i32>,
}

/// An authenticity-validation session.
///
/// Single-threaded; callers serialize access. Independent sessions share no
/// state.
pub struct Validator {
    codec: Codec,
    window: UnitWindow,
    gop: GopState,
    pending_manifest: Option<PendingManifest>,
    public_key: Option<[u8; 32]>,
    key_changed_pending: bool,
    pending_gops: VecDeque<PendingGop>,
    validate_from: u64,
    product_info: Option<ProductInfo>,
    vendor_attestation: Option<VendorAttestation>,
    signing_version: Option<String>,
    acc: AccumulatedValidation,
    poisoned: bool,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("codec", &self.codec)
            .field("phase", &self.gop.phase)
            .field("window", &self.window.len())
            .field("pending_gops", &self.pending_gops.len())
            .field("has_public_key", &self.public_key.is_some())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl Validator {
    /// Create a validation session for `codec`.
    #[must_use]
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            window: UnitWindow::new(),
            gop: GopState::new(),
            pending_manifest: None,
            public_key: None,
            key_changed_pending: false,
            pending_gops: VecDeque::new(),
            validate_from: 0,
            product_info: None,
            vendor_attestation: None,
            signing_version: None,
            acc: AccumulatedValidation::default(),
            poisoned: false,
        }
    }

    /// Session-wide accumulated totals.
    #[must_use]
    pub fn accumulated(&self) -> &AccumulatedValidation {
        &self.acc
    }

    /// The cached verifying key, once one arrived in-stream.
    #[must_use]
    pub fn public_key(&self) -> Option<&[u8; 32]> {
        self.public_key.as_ref()
    }

    /// Whether a lost manifest has been detected on this stream.
    #[must_use]
    pub fn has_lost_sei(&self) -> bool {
        self.gop.has_lost_sei
    }

    /// Rewind all per-stream state; the cached public key and the
    /// accumulated totals survive.
    pub fn reset(&mut self) {
        self.window.clear();
        self.gop = GopState::new();
        self.pending_manifest = None;
        self.pending_gops.clear();
        self.validate_from = self.window.next_seq();
        self.key_changed_pending = false;
        self.poisoned = false;
        debug!("session reset");
    }

    /// Push one coded unit and run the validation pipeline.
    ///
    /// Returns a report when this unit concluded one or more groups.
    ///
    /// # Errors
    ///
    /// Fatal errors ([`SessionError::is_fatal`]) poison the session; every
    /// later call returns [`SessionError::NotSupported`] until [`reset`]
    /// (`Self::reset`) is called.
    pub fn add_unit(&mut self, data: &[u8]) -> Result<Option<AuthenticityReport>> {
        if self.poisoned {
            return Err(SessionError::NotSupported);
        }
        if data.is_empty() {
            return Err(SessionError::InvalidParameter);
        }

        let unit = parse_unit(data, self.codec, true);
        self.acc.received_units += 1;

        let digest = unit.hashable_bytes().map(hash_unit);
        let initial = if unit.validity < Validity::Valid {
            Verdict::Unknown
        } else if unit.is_signed_sei() || digest.is_some() {
            Verdict::Pending
        } else {
            Verdict::Ignored
        };
        let owned = OwnedUnit::from(&unit);
        debug!(kind = ?owned.kind, bytes = owned.size, "unit ingested");

        let mut drafts = Vec::new();
        let result = if unit.is_signed_sei() {
            self.ingest_signed_sei(&unit, owned, &mut drafts)
        } else {
            let seq = self.window.push(owned, digest, initial);
            if unit.is_first_in_gop() { self.ingest_closure(seq, &mut drafts) } else { Ok(()) }
        };
        if let Err(e) = result {
            if e.is_fatal() {
                self.poisoned = true;
            }
            return Err(e);
        }

        Ok(self.emit_report(&drafts))
    }

    /// Handle a structurally valid Veristream SEI.
    fn ingest_signed_sei(
        &mut self,
        unit: &veristream_proto::CodedUnit<'_>,
        owned: OwnedUnit,
        drafts: &mut Vec<StepDraft>,
    ) -> Result<()> {
        let Some(info) = &unit.sei else { return Ok(()) };
        let decoded = match DecodedManifest::decode(&info.tlv) {
            Ok(d) => d,
            Err(ProtocolError::UnsupportedVersion { major, minor, .. }) => {
                return Err(SessionError::IncompatibleVersion { major, minor });
            }
            Err(e) => return Err(SessionError::Decoding(e)),
        };
        let doc_hash = document_hash(&info.tlv[..decoded.signed_len]);

        let sei_seq = self.window.push(owned, None, Verdict::Pending);
        self.gop.signing_present = true;
        debug!(counter = decoded.body.gop_counter, sei_seq, "manifest decoded");

        if let Some(pi) = decoded.body.product_info.clone() {
            self.product_info = Some(pi);
        }
        if let Some(vendor) = decoded.body.vendor_attestation.clone() {
            self.vendor_attestation = Some(vendor);
        }
        self.signing_version =
            Some(format!("{}.{}", decoded.body.version.0, decoded.body.version.1));
        if let Some(key) = decoded.body.public_key {
            self.cache_public_key(key, drafts)?;
        }

        // A successor manifest with no group end in between forces the
        // pending one out: its group lost its closing unit.
        if let Some(old) = self.pending_manifest.take() {
            debug!("manifest forced out by successor without a group end");
            self.run_validation(&old, None, None, drafts)?;
        }

        let pm = PendingManifest {
            sei_seq,
            body: decoded.body,
            signature: decoded.signature,
            doc_hash,
        };

        // Groups skipped by this manifest's counter can never be verified.
        self.fire_counter_gap(pm.body.gop_counter, drafts);

        // Late manifest: its group already closed.
        let closure_num = pm.body.gop_counter.wrapping_add(1);
        let late_tail = (closure_num <= self.gop.closures_seen)
            .then(|| self.gop.closure_seq(closure_num))
            .flatten()
            .filter(|&s| s >= self.validate_from);
        if let Some(tail) = late_tail {
            debug!(counter = pm.body.gop_counter, "late manifest, validating retroactively");
            self.run_validation(&pm, Some(tail), Some(closure_num), drafts)?;
        } else {
            self.pending_manifest = Some(pm);
        }
        Ok(())
    }

    /// Handle a group closure (the primary I slice opening the next group).
    fn ingest_closure(&mut self, seq: u64, drafts: &mut Vec<StepDraft>) -> Result<()> {
        let n = self.gop.record_closure(seq);
        if let Some(pm) = self.pending_manifest.take() {
            self.run_validation(&pm, Some(seq), Some(n), drafts)?;
        } else if n >= self.gop.reported_through + 2 {
            // A whole group sits behind with nothing to verify it against.
            let through = n - 1;
            if self.gop.signing_present {
                self.report_unverifiable(through, drafts);
            } else {
                self.report_unsigned(through, drafts);
            }
        }
        Ok(())
    }

    /// Cache a key received in-stream; replay deferred groups on first
    /// arrival, flag a change on replacement.
    fn cache_public_key(&mut self, key: [u8; 32], drafts: &mut Vec<StepDraft>) -> Result<()> {
        match self.public_key {
            None => {
                validate_verifying_key(&key)?;
                self.public_key = Some(key);
                debug!("public key received");
                self.replay_pending_gops(drafts)?;
            }
            Some(current) if current != key => {
                validate_verifying_key(&key)?;
                warn!("public key changed mid-stream");
                self.public_key = Some(key);
                self.key_changed_pending = true;
                self.acc.public_key_has_changed = true;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Report every group the incoming manifest's counter skips over.
    fn fire_counter_gap(&mut self, counter: u32, drafts: &mut Vec<StepDraft>) {
        while let Some(expected) = self.gop.expected_counter() {
            if counter <= expected || self.gop.reported_through >= self.gop.closures_seen {
                break;
            }
            let through = self.gop.reported_through + 1;
            if !self.report_unverifiable(through, drafts) {
                break;
            }
        }
    }

    /// Mark the group ending at closure `through` not authentic: its
    /// manifest never arrived. Returns `false` if the closure is unknown.
    fn report_unverifiable(&mut self, through: u32, drafts: &mut Vec<StepDraft>) -> bool {
        let Some(bseq) = self.gop.closure_seq(through) else {
            warn!(closure = through, "closure out of range, cannot report lost group");
            return false;
        };
        warn!(closure = through, "group unverifiable: manifest lost");
        let received = self.window.observed(self.validate_from, bseq).len() as u32;
        for item in self.window.iter_mut() {
            let Some(s) = item.seq else { continue };
            // Only picture units go not-authentic; a manifest still being
            // processed keeps its own verdict path.
            if s >= self.validate_from
                && s < bseq
                && item.verdict.is_pending()
                && item.digest.is_some()
            {
                item.verdict = Verdict::NotAuthentic;
            }
        }
        if let Some(link) = self.window.get_mut(bseq) {
            link.first_verification_failed = true;
        }
        self.gop.note_unverified_report(through, true);
        self.validate_from = bseq;
        drafts.push(StepDraft {
            outcome: Authenticity::NotOk,
            expected: None,
            received,
            missing: 0,
            surplus: None,
        });
        true
    }

    /// Mark the group ending at closure `through` unknown: the stream has
    /// never shown a signature.
    fn report_unsigned(&mut self, through: u32, drafts: &mut Vec<StepDraft>) {
        let Some(bseq) = self.gop.closure_seq(through) else { return };
        let received = self.window.observed(self.validate_from, bseq).len() as u32;
        for item in self.window.iter_mut() {
            let Some(s) = item.seq else { continue };
            if s >= self.validate_from && s < bseq && item.verdict.is_pending() {
                item.verdict = Verdict::Unknown;
            }
        }
        self.gop.note_unverified_report(through, false);
        self.validate_from = bseq;
        drafts.push(StepDraft {
            outcome: Authenticity::NotSigned,
            expected: None,
            received,
            missing: 0,
            surplus: None,
        });
    }

    /// Validate one group against its manifest and write verdicts back.
    ///
    /// `tail_seq` is the closure linking into the next group; `None` when
    /// the closure never arrived (forced validation).
    fn run_validation(
        &mut self,
        pm: &PendingManifest,
        tail_seq: Option<u64>,
        closure_num: Option<u32>,
        drafts: &mut Vec<StepDraft>,
    ) -> Result<()> {
        self.fire_counter_gap(pm.body.gop_counter, drafts);

        let first_manifest = self.gop.last_counter.is_none();
        let from = self.validate_from;
        let reported_through = closure_num.unwrap_or(self.gop.closures_seen);

        if self.public_key.is_none() {
            if self.pending_gops.len() >= MAX_PENDING_GOPS {
                return Err(SessionError::PendingCapacityExceeded { max: MAX_PENDING_GOPS });
            }
            let to = tail_seq.map_or(pm.sei_seq, |t| t + 1);
            let received = self.window.observed(from, to).len() as u32;
            self.pending_gops.push_back(PendingGop {
                sei_seq: pm.sei_seq,
                body: pm.body.clone(),
                signature: pm.signature,
                doc_hash: pm.doc_hash,
                from_seq: from,
                tail_seq,
                first_manifest,
            });
            debug!(queued = self.pending_gops.len(), "verdicts deferred, no public key yet");
            self.gop.note_manifest_consumed(pm.body.gop_counter, reported_through);
            self.validate_from = tail_seq.unwrap_or(pm.sei_seq);
            drafts.push(StepDraft {
                outcome: Authenticity::SignaturePresent,
                expected: None,
                received,
                missing: 0,
                surplus: None,
            });
            return Ok(());
        }

        let draft = self.verify_group(
            &pm.body,
            &pm.signature,
            &pm.doc_hash,
            pm.sei_seq,
            from,
            tail_seq,
            first_manifest,
        )?;
        self.gop.phase = GopPhase::Verified;
        self.gop.note_manifest_consumed(pm.body.gop_counter, reported_through);
        self.validate_from = match tail_seq {
            Some(tail) => tail,
            // Forced validation: trailing units that matched nothing belong
            // to the next group and stay pending.
            None => self
                .window
                .iter()
                .filter(|item| item.verdict.is_pending())
                .filter_map(|item| item.seq)
                .find(|&s| s >= from && s < pm.sei_seq)
                .unwrap_or(pm.sei_seq),
        };
        drafts.push(draft);
        Ok(())
    }

    /// Verify a manifest signature and match the covered units.
    #[allow(clippy::too_many_arguments)]
    fn verify_group(
        &mut self,
        body: &ManifestBody,
        signature: &[u8; 64],
        doc_hash: &Digest,
        sei_seq: u64,
        from: u64,
        tail_seq: Option<u64>,
        first_manifest: bool,
    ) -> Result<StepDraft> {
        let Some(key) = self.public_key else {
            return Err(SessionError::NotSupported);
        };
        let to = tail_seq.map_or(sei_seq, |t| t + 1);
        let observed = self.window.observed(from, to);
        let expected_count = u32::from(body.hashable_count);
        let received = observed.len() as u32;

        let valid = verify_digest(&key, doc_hash, signature)?;
        if !valid {
            warn!(counter = body.gop_counter, "manifest signature invalid");
            if let Some(item) = self.window.get_mut(sei_seq) {
                item.verdict = Verdict::NotAuthentic;
            }
            let (body_obs, tail_obs) = split_tail(&observed, tail_seq);
            for &(s, _) in body_obs {
                self.assign(s, Verdict::NotAuthentic);
            }
            if let Some((ts, _)) = tail_obs
                && let Some(link) = self.window.get_mut(ts)
            {
                link.first_verification_failed = true;
            }
            return Ok(StepDraft {
                outcome: Authenticity::NotOk,
                expected: Some(expected_count),
                received,
                missing: 0,
                surplus: Some(received as i32 - expected_count as i32),
            });
        }

        if let Some(item) = self.window.get_mut(sei_seq) {
            item.verdict = item.verdict.join(Verdict::Authentic);
        }

        let draft = match &body.hash_list {
            Some(list) => self.match_frame_level(
                body,
                &observed,
                list,
                tail_seq,
                sei_seq,
                first_manifest,
            ),
            None => self.match_gop_level(body, &observed, tail_seq, first_manifest),
        };
        Ok(draft)
    }

    /// Frame-level matching: align observed digests against the manifest's
    /// ordered list with substitution preference.
    fn match_frame_level(
        &mut self,
        body: &ManifestBody,
        observed: &[(u64, Digest)],
        list: &[[u8; 32]],
        tail_seq: Option<u64>,
        sei_seq: u64,
        first_manifest: bool,
    ) -> StepDraft {
        let expected: Vec<Digest> = list.iter().map(|d| Digest::from_bytes(*d)).collect();
        let (body_obs, tail_obs) = split_tail(observed, tail_seq);

        let mut assignments: Vec<(u64, Verdict)> = Vec::with_capacity(body_obs.len());
        let mut markers: Vec<(Option<u64>, usize)> = Vec::new();
        let mut missing = 0usize;
        let mut j = 0usize;
        let mut last_match: Option<usize> = None;

        for (i, &(s, h)) in body_obs.iter().enumerate() {
            if let Some(k) = expected[j..].iter().position(|e| *e == h) {
                if k > 0 {
                    markers.push((Some(s), k));
                    missing += k;
                }
                assignments.push((s, Verdict::Authentic));
                j += k + 1;
                last_match = Some(i);
            } else {
                // Substitution when the next expected digest is also absent
                // from everything still to come (tail included); plain
                // insertion otherwise. In a forced validation the unmatched
                // expected units may simply not have arrived yet, so they
                // are left to the missing accounting instead.
                let upcoming_has_expected = j < expected.len()
                    && (body_obs[i..].iter().any(|&(_, h2)| h2 == expected[j])
                        || tail_obs.is_some_and(|(_, th)| th == expected[j]));
                if tail_obs.is_some() && j < expected.len() && !upcoming_has_expected {
                    j += 1;
                }
                assignments.push((s, Verdict::NotAuthentic));
            }
        }

        let mut tail_failed = false;
        if let Some((ts, th)) = tail_obs {
            if let Some(k) = expected[j..].iter().position(|e| *e == th) {
                if k > 0 {
                    markers.push((Some(ts), k));
                    missing += k;
                }
                j += k + 1;
            } else {
                tail_failed = true;
                if j < expected.len() {
                    j += 1;
                }
            }
            if j < expected.len() {
                markers.push((Some(ts), expected.len() - j));
                missing += expected.len() - j;
            }
        } else {
            // Forced validation: units after the last match belong to the
            // next group and stay pending.
            let keep_from = last_match.map_or(usize::MAX, |lm| lm + 1);
            if keep_from < assignments.len() {
                assignments.truncate(keep_from);
            }
            if j < expected.len() {
                markers.push((Some(sei_seq), expected.len() - j));
                missing += expected.len() - j;
            }
        }

        let has_invalid = assignments.iter().any(|&(_, v)| v == Verdict::NotAuthentic);
        // A linking unit the previous pass could not vouch for taints this
        // group even when every digest lines up.
        let link_broken = body_obs.iter().any(|&(s, _)| self.is_first_failed(s));

        // A fresh session may join mid-stream (fast forward, file export):
        // the unreceived part of the first group is not "missing".
        let outcome = if first_manifest && !has_invalid && !tail_failed && missing > 0 {
            markers.clear();
            missing = 0;
            Authenticity::SignaturePresent
        } else if has_invalid || tail_failed || link_broken {
            Authenticity::NotOk
        } else if missing > 0 {
            Authenticity::OkWithMissingInfo
        } else {
            Authenticity::Ok
        };

        for (s, v) in assignments {
            self.assign(s, v);
        }
        for (anchor, count) in markers {
            self.window.insert_missing_before(anchor, count);
        }
        if tail_failed
            && let Some((ts, _)) = tail_obs
            && let Some(link) = self.window.get_mut(ts)
        {
            link.first_verification_failed = true;
        }

        let expected_count = u32::from(body.hashable_count);
        let received = observed.len() as u32;
        if outcome == Authenticity::SignaturePresent {
            // The unreceived context makes the declared count meaningless.
            return StepDraft { outcome, expected: None, received, missing: 0, surplus: None };
        }
        StepDraft {
            outcome,
            expected: Some(expected_count),
            received,
            missing: missing as u32,
            surplus: Some(received as i32 - expected_count as i32),
        }
    }

    /// GOP-level matching: recompute the chained hash over everything
    /// observed and compare once.
    fn match_gop_level(
        &mut self,
        body: &ManifestBody,
        observed: &[(u64, Digest)],
        tail_seq: Option<u64>,
        first_manifest: bool,
    ) -> StepDraft {
        let chain = GopHash::over(observed.iter().map(|(_, d)| d));
        let expected_count = u32::from(body.hashable_count);
        let received = observed.len() as u32;
        let (body_obs, tail_obs) = split_tail(observed, tail_seq);

        let link_broken = body_obs.iter().any(|&(s, _)| self.is_first_failed(s));
        let (outcome, missing) = if chain == Digest::from_bytes(body.gop_hash) {
            for &(s, _) in body_obs {
                self.assign(s, Verdict::Authentic);
            }
            if link_broken { (Authenticity::NotOk, 0) } else { (Authenticity::Ok, 0) }
        } else if first_manifest && received < expected_count {
            // An incomplete first group after a join mid-stream; with the
            // whole group present, a mismatch is real tampering.
            for &(s, _) in body_obs {
                self.assign(s, Verdict::Unknown);
            }
            return StepDraft {
                outcome: Authenticity::SignaturePresent,
                expected: None,
                received,
                missing: 0,
                surplus: None,
            };
        } else {
            warn!(counter = body.gop_counter, "group hash mismatch");
            for &(s, _) in body_obs {
                self.assign(s, Verdict::NotAuthentic);
            }
            if let Some((ts, _)) = tail_obs
                && let Some(link) = self.window.get_mut(ts)
            {
                link.first_verification_failed = true;
            }
            (Authenticity::NotOk, expected_count.saturating_sub(received))
        };

        StepDraft {
            outcome,
            expected: Some(expected_count),
            received,
            missing,
            surplus: Some(received as i32 - expected_count as i32),
        }
    }

    /// Replay deferred groups once a public key has arrived.
    fn replay_pending_gops(&mut self, drafts: &mut Vec<StepDraft>) -> Result<()> {
        while let Some(snap) = self.pending_gops.pop_front() {
            debug!(counter = snap.body.gop_counter, "replaying deferred group");
            let draft = self.verify_group(
                &snap.body,
                &snap.signature,
                &snap.doc_hash,
                snap.sei_seq,
                snap.from_seq,
                snap.tail_seq,
                snap.first_manifest,
            )?;
            drafts.push(draft);
        }
        Ok(())
    }

    /// Whether the first verification pass already failed for `seq`.
    fn is_first_failed(&self, seq: u64) -> bool {
        self.window.iter().any(|item| item.seq == Some(seq) && item.first_verification_failed)
    }

    /// Second-pass-aware verdict assignment.
    fn assign(&mut self, seq: u64, verdict: Verdict) {
        if let Some(item) = self.window.get_mut(seq) {
            if verdict == Verdict::Authentic && item.first_verification_failed {
                item.verdict = item.verdict.join(Verdict::NotAuthentic);
            } else {
                item.verdict = item.verdict.join(verdict);
            }
        }
    }

    /// Assemble the report for this ingest, retire finalized items, and
    /// update the accumulated totals.
    fn emit_report(&mut self, drafts: &[StepDraft]) -> Option<AuthenticityReport> {
        let first = drafts.first()?;
        let outcome = drafts.iter().skip(1).fold(first.outcome, |acc, d| acc.worst(d.outcome));
        let manifest_step = drafts.iter().rev().find(|d| d.expected.is_some());
        let expected = manifest_step.and_then(|d| d.expected);
        let received =
            manifest_step.map_or_else(|| drafts.iter().map(|d| d.received).sum::<u32>(), |d| {
                d.received
            });
        let missing: u32 = drafts.iter().map(|d| d.missing).sum();
        let surplus = manifest_step.and_then(|d| d.surplus);

        let validation = self.window.verdict_string();
        let pending = self.window.count_pending();
        self.acc.absorb_outcome(outcome);

        let retain =
            self.pending_gops.front().map_or(self.validate_from, |snap| snap.from_seq);
        for item in self.window.drop_finalized(retain) {
            if let Some(unit) = &item.unit {
                debug!(kind = ?unit.kind, bytes = unit.size, verdict = ?item.verdict, "unit retired");
            }
            match item.verdict {
                Verdict::Authentic => self.acc.authentic_units += 1,
                Verdict::Unknown => self.acc.unknown_units += 1,
                Verdict::NotAuthentic | Verdict::Error => self.acc.invalid_units += 1,
                Verdict::Missing => self.acc.missing_units += 1,
                Verdict::Ignored => self.acc.ignored_units += 1,
                Verdict::Pending => {}
            }
        }
        self.acc.pending_units = self.window.count_pending();

        let latest = LatestValidation {
            authenticity: outcome,
            public_key_has_changed: std::mem::take(&mut self.key_changed_pending),
            expected_picture_units: expected,
            received_picture_units: received,
            pending_picture_units: pending,
            missing_picture_units: missing,
            picture_unit_surplus: surplus,
            validation,
        };
        Some(AuthenticityReport {
            latest,
            accumulated: self.acc.clone(),
            product_info: self.product_info.clone(),
            vendor_attestation: self.vendor_attestation.clone(),
            this_version: env!("CARGO_PKG_VERSION").to_owned(),
            version_on_signing_side: self.signing_version.clone(),
        })
    }
}

/// Split the linking tail off an observed span when the closure is present.
fn split_tail(
    observed: &[(u64, Digest)],
    tail_seq: Option<u64>,
) -> (&[(u64, Digest)], Option<(u64, Digest)>) {
    match (observed.split_last(), tail_seq) {
        (Some((&(s, d), rest)), Some(t)) if s == t => (rest, Some((s, d))),
        _ => (observed, None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p_unit(id: u8) -> Vec<u8> {
        vec![0x00, 0x00, 0x00, 0x01, 0x41, 0x91, id, 0x03]
    }

    #[test]
    fn empty_input_is_invalid_parameter() {
        let mut v = Validator::new(Codec::H264);
        assert_eq!(v.add_unit(&[]), Err(SessionError::InvalidParameter));
    }

    #[test]
    fn malformed_unit_is_tolerated() {
        let mut v = Validator::new(Codec::H264);
        // Garbage framing: no report, no error.
        let report = v.add_unit(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00]).unwrap();
        assert!(report.is_none());
        assert_eq!(v.accumulated().received_units, 1);
    }

    #[test]
    fn unsigned_stream_reports_not_signed() {
        let mut v = Validator::new(Codec::H264);
        let i = vec![0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x00, 0x01];
        assert!(v.add_unit(&i).unwrap().is_none());
        assert!(v.add_unit(&p_unit(1)).unwrap().is_none());
        assert!(v.add_unit(&p_unit(2)).unwrap().is_none());
        // Second closure: the first group is concluded unsigned.
        let report = v.add_unit(&i).unwrap().unwrap();
        assert_eq!(report.latest.authenticity, Authenticity::NotSigned);
        assert_eq!(report.latest.validation, "PPPP");
        // Third closure: the now-complete middle group goes unknown.
        assert!(v.add_unit(&p_unit(3)).unwrap().is_none());
        let report = v.add_unit(&i).unwrap().unwrap();
        assert_eq!(report.latest.authenticity, Authenticity::NotSigned);
        assert_eq!(report.latest.validation, "UUUPPP");
    }

    #[test]
    fn garbage_manifest_poisons_the_session() {
        let mut v = Validator::new(Codec::H264);
        // A Veristream SEI whose TLV body is truncated garbage.
        let tlv = [0x01u8, 0xFF, 0xFF, 0x00];
        let sei = veristream_proto::build_sei_unit(Codec::H264, &tlv);
        assert!(matches!(v.add_unit(&sei), Err(SessionError::Decoding(_))));
        assert_eq!(v.add_unit(&p_unit(0)), Err(SessionError::NotSupported));
        v.reset();
        assert!(v.add_unit(&p_unit(0)).unwrap().is_none());
    }

    #[test]
    fn reset_preserves_accumulated_counts() {
        let mut v = Validator::new(Codec::H264);
        v.add_unit(&p_unit(0)).unwrap();
        v.add_unit(&p_unit(1)).unwrap();
        v.reset();
        assert_eq!(v.accumulated().received_units, 2);
    }
}
