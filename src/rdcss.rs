//! RDCSS: the restricted double-compare single-swap used to splice an
//! MwCAS descriptor pointer onto a target word atomically with respect to
//! that MwCAS descriptor's status word (spec.md §4.2). Grounded on the
//! teacher's `rdcss.rs` (`RDCSSDescriptor::rdcss`/`rdcss_help`), cross
//! checked against `original_source/src/rdcss_descriptor.hpp`'s
//! `RDCSS()`/`Complete()` for the read-through/linearization discipline
//! the distilled spec leaves implicit.

use crate::id::{ThreadId, ThreadRegistry};
use crate::retry::Retry;
use crate::seq::{SeqNumber, SeqNumberGenerator};
use crate::status::{AtomicDescriptorStatus, DescriptorStatus};
use crate::word::{AtomicTaggedWord, TaggedWord};
use once_cell::sync::Lazy;
use std::sync::atomic::{fence, Ordering};

static RDCSS_SLOTS: Lazy<ThreadRegistry<RdcssSlot>> = Lazy::new(ThreadRegistry::new);

/// One thread's reusable RDCSS descriptor storage. Publishing a new RDCSS
/// operation bumps `seq` twice (invalidate, then finalize) around storing
/// the fields, exactly as a published MwCAS slot does (see
/// `descriptor.rs`) — this is the same arena-index trick applied one layer
/// down.
struct RdcssSlot {
    // Addresses are stored as raw pointers rather than borrowed references
    // because their lifetime is the caller's MwCAS commit, which always
    // outlives any helper that can observe this slot (the helper only
    // reaches here through a `TaggedWord` the owning thread is still
    // actively publishing).
    control_addr: std::sync::atomic::AtomicPtr<AtomicDescriptorStatus>,
    control_expected: std::sync::atomic::AtomicUsize,
    target_addr: std::sync::atomic::AtomicPtr<AtomicTaggedWord>,
    target_expected: std::sync::atomic::AtomicUsize,
    target_new: std::sync::atomic::AtomicUsize,
    seq: SeqNumberGenerator,
}

struct RdcssSnapshot {
    control_addr: *const AtomicDescriptorStatus,
    control_expected: DescriptorStatus,
    target_addr: *const AtomicTaggedWord,
    target_expected: TaggedWord,
    target_new: TaggedWord,
}

// SAFETY: the raw pointers stored are always derived from `&AtomicXxx`
// references whose referents outlive every thread that might read this
// slot (see the field comment above); the slot itself never moves once
// allocated into `RDCSS_SLOTS`.
unsafe impl Send for RdcssSlot {}
unsafe impl Sync for RdcssSlot {}

impl RdcssSlot {
    fn new() -> Self {
        Self {
            control_addr: std::sync::atomic::AtomicPtr::default(),
            control_expected: std::sync::atomic::AtomicUsize::new(0),
            target_addr: std::sync::atomic::AtomicPtr::default(),
            target_expected: std::sync::atomic::AtomicUsize::new(0),
            target_new: std::sync::atomic::AtomicUsize::new(0),
            seq: SeqNumberGenerator::new(),
        }
    }

    fn publish(
        &self,
        control_addr: &AtomicDescriptorStatus,
        control_expected: DescriptorStatus,
        target_addr: &AtomicTaggedWord,
        target_expected: TaggedWord,
        target_new: TaggedWord,
    ) -> SeqNumber {
        // Invalidate whatever the previous occupant of this slot was
        // before mutating its fields, so an in-flight helper never reads a
        // half-updated mix of old and new fields under a seq number it
        // thinks is still current.
        self.seq.inc(Ordering::SeqCst);
        fence(Ordering::Release);

        self.control_addr
            .store(control_addr as *const _ as *mut _, Ordering::SeqCst);
        self.control_expected
            .store(control_expected_bits(control_expected), Ordering::SeqCst);
        self.target_addr
            .store(target_addr as *const _ as *mut _, Ordering::SeqCst);
        self.target_expected
            .store(target_expected.into_usize(), Ordering::SeqCst);
        self.target_new
            .store(target_new.into_usize(), Ordering::SeqCst);

        self.seq.inc(Ordering::SeqCst)
    }

    fn try_snapshot(&self, seq: SeqNumber) -> Result<RdcssSnapshot, ()> {
        if self.seq.current(Ordering::SeqCst) != seq {
            return Err(());
        }
        let snapshot = RdcssSnapshot {
            control_addr: self.control_addr.load(Ordering::SeqCst),
            control_expected: control_expected_from_bits(self.control_expected.load(Ordering::SeqCst)),
            target_addr: self.target_addr.load(Ordering::SeqCst),
            target_expected: TaggedWord::from_usize(self.target_expected.load(Ordering::SeqCst)),
            target_new: TaggedWord::from_usize(self.target_new.load(Ordering::SeqCst)),
        };
        fence(Ordering::Acquire);
        if self.seq.current(Ordering::SeqCst) != seq {
            Err(())
        } else {
            Ok(snapshot)
        }
    }
}

// `DescriptorStatus` has no public bit-accessor; these two helpers live
// here instead of on `status.rs` because RDCSS is the only place a status
// value needs to cross the raw-`usize` boundary of a per-thread slot.
fn control_expected_bits(s: DescriptorStatus) -> usize {
    // `DescriptorStatus` is `Copy` and its representation is a
    // transparent `usize`; transmute avoids exposing a public bit
    // accessor purely for this internal plumbing.
    unsafe { std::mem::transmute::<DescriptorStatus, usize>(s) }
}

fn control_expected_from_bits(bits: usize) -> DescriptorStatus {
    unsafe { std::mem::transmute::<usize, DescriptorStatus>(bits) }
}

/// Attempts "if `*control_addr == control_expected` then CAS `*target_addr`
/// from `target_expected` to `target_new`, else leave `*target_addr`
/// unchanged." Returns the value that was in `*target_addr` immediately
/// before the linearization point: a plain payload, or a foreign
/// MwCAS-tagged word — never an RDCSS-tagged word (spec.md §4.2).
pub(crate) fn rdcss(
    control_addr: &AtomicDescriptorStatus,
    control_expected: DescriptorStatus,
    target_addr: &AtomicTaggedWord,
    target_expected: TaggedWord,
    target_new: TaggedWord,
) -> TaggedWord {
    let (tid, slot) = RDCSS_SLOTS.get_or_insert_with(RdcssSlot::new);
    let seq = slot.publish(
        control_addr,
        control_expected,
        target_addr,
        target_expected,
        target_new,
    );
    let desc_ptr = TaggedWord::from_rdcss_ptr(tid, seq);

    let mut retry = Retry::new();
    loop {
        match target_addr.compare_exchange_weak(
            target_expected,
            desc_ptr,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                help_complete(desc_ptr);
                return target_expected;
            }
            Err(current) if current == target_expected => {
                // Spurious weak-CAS failure; the value is unchanged.
                retry.spin();
            }
            Err(current) if current.is_rdcss() => {
                tracing::trace!(?current, "rdcss install found foreign rdcss, helping");
                help_complete(current);
                retry.spin();
            }
            Err(current) => return current,
        }
    }
}

/// Idempotent completion: safe to call from any thread that observes an
/// RDCSS-tagged word pointing at `desc_ptr`.
pub(crate) fn help_complete(desc_ptr: TaggedWord) {
    debug_assert!(desc_ptr.is_rdcss());
    let tid: ThreadId = desc_ptr.tid();
    let slot = match RDCSS_SLOTS.get_for_thread(tid) {
        Some(slot) => slot,
        // No thread has ever published an RDCSS slot for this id — cannot
        // happen for an id read out of a live descriptor pointer.
        None => return,
    };
    let snapshot = match slot.try_snapshot(desc_ptr.seq()) {
        Ok(snapshot) => snapshot,
        // The slot has already been reused or completed by someone else.
        Err(()) => return,
    };

    // SAFETY: see `RdcssSlot`'s field comment — the referents outlive
    // every thread that can observe `desc_ptr`.
    let control = unsafe { &*snapshot.control_addr };
    let target = unsafe { &*snapshot.target_addr };

    let observed = control.load(Ordering::Acquire);
    let replacement = if observed == snapshot.control_expected {
        snapshot.target_new
    } else {
        snapshot.target_expected
    };
    let _ = target.compare_exchange(desc_ptr, replacement, Ordering::AcqRel, Ordering::Acquire);
}

/// Reads through an RDCSS-tagged word, helping until a non-RDCSS word is
/// observed (spec.md §4.4 step 2). The result may still be MwCAS-tagged;
/// callers that need a plain payload must additionally help through that.
pub(crate) fn read_through(addr: &AtomicTaggedWord) -> TaggedWord {
    let mut retry = Retry::new();
    loop {
        let word = addr.load(Ordering::SeqCst);
        if word.is_rdcss() {
            help_complete(word);
            retry.spin();
            continue;
        }
        return word;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use crate::word::tagged_word_of;

    #[test]
    fn commits_when_control_matches() {
        let status = AtomicDescriptorStatus::new();
        let seq = crate::seq::SeqNumber::from_usize(1);
        let undecided = DescriptorStatus::undecided(seq);
        status.store(undecided, Ordering::SeqCst);

        let target = AtomicTaggedWord::new(tagged_word_of(10usize));
        let new = tagged_word_of(20usize);

        let prev = rdcss(&status, undecided, &target, tagged_word_of(10usize), new);
        assert_eq!(prev.as_payload::<usize>(), 10);
        assert_eq!(target.load(Ordering::SeqCst), new);
    }

    #[test]
    fn leaves_target_when_control_has_moved() {
        let status = AtomicDescriptorStatus::new();
        let seq = crate::seq::SeqNumber::from_usize(1);
        let undecided = DescriptorStatus::undecided(seq);
        status.store(undecided.with_status(Status::Failed), Ordering::SeqCst);

        let target = AtomicTaggedWord::new(tagged_word_of(10usize));
        let old = tagged_word_of(10usize);
        let new = tagged_word_of(20usize);

        let prev = rdcss(&status, undecided, &target, old, new);
        assert_eq!(prev.as_payload::<usize>(), 10);
        // control no longer matched `undecided`, so target reverts to old.
        assert_eq!(target.load(Ordering::SeqCst), old);
    }

    #[test]
    fn fails_when_target_has_already_moved() {
        let status = AtomicDescriptorStatus::new();
        let seq = crate::seq::SeqNumber::from_usize(1);
        let undecided = DescriptorStatus::undecided(seq);
        status.store(undecided, Ordering::SeqCst);

        let target = AtomicTaggedWord::new(tagged_word_of(99usize));
        let old = tagged_word_of(10usize);
        let new = tagged_word_of(20usize);

        let prev = rdcss(&status, undecided, &target, old, new);
        assert_eq!(prev.as_payload::<usize>(), 99);
        assert_eq!(target.load(Ordering::SeqCst).as_payload::<usize>(), 99);
    }
}
