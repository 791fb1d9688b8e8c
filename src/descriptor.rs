//! The MwCAS descriptor itself: a staged list of target words, and the
//! three-phase commit protocol (Embed / Decide / Finalize) that applies
//! them all atomically (spec.md §4.1, §4.4). Grounded on the teacher's
//! `mwcas.rs` (`CasNDescriptor::make_descriptor`/`help`), with a
//! correctness fix to the Phase-1 embed loop — see the note on
//! `embed_one` below and `DESIGN.md`.

use crate::id::{ThreadId, ThreadRegistry};
use crate::rdcss::{rdcss, read_through};
use crate::seq::{SeqNumber, SeqNumberGenerator};
use crate::status::{AtomicDescriptorStatus, DescriptorStatus, Status};
use crate::word::{tagged_word_of, AtomicTaggedWord, TaggedWord, Word};
use arrayvec::ArrayVec;
use once_cell::sync::Lazy;
use std::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};

use crate::config::MAX_TARGETS;
use crate::error::MwCasError;

static MWCAS_SLOTS: Lazy<ThreadRegistry<MwCasSlot>> = Lazy::new(ThreadRegistry::new);

#[derive(Clone, Copy)]
struct TargetEntry {
    addr: *const AtomicTaggedWord,
    old: TaggedWord,
    new: TaggedWord,
}

// SAFETY: `addr` always points at an `AtomicTaggedWord` the caller's
// `Atomic<T>` owns for at least as long as the commit is in flight; the
// entry is only ever read back through a `MwCasSlot` that another thread
// reached via a live `TaggedWord`, which cannot outlive the commit.
unsafe impl Send for TargetEntry {}
unsafe impl Sync for TargetEntry {}

/// One slot of a published target list, stored field-by-field in plain
/// atomics so publishing and snapshotting never block a reader behind an
/// OS lock (spec.md §5: "no operation blocks on a lock"). Mirrors
/// `RdcssSlot`'s own already-atomic fields one file over.
struct AtomicEntry {
    addr: AtomicPtr<AtomicTaggedWord>,
    old: AtomicUsize,
    new: AtomicUsize,
}

impl AtomicEntry {
    fn empty() -> Self {
        Self {
            addr: AtomicPtr::default(),
            old: AtomicUsize::new(0),
            new: AtomicUsize::new(0),
        }
    }

    fn store(&self, entry: &TargetEntry) {
        self.addr.store(entry.addr as *mut _, Ordering::SeqCst);
        self.old.store(entry.old.into_usize(), Ordering::SeqCst);
        self.new.store(entry.new.into_usize(), Ordering::SeqCst);
    }

    fn load(&self) -> TargetEntry {
        TargetEntry {
            addr: self.addr.load(Ordering::SeqCst),
            old: TaggedWord::from_usize(self.old.load(Ordering::SeqCst)),
            new: TaggedWord::from_usize(self.new.load(Ordering::SeqCst)),
        }
    }
}

/// One thread's reusable MwCAS descriptor storage (the arena slot that
/// `TaggedWord::from_mwcas_ptr` indexes into). Mirrors `RdcssSlot` one
/// layer up: publishing bumps `seq` to invalidate, stores the new target
/// list and a fresh `Undecided` status, then bumps `seq` again to
/// finalize; snapshotting validates `seq` both before and after copying
/// the fields out, since this slot is reused by the owner's *next* commit
/// the moment this one is decided.
struct MwCasSlot {
    status: AtomicDescriptorStatus,
    len: AtomicUsize,
    entries: [AtomicEntry; MAX_TARGETS],
    seq: SeqNumberGenerator,
}

impl MwCasSlot {
    fn new() -> Self {
        Self {
            status: AtomicDescriptorStatus::new(),
            len: AtomicUsize::new(0),
            entries: std::array::from_fn(|_| AtomicEntry::empty()),
            seq: SeqNumberGenerator::new(),
        }
    }

    fn publish(&self, entries: ArrayVec<TargetEntry, MAX_TARGETS>) -> SeqNumber {
        // Invalidate before touching a single field, so a helper holding
        // the previous seq never observes a mix of this slot's old and
        // new contents.
        self.seq.inc(Ordering::SeqCst);
        fence(Ordering::Release);

        for (slot, entry) in self.entries.iter().zip(entries.iter()) {
            slot.store(entry);
        }
        self.len.store(entries.len(), Ordering::SeqCst);

        let seq = self.seq.inc(Ordering::SeqCst);
        self.status.store(DescriptorStatus::undecided(seq), Ordering::SeqCst);
        tracing::trace!(seq = seq.as_usize(), len = entries.len(), "published mwcas descriptor slot");
        seq
    }

    /// Copies out the target list published under `seq`, re-validating
    /// that `seq` is still current both before and after the copy (the
    /// same before/after discipline `RdcssSlot::try_snapshot` uses).
    /// Returns `Err(())` if the slot has since been republished for a
    /// different commit.
    fn try_snapshot(&self, seq: SeqNumber) -> Result<ArrayVec<TargetEntry, MAX_TARGETS>, ()> {
        if self.seq.current(Ordering::SeqCst) != seq {
            return Err(());
        }
        let len = self.len.load(Ordering::SeqCst);
        let mut entries = ArrayVec::new();
        for slot in self.entries.iter().take(len) {
            entries.push(slot.load());
        }
        fence(Ordering::Acquire);
        if self.seq.current(Ordering::SeqCst) != seq {
            Err(())
        } else {
            Ok(entries)
        }
    }
}

/// A builder for a single multi-word compare-and-swap. Stage up to
/// `MAX_TARGETS` `(addr, old, new)` triples with [`add_target`], then call
/// [`commit`] to attempt them all atomically.
///
/// Not `Send`/`Sync` and not reusable across commit attempts: a fresh
/// `MwCasDescriptor` is the intended per-call API (spec.md §6).
pub struct MwCasDescriptor {
    entries: ArrayVec<TargetEntry, MAX_TARGETS>,
}

impl MwCasDescriptor {
    pub fn new() -> Self {
        Self {
            entries: ArrayVec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Stages a target word. Returns `false` without modifying the
    /// descriptor if `MAX_TARGETS` entries are already staged.
    ///
    /// Staging the same address twice in one descriptor is not checked
    /// (spec.md §7, invariant D-1: undefined behavior, not detected by the
    /// core) — prefer [`try_add_target`] for the same operation reported
    /// as a [`MwCasError`] instead of a bare bool.
    pub fn add_target<T: Word>(&mut self, addr: &crate::atomic::Atomic<T>, old: T, new: T) -> bool {
        self.try_add_target(addr, old, new).is_ok()
    }

    pub fn try_add_target<T: Word>(
        &mut self,
        addr: &crate::atomic::Atomic<T>,
        old: T,
        new: T,
    ) -> Result<(), MwCasError> {
        if self.entries.is_full() {
            return Err(MwCasError::CapacityExceeded { max: MAX_TARGETS });
        }
        self.entries.push(TargetEntry {
            addr: addr.raw(),
            old: tagged_word_of(old),
            new: tagged_word_of(new),
        });
        Ok(())
    }

    /// Attempts to apply every staged target atomically. Returns `true` if
    /// every target matched its expected old value and was updated;
    /// `false` if any target's current value did not match (no targets are
    /// changed in that case).
    pub fn commit(self) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let (tid, slot) = MWCAS_SLOTS.get_or_insert_with(MwCasSlot::new);
        let seq = slot.publish(self.entries);
        help(tid, seq) == Status::Successful
    }
}

impl Default for MwCasDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the descriptor identified by `(tid, seq)` to completion and
/// returns its final status. Safe to call from any thread, including one
/// that is not the descriptor's owner — this is the helping mechanism
/// that gives the algorithm its lock-freedom.
///
/// Reads `status` once up front: if it is already decided for `seq`
/// (some other helper got there first), this call skips straight to
/// Phase 3 over the snapshotted entries instead of re-running Phase 1/2.
pub(crate) fn help(tid: ThreadId, seq: SeqNumber) -> Status {
    let slot = MWCAS_SLOTS
        .get_for_thread(tid)
        .expect("descriptor id read out of a live TaggedWord must have a published slot");

    let entries = match slot.try_snapshot(seq) {
        Ok(entries) => entries,
        // The slot has already moved on to a different commit; whoever
        // owned `seq` is necessarily decided by now.
        Err(()) => return slot.status.load(Ordering::SeqCst).status(),
    };

    let desc_ptr = TaggedWord::from_mwcas_ptr(tid, seq);

    let initial = slot.status.load(Ordering::Acquire);
    let status = if initial.seq() == seq && initial.status() != Status::Undecided {
        tracing::trace!(seq = seq.as_usize(), "mwcas already decided, skipping to finalize");
        initial.status()
    } else {
        // Phase 1: Embed. Install `desc_ptr` into every target, gated on
        // our own status still being `Undecided`.
        tracing::trace!(seq = seq.as_usize(), "mwcas phase 1: embed");
        let mut outcome = Status::Successful;
        let mut already_decided = None;
        'embed: for entry in entries.iter() {
            loop {
                match embed_one(slot, seq, desc_ptr, entry) {
                    EmbedOutcome::Embedded => continue 'embed,
                    EmbedOutcome::Retry => continue,
                    EmbedOutcome::Mismatch => {
                        outcome = Status::Failed;
                        break 'embed;
                    }
                    EmbedOutcome::AlreadyDecided(status) => {
                        already_decided = Some(status);
                        break 'embed;
                    }
                }
            }
        }

        match already_decided {
            Some(status) => status,
            None => {
                // Phase 2: Decide. Whichever thread's CAS wins determines
                // the descriptor's fate; a thread that loses simply reads
                // the winner's decision back out.
                tracing::trace!(seq = seq.as_usize(), ?outcome, "mwcas phase 2: decide");
                let undecided = DescriptorStatus::undecided(seq);
                let decided = DescriptorStatus::decided(seq, outcome);
                match slot.status.compare_exchange(undecided, decided) {
                    Ok(_) => outcome,
                    Err(raced) => raced.status(),
                }
            }
        }
    };

    // Phase 3: Finalize. Replace each embedded descriptor pointer with the
    // target's final value (new on success, old on failure). Idempotent,
    // so every helper does this unconditionally.
    tracing::trace!(seq = seq.as_usize(), ?status, "mwcas phase 3: finalize");
    for entry in entries.iter() {
        let final_value = if status == Status::Successful {
            entry.new
        } else {
            entry.old
        };
        // SAFETY: see `TargetEntry`'s comment — the referent outlives any
        // thread that can reach this entry via `desc_ptr`.
        let target = unsafe { &*entry.addr };
        let _ = target.compare_exchange(desc_ptr, final_value, Ordering::AcqRel, Ordering::Acquire);
    }

    status
}

enum EmbedOutcome {
    Embedded,
    Retry,
    Mismatch,
    AlreadyDecided(Status),
}

/// Installs `desc_ptr` into `entry.addr` via RDCSS, gated on our own
/// status still being `Undecided` (so a concurrent Phase-2 decision
/// immediately voids the install).
///
/// The teacher's `CasNDescriptor::help` special-cases which table index a
/// *helper* starts scanning from (`if help_other {1} else {0}`), assuming
/// a helper only ever discovers a foreign descriptor sitting at index 0.
/// That assumption does not hold once a descriptor can be helped
/// recursively (a helper's own embed loop can itself be helped by a third
/// thread at any index), and its fallback branch conflates "this slot
/// already holds our own descriptor pointer" with failure. This version
/// instead inspects what's actually at `entry.addr` and reacts to exactly
/// one of three cases, which is correct regardless of how many threads are
/// helping or at what index they join in:
fn embed_one(
    slot: &MwCasSlot,
    seq: SeqNumber,
    desc_ptr: TaggedWord,
    entry: &TargetEntry,
) -> EmbedOutcome {
    // SAFETY: see `TargetEntry`'s comment.
    let target = unsafe { &*entry.addr };
    let undecided = DescriptorStatus::undecided(seq);

    let current = read_through(target);
    if current == desc_ptr {
        // Already embedded, by us or by a helper that got here first.
        return EmbedOutcome::Embedded;
    }
    if current.is_mwcas() {
        // A foreign MwCAS descriptor occupies this slot; help it to
        // completion, then retry our own install against whatever it
        // leaves behind.
        help(current.tid(), current.seq());
        return EmbedOutcome::Retry;
    }
    if current != entry.old {
        // Plain payload, but not the one we expect: someone else's
        // committed write got here first.
        return EmbedOutcome::Mismatch;
    }

    let installed = rdcss(&slot.status, undecided, target, entry.old, desc_ptr);
    if installed == entry.old {
        EmbedOutcome::Embedded
    } else if installed.is_mwcas() {
        help(installed.tid(), installed.seq());
        EmbedOutcome::Retry
    } else if installed == desc_ptr {
        EmbedOutcome::Embedded
    } else {
        // `rdcss` can also fail because our own status CAS-gate
        // (`control_expected == undecided`) no longer held — meaning a
        // concurrent helper already decided this descriptor.
        let now = slot.status.load(Ordering::Acquire);
        if now.seq() == seq && now.status() != Status::Undecided {
            EmbedOutcome::AlreadyDecided(now.status())
        } else {
            EmbedOutcome::Mismatch
        }
    }
}
