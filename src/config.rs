//! Build-time configuration constants (spec.md §6).

/// Maximum number of targets a single `MwCasDescriptor` may register.
/// Sizes the `arrayvec::ArrayVec` backing both a descriptor's staged
/// entries and a published slot's snapshot.
pub const MAX_TARGETS: usize = 4;

/// Bounded-spin count before a helper falls back to a short sleep, used by
/// the Read Path and the RDCSS/MwCAS embed loops to avoid pathological
/// busy-wait under contention (spec.md §4.3 "Retry discipline").
pub const RETRY_BOUND: u32 = 10;

/// Sleep length after `RETRY_BOUND` failed spins.
pub const SHORT_SLEEP_MICROS: u64 = 10;

/// Where the two reserved tag bits sit in a `TaggedWord`. This crate fixes
/// `Low` library-wide (see `DESIGN.md`); the enum exists to document the
/// choice spec.md's §6 configuration table calls for, not to offer a
/// runtime or even a compile-time alternative.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TagPosition {
    Low,
    High,
}

pub const TAG_POSITION: TagPosition = TagPosition::Low;
