//! The packed `(SeqNumber, Status)` word shared by RDCSS and MwCAS
//! descriptor slots. Packing the slot's sequence number alongside its
//! status lets a single CAS both decide the operation and guard against a
//! helper acting on a slot that has since been reused for a different
//! operation. Grounded on the teacher's `CasNDescriptorStatus` /
//! `Cas2DescriptorStatus` (near-duplicate iterations; the `ArrayVec`-based
//! `CasNDescriptorStatus` was picked as canonical, see `DESIGN.md`).

use crate::seq::SeqNumber;
use std::sync::atomic::{AtomicUsize, Ordering};

const STATUS_BITS: usize = 8;
const STATUS_MASK: usize = (1 << STATUS_BITS) - 1;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(usize)]
pub enum Status {
    Undecided = 0,
    Successful = 1,
    Failed = 2,
}

/// `{SeqNumber, Status}` packed into one word: the high bits hold the
/// sequence number under which this status was published, the low
/// `STATUS_BITS` hold the `Status`.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct DescriptorStatus(usize);

impl DescriptorStatus {
    pub fn undecided(seq: SeqNumber) -> Self {
        Self((seq.as_usize() << STATUS_BITS) | Status::Undecided as usize)
    }

    pub fn decided(seq: SeqNumber, status: Status) -> Self {
        debug_assert_ne!(status, Status::Undecided);
        Self((seq.as_usize() << STATUS_BITS) | status as usize)
    }

    pub fn with_status(self, status: Status) -> Self {
        Self::decided(self.seq(), status)
    }

    pub fn seq(self) -> SeqNumber {
        SeqNumber::from_usize(self.0 >> STATUS_BITS)
    }

    pub fn status(self) -> Status {
        match self.0 & STATUS_MASK {
            0 => Status::Undecided,
            1 => Status::Successful,
            2 => Status::Failed,
            other => unreachable!("invalid packed status {other}"),
        }
    }

    fn from_usize(raw: usize) -> Self {
        Self(raw)
    }

    fn into_usize(self) -> usize {
        self.0
    }
}

pub struct AtomicDescriptorStatus(AtomicUsize);

impl AtomicDescriptorStatus {
    pub fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn load(&self, ordering: Ordering) -> DescriptorStatus {
        DescriptorStatus::from_usize(self.0.load(ordering))
    }

    pub fn store(&self, status: DescriptorStatus, ordering: Ordering) {
        self.0.store(status.into_usize(), ordering);
    }

    /// Per spec.md: "the Phase-2 status CAS is at least `acq_rel`."
    pub fn compare_exchange(
        &self,
        expected: DescriptorStatus,
        new: DescriptorStatus,
    ) -> Result<DescriptorStatus, DescriptorStatus> {
        self.0
            .compare_exchange(expected.into_usize(), new.into_usize(), Ordering::AcqRel, Ordering::Acquire)
            .map(DescriptorStatus::from_usize)
            .map_err(DescriptorStatus::from_usize)
    }
}

impl Default for AtomicDescriptorStatus {
    fn default() -> Self {
        Self::new()
    }
}
