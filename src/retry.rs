//! The bounded-spin-then-short-sleep retry discipline spec.md §4.3 asks
//! for: "Every CAS in the core is performed as a loop around a weak-CAS
//! primitive that retries only on spurious failure... A `RETRY_BOUND`
//! caps inner spin attempts before yielding by a short sleep." Grounded on
//! the teacher's use of `crossbeam_utils::Backoff` in `mwcas.rs`'s embed
//! loop, extended with the explicit sleep fallback spec.md names.

use crate::config::{RETRY_BOUND, SHORT_SLEEP_MICROS};
use crossbeam_utils::Backoff;
use std::time::Duration;

pub(crate) struct Retry {
    backoff: Backoff,
    spins: u32,
}

impl Retry {
    pub(crate) fn new() -> Self {
        Self {
            backoff: Backoff::new(),
            spins: 0,
        }
    }

    /// Advances the retry loop by one step: a cheap spin while under
    /// `RETRY_BOUND`, otherwise a short sleep.
    pub(crate) fn spin(&mut self) {
        if self.spins >= RETRY_BOUND {
            tracing::debug!(bound = RETRY_BOUND, "retry bound exceeded, sleeping");
            std::thread::sleep(Duration::from_micros(SHORT_SLEEP_MICROS));
            self.spins = 0;
            self.backoff.reset();
        } else {
            self.backoff.spin();
            self.spins += 1;
        }
    }
}
