//! Typed error surface for the parts of the public API that can fail for
//! reasons a caller should be able to match on (spec.md §6's fallible
//! variants of `add_target`). No direct teacher equivalent — the teacher's
//! own API panics or silently truncates; modeled on `thiserror` the way the
//! rest of the example pack uses it for a small, closed error enum.
//!
//! Duplicate target addresses within one descriptor are deliberately not a
//! variant here: spec.md §7 (D-1) and SPEC_FULL.md treat that case as
//! undefined behavior the core does not detect, so there is nothing for
//! this type to report.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MwCasError {
    #[error("mwcas descriptor already holds {max} targets")]
    CapacityExceeded { max: usize },
}
