//! A lock-free multi-word compare-and-swap (MwCAS) primitive built on top
//! of RDCSS (restricted double-compare single-swap), after Harris, Fraser
//! and Pratt's two-layer descriptor construction.
//!
//! ```
//! use mwcas::{Atomic, MwCasDescriptor};
//!
//! let a = Atomic::new(1usize);
//! let b = Atomic::new(2usize);
//!
//! let mut desc = MwCasDescriptor::new();
//! assert!(desc.add_target(&a, 1usize, 10usize));
//! assert!(desc.add_target(&b, 2usize, 20usize));
//! assert!(desc.commit());
//!
//! assert_eq!(a.read(), 10);
//! assert_eq!(b.read(), 20);
//! ```

#![cfg(target_pointer_width = "64")]

mod atomic;
mod config;
mod descriptor;
mod error;
mod id;
pub(crate) mod rdcss;
mod reclaim;
mod retry;
mod seq;
mod status;
mod word;

pub use atomic::Atomic;
pub use descriptor::MwCasDescriptor;
pub use error::MwCasError;
pub use reclaim::{after_commit, pin, Guard};
pub use word::Word;

/// Reads `addr`'s current value, helping through any in-flight descriptor
/// found there first. Equivalent to `addr.read()`; provided as a free
/// function because the external interface table in spec.md names it as
/// one (`read<T: Word>(addr: &Atomic<T>) -> T`).
pub fn read<T: Word>(addr: &Atomic<T>) -> T {
    addr.read()
}
