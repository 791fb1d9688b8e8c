//! The public target word wrapper, `Atomic<T>` (spec.md §4.4, §6). Grounded
//! on the teacher's `atomic.rs::Atomic<T>::load`, generalized from a single
//! RDCSS-aware load to also help through an embedded MwCAS descriptor, per
//! the Read Path the distilled spec calls for.

use crate::descriptor::help;
use crate::rdcss::read_through;
use crate::word::{tagged_word_of, AtomicTaggedWord, TaggedWord, Word};
use std::sync::atomic::Ordering;

/// A word-sized memory location that may be used as a target of an
/// [`MwCasDescriptor`](crate::MwCasDescriptor). `T` must be exactly one
/// word (a raw pointer or a `usize`); see [`Word`] for why no other type
/// is accepted.
#[repr(transparent)]
pub struct Atomic<T: Word> {
    inner: AtomicTaggedWord,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Word> Atomic<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: AtomicTaggedWord::new(tagged_word_of(value)),
            _marker: std::marker::PhantomData,
        }
    }

    /// Reads the current value, helping through any in-flight RDCSS or
    /// MwCAS descriptor found at this location before returning (spec.md
    /// §4.4's Read Path).
    pub fn read(&self) -> T {
        loop {
            let word = read_through(&self.inner);
            if word.is_mwcas() {
                help(word.tid(), word.seq());
                continue;
            }
            debug_assert!(word.is_payload());
            return word.as_payload();
        }
    }

    /// Raw snapshot without helping through an in-flight descriptor;
    /// exposed only for tests that need to observe an intermediate tagged
    /// state.
    #[cfg(test)]
    pub(crate) fn load_raw(&self) -> TaggedWord {
        self.inner.load(Ordering::SeqCst)
    }

    pub(crate) fn raw(&self) -> *const AtomicTaggedWord {
        &self.inner
    }
}

unsafe impl<T: Word> Sync for Atomic<T> {}
unsafe impl<T: Word> Send for Atomic<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_plain_payload() {
        let a = Atomic::new(7usize);
        assert_eq!(a.read(), 7);

        let p = 0x1000usize as *const u8;
        let b = Atomic::new(p);
        assert_eq!(b.read(), p);
    }
}
