//! Thread identity and the lock-free per-thread registry used as the arena
//! for descriptor slots (see `DESIGN.md`, "descriptor identity is not a raw
//! pointer"). Grounded on the teacher's `thread_local.rs` /
//! `thread_local/hashmap.rs`.

mod hashmap;

use hashmap::Uint14HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// A 14-bit thread identifier, assigned once per OS thread and reused for
/// the lifetime of that thread.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub struct ThreadId(u16);

const U14_MAX: u64 = 16383;

thread_local! {
    static THREAD_ID: ThreadId = ThreadId::new();
}

impl ThreadId {
    fn new() -> Self {
        let curr = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        assert!(curr < U14_MAX - 1, "more than 16,000 threads were created");
        ThreadId(curr as u16)
    }

    /// Returns the calling thread's id, assigning one on first use.
    pub fn current() -> Self {
        THREAD_ID.with(|id| *id)
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn from_u16(v: u16) -> Self {
        Self(v)
    }
}

/// A lock-free map keyed by `ThreadId`, used to store one arena slot per
/// thread (an RDCSS slot, or an MwCAS descriptor slot). Slots are inserted
/// once, lazily, and never removed — they live for the life of the
/// process, which is what lets descriptor identity be an arena index rather
/// than a pointer that needs reclaiming.
pub struct ThreadRegistry<V> {
    map: Uint14HashMap<V>,
}

impl<V> ThreadRegistry<V>
where
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            map: Uint14HashMap::new(),
        }
    }

    /// Returns the calling thread's slot, inserting a fresh one via `f` if
    /// this is the first call from this thread.
    pub fn get_or_insert_with<F>(&self, f: F) -> (ThreadId, &V)
    where
        F: FnOnce() -> V,
    {
        let id = ThreadId::current();
        match self.map.get(id.0) {
            Some(v) => (id, v),
            None => {
                tracing::trace!(tid = id.0, "publishing fresh descriptor slot");
                (id, self.map.insert(id.0, f()))
            }
        }
    }

    /// Looks up another thread's slot. Returns `None` only if that thread
    /// has never published a descriptor, which cannot happen for a
    /// `ThreadId` read out of a `TaggedWord` someone else installed.
    pub fn get_for_thread(&self, thread_id: ThreadId) -> Option<&V> {
        self.map.get(thread_id.0)
    }
}

impl<V: Send + Sync + 'static> Default for ThreadRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn distinct_threads_get_distinct_slots() {
        let registry = Arc::new(ThreadRegistry::<u64>::new());
        let h1 = {
            let registry = registry.clone();
            thread::spawn(move || {
                let (_, slot) = registry.get_or_insert_with(|| 1);
                *slot
            })
        };
        let h2 = {
            let registry = registry.clone();
            thread::spawn(move || {
                let (_, slot) = registry.get_or_insert_with(|| 2);
                *slot
            })
        };
        assert_eq!(h1.join().unwrap(), 1);
        assert_eq!(h2.join().unwrap(), 2);
    }
}
