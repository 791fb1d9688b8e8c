//! A lock-free, insert-only, two-level trie keyed by a 14-bit integer.
//! Entries are never removed, matching `ThreadRegistry`'s never-freed
//! arena-slot lifecycle. Grounded on the teacher's
//! `thread_local/hashmap.rs`, kept essentially verbatim.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicPtr, Ordering};

enum ArrayOrKV<V> {
    Array([AtomicPtr<ArrayOrKV<V>>; 64]),
    KV { key: u16, val: V },
}

pub struct Uint14HashMap<V> {
    array: [AtomicPtr<ArrayOrKV<V>>; 256],
}

impl<V> Uint14HashMap<V>
where
    V: 'static + Send,
{
    pub fn new() -> Self {
        let mut data: [MaybeUninit<AtomicPtr<ArrayOrKV<V>>>; 256] =
            unsafe { MaybeUninit::uninit().assume_init() };
        for elem in &mut data[..] {
            *elem = MaybeUninit::new(AtomicPtr::default());
        }
        let data = unsafe { std::mem::transmute::<_, [AtomicPtr<ArrayOrKV<V>>; 256]>(data) };
        Self { array: data }
    }

    /// Inserts `val` under `key` if absent, returning a reference to
    /// whichever value ends up stored (the caller's, or a concurrent
    /// winner's).
    pub fn insert(&self, key: u16, val: V) -> &V
    where
        V: Sync,
    {
        let idx = fst_lvl_idx(key);
        let mut atom_ptr = &self.array[idx];
        let to_insert = Box::into_raw(Box::new(ArrayOrKV::KV { key, val }));
        loop {
            let ptr: *mut ArrayOrKV<V> = atom_ptr.load(Ordering::SeqCst);
            unsafe {
                if ptr.is_null() {
                    match atom_ptr.compare_exchange(
                        ptr,
                        to_insert,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => return (*to_insert).as_kv().1,
                        Err(_) => continue,
                    }
                }
                match &*ptr {
                    ArrayOrKV::KV { key: curr_key, .. } if *curr_key == key => {
                        drop(Box::from_raw(to_insert));
                        return (*ptr).as_kv().1;
                    }
                    ArrayOrKV::KV { .. } => {
                        atom_ptr = expand_at(atom_ptr, ptr);
                    }
                    ArrayOrKV::Array(array) => {
                        atom_ptr = &array[scd_lvl_idx(key)];
                    }
                }
            }
        }
    }

    pub fn get(&self, key: u16) -> Option<&V>
    where
        V: Sync,
    {
        let idx = fst_lvl_idx(key);
        let mut atom_ptr = &self.array[idx];
        loop {
            let ptr: *mut ArrayOrKV<V> = atom_ptr.load(Ordering::SeqCst);
            unsafe {
                if ptr.is_null() {
                    return None;
                }
                match &*ptr {
                    ArrayOrKV::KV { key: curr_key, val } => {
                        return if *curr_key == key { Some(val) } else { None };
                    }
                    ArrayOrKV::Array(array) => {
                        atom_ptr = &array[scd_lvl_idx(key)];
                    }
                }
            }
        }
    }
}

impl<V> ArrayOrKV<V> {
    fn as_kv(&self) -> (&u16, &V) {
        match self {
            ArrayOrKV::KV { key, val } => (key, val),
            ArrayOrKV::Array(_) => unreachable!("as_kv on an inner trie node"),
        }
    }
}

/// Replaces a one-level `KV` leaf that collided on its first-level bucket
/// with a second-level `Array` node, re-hanging the displaced leaf at its
/// second-level slot. Returns the (now installed) second-level array so the
/// caller can retry its insert into it.
fn expand_at<'a, V>(
    at: &'a AtomicPtr<ArrayOrKV<V>>,
    curr: *mut ArrayOrKV<V>,
) -> &'a AtomicPtr<ArrayOrKV<V>> {
    unsafe {
        let mut new_lvl: [MaybeUninit<AtomicPtr<ArrayOrKV<V>>>; 64] =
            MaybeUninit::uninit().assume_init();
        for elem in &mut new_lvl[..] {
            *elem = MaybeUninit::new(AtomicPtr::default());
        }
        let new_lvl = std::mem::transmute::<_, [AtomicPtr<ArrayOrKV<V>>; 64]>(new_lvl);

        let displaced_key = match &*curr {
            ArrayOrKV::KV { key, .. } => *key,
            ArrayOrKV::Array(_) => unreachable!("expand_at on an inner trie node"),
        };
        new_lvl[scd_lvl_idx(displaced_key)].store(curr, Ordering::SeqCst);

        let new_lvl_ptr = Box::into_raw(Box::new(ArrayOrKV::Array(new_lvl)));
        match at.compare_exchange(curr, new_lvl_ptr, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {}
            Err(_) => {
                // Someone else already expanded this bucket; drop our
                // redundant array (the displaced leaf is still reachable
                // through whichever array won).
                drop(Box::from_raw(new_lvl_ptr));
            }
        }
    }
    at
}

fn fst_lvl_idx(key: u16) -> usize {
    (key & ((1 << 8) - 1)) as usize
}

fn scd_lvl_idx(key: u16) -> usize {
    ((key >> 8) & ((1 << 6) - 1)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let m = Uint14HashMap::new();
        for key in 0..10_000u16 {
            m.insert(key, key);
            assert_eq!(m.get(key), Some(&key));
        }
    }

    #[test]
    fn duplicate_insert_keeps_first_value() {
        let m = Uint14HashMap::new();
        m.insert(7, "first");
        let v = m.insert(7, "second");
        assert_eq!(*v, "first");
        assert_eq!(m.get(7), Some(&"first"));
    }
}
