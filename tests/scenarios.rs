//! Integration scenarios S-1, S-2, S-3 and S-6 (spec.md §8), exercised
//! only through the public API. S-4 and S-5 require pausing a commit
//! mid-phase, which has no public hook — those live as white-box unit
//! tests next to the commit protocol itself (`src/descriptor.rs`).

use mwcas::{Atomic, MwCasDescriptor, MwCasError};
use std::sync::Arc;

/// S-1 (single-thread success): initial targets `[a=0, b=0, c=0]`. Commit
/// an MwCAS{a:0->10, b:0->20, c:0->30}. Expect `commit() == true`;
/// subsequent reads yield 10, 20, 30.
#[test]
fn s1_single_thread_success() {
    let a = Atomic::new(0usize);
    let b = Atomic::new(0usize);
    let c = Atomic::new(0usize);

    let mut desc = MwCasDescriptor::new();
    desc.add_target(&a, 0usize, 10usize);
    desc.add_target(&b, 0usize, 20usize);
    desc.add_target(&c, 0usize, 30usize);

    assert!(desc.commit());
    assert_eq!(a.read(), 10);
    assert_eq!(b.read(), 20);
    assert_eq!(c.read(), 30);
}

/// S-2 (single-thread mismatch): initial `[a=0, b=0]`. An external writer
/// sets `b := 5` (played here by a separate single-target commit, the
/// only way to land an "external" write through the public API). Commit
/// MwCAS{a:0->7, b:0->8}. Expect `commit() == false`; subsequent reads
/// yield 0 and 5.
#[test]
fn s2_single_thread_mismatch() {
    let a = Atomic::new(0usize);
    let b = Atomic::new(0usize);

    let mut external_writer = MwCasDescriptor::new();
    external_writer.add_target(&b, 0usize, 5usize);
    assert!(external_writer.commit());

    let mut desc = MwCasDescriptor::new();
    desc.add_target(&a, 0usize, 7usize);
    desc.add_target(&b, 0usize, 8usize);

    assert!(!desc.commit());
    assert_eq!(a.read(), 0);
    assert_eq!(b.read(), 5);
}

/// S-3 (two-thread counter): two targets a,b initialized to 0. Ten threads
/// each loop 10^4 times: read a and b, then MwCAS{a: ra->ra+1, b: rb->rb+1},
/// retrying failures. Expect final a = b = 100000.
#[test]
fn s3_ten_threads_exact_count_after_ten_thousand_increments_each() {
    const THREADS: usize = 10;
    const ITERATIONS: usize = 10_000;

    let a = Arc::new(Atomic::new(0usize));
    let b = Arc::new(Atomic::new(0usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let a = a.clone();
            let b = b.clone();
            std::thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    loop {
                        let ra = a.read();
                        let rb = b.read();
                        let mut desc = MwCasDescriptor::new();
                        desc.add_target(&*a, ra, ra + 1);
                        desc.add_target(&*b, rb, rb + 1);
                        if desc.commit() {
                            break;
                        }
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(a.read(), THREADS * ITERATIONS);
    assert_eq!(b.read(), THREADS * ITERATIONS);
}

/// A descriptor with zero targets commits vacuously without touching the
/// slot machinery.
#[test]
fn empty_descriptor_commits_trivially() {
    let desc = MwCasDescriptor::new();
    assert_eq!(desc.size(), 0);
    assert!(desc.commit());
}

/// S-6 (capacity): register `MAX_TARGETS` entries, then one more. The
/// extra `add_target` reports failure; `commit` on the full descriptor
/// proceeds normally.
#[test]
fn s6_max_targets_commit_together_and_overflow_is_rejected() {
    let words: Vec<_> = (0..4).map(Atomic::new).collect();
    let mut desc = MwCasDescriptor::new();
    for (i, w) in words.iter().enumerate() {
        assert!(desc.add_target(w, i, i + 100));
    }
    assert_eq!(desc.size(), 4);

    let overflow = Atomic::new(0usize);
    assert_eq!(
        desc.try_add_target(&overflow, 0usize, 1usize),
        Err(MwCasError::CapacityExceeded { max: 4 })
    );

    assert!(desc.commit());
    for (i, w) in words.iter().enumerate() {
        assert_eq!(w.read(), i + 100);
    }
}
