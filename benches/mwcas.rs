#![allow(unused_imports)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use mwcas::{Atomic, MwCasDescriptor};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const ITER: u64 = 24 * 100_000;

fn two_word_attempts(atomics: Arc<[Atomic<usize>; 2]>, threads: usize) -> [Atomic<usize>; 2] {
    let mut handles = Vec::new();
    let per_thread = ITER / threads as u64;
    for thread in 0..threads {
        let atomics = atomics.clone();
        let h = std::thread::spawn(move || {
            let mut num_succeeded = 0;
            for _ in 0..per_thread {
                let first = atomics[0].read();
                let second = atomics[1].read();
                let mut desc = MwCasDescriptor::new();
                desc.add_target(&atomics[0], first, thread);
                desc.add_target(&atomics[1], second, thread);
                if desc.commit() {
                    num_succeeded += 1;
                }
            }
            num_succeeded
        });

        handles.push(h);
    }

    let _total_succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    match Arc::try_unwrap(atomics) {
        Ok(a) => a,
        Err(_) => panic!("failed to unwrap"),
    }
}

fn four_word_attempts(atomics: Arc<[Atomic<usize>; 4]>, threads: usize) -> [Atomic<usize>; 4] {
    let mut handles = Vec::new();
    let per_thread = ITER / threads as u64;
    for thread in 0..threads {
        let atomics = atomics.clone();
        let h = std::thread::spawn(move || {
            let mut rng = rand::rngs::SmallRng::seed_from_u64(thread as u64 + 1);
            let mut num_succeeded = 0;
            for _ in 0..per_thread {
                let mut idxs = [0usize, 1, 2, 3];
                idxs.shuffle(&mut rng);
                let mut desc = MwCasDescriptor::new();
                for &i in idxs.iter().take(4) {
                    let current = atomics[i].read();
                    desc.add_target(&atomics[i], current, thread);
                }
                if desc.commit() {
                    num_succeeded += 1;
                }
            }
            num_succeeded
        });

        handles.push(h);
    }

    let _total_succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    match Arc::try_unwrap(atomics) {
        Ok(a) => a,
        Err(_) => panic!("failed to unwrap"),
    }
}

fn mwcas_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("mwcas");
    group.throughput(Throughput::Elements(ITER));

    for threads in [1, 2, 4, 8] {
        group.bench_function(format!("cas2/{threads}threads"), |b| {
            b.iter_batched(
                || Arc::new([Atomic::new(0usize), Atomic::new(0usize)]),
                |atomics| two_word_attempts(atomics, threads),
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("cas4/{threads}threads"), |b| {
            b.iter_batched(
                || {
                    Arc::new([
                        Atomic::new(0usize),
                        Atomic::new(0usize),
                        Atomic::new(0usize),
                        Atomic::new(0usize),
                    ])
                },
                |atomics| four_word_attempts(atomics, threads),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, mwcas_benchmark);
criterion_main!(benches);
