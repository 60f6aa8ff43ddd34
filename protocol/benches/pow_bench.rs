// Proof-of-work benchmarks for the Agora protocol.
//
// Covers a single Argon2id trial, verification of a solved object, and full
// solves at a few payload sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use agora_protocol::pow::{solve, trial_value, verify};
use agora_protocol::store::GossipObject;

const EXPIRATION: u128 = 1_700_000_060;

fn bench_single_trial(c: &mut Criterion) {
    let input = GossipObject::pow_input(&[7u8; 256], EXPIRATION);

    c.bench_function("pow/trial", |b| {
        b.iter(|| trial_value(&input, 42).unwrap());
    });
}

fn bench_verify(c: &mut Criterion) {
    let input = GossipObject::pow_input(&[7u8; 256], EXPIRATION);
    let nonce = solve(&input, 60).unwrap();

    c.bench_function("pow/verify", |b| {
        b.iter(|| verify(&input, 60, nonce));
    });
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("pow/solve");
    group.sample_size(10);

    for size in [64usize, 1024, 8192] {
        let input = GossipObject::pow_input(&vec![1u8; size], EXPIRATION);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| solve(input, 60).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_trial, bench_verify, bench_solve);
criterion_main!(benches);
