// Message codec benchmarks for the Agora protocol.
//
// Trial decryption dominates inbox projection, so the interesting numbers are
// the cost of a miss versus a hit for both encryption modes.

use criterion::{criterion_group, criterion_main, Criterion};

use agora_protocol::crypto::encryption::generate_key;
use agora_protocol::crypto::IdentityKeyPair;
use agora_protocol::message::{
    open_for_group, open_for_identity, seal_for_group, seal_for_public_half,
};

const TEXT: &str = "meet at the usual place, bring the printouts";

fn bench_seal(c: &mut Criterion) {
    let author = IdentityKeyPair::generate();
    let recipient = IdentityKeyPair::generate().public_half();
    let key = generate_key();

    c.bench_function("codec/seal_group", |b| {
        b.iter(|| seal_for_group(&author, "bench", &key, TEXT).unwrap());
    });
    c.bench_function("codec/seal_direct", |b| {
        b.iter(|| seal_for_public_half(&author, &recipient, TEXT).unwrap());
    });
}

fn bench_open(c: &mut Criterion) {
    let author = IdentityKeyPair::generate();
    let reader = IdentityKeyPair::generate();
    let key = generate_key();
    let other_key = generate_key();
    let group_payload = seal_for_group(&author, "bench", &key, TEXT).unwrap();
    let direct_payload = seal_for_public_half(&author, &reader.public_half(), TEXT).unwrap();

    c.bench_function("codec/open_group_hit", |b| {
        b.iter(|| open_for_group("bench", &key, &group_payload, 0).unwrap());
    });
    c.bench_function("codec/open_group_miss", |b| {
        b.iter(|| open_for_group("bench", &other_key, &group_payload, 0));
    });
    c.bench_function("codec/open_direct_hit", |b| {
        b.iter(|| open_for_identity(&reader, &direct_payload, 0).unwrap());
    });
    c.bench_function("codec/open_direct_miss", |b| {
        b.iter(|| open_for_identity(&author, &direct_payload, 0));
    });
}

criterion_group!(benches, bench_seal, bench_open);
criterion_main!(benches);
