//! Canonical codec benchmarks.
//!
//! ```bash
//! cargo bench --package poet-anchor-testkit
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use poet_anchor_core::{decode_block, encode_block, validate_block, Block};
use poet_anchor_testkit::TestFixture;

fn make_block(claims: usize) -> Block {
    TestFixture::with_seed([0x42; 32]).make_block("bench", claims)
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_block");
    for claims in [1usize, 10, 100] {
        let block = make_block(claims);
        group.throughput(Throughput::Elements(claims as u64));
        group.bench_with_input(BenchmarkId::from_parameter(claims), &block, |b, block| {
            b.iter(|| encode_block(black_box(block)))
        });
    }
    group.finish();
}

fn bench_decode_and_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_validate_block");
    for claims in [1usize, 10, 100] {
        let bytes = encode_block(&make_block(claims));
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(claims), &bytes, |b, bytes| {
            b.iter(|| {
                let block = decode_block(black_box(bytes)).unwrap();
                validate_block(&block).unwrap();
                block
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_and_validate);
criterion_main!(benches);
