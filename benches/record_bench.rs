//! Benchmarks for trustlet record encoding and decoding.
//!
//! Every applet command encodes a record into a fresh shared region and
//! decodes the response from it, so these sit on the hot path of the
//! capture loop.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench record_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fpc_protocol::{
    AuthResult, BufferCommand, Command, FingerprintList, Identify, Record, decode_record,
    encode_record,
};
use std::hint::black_box;

/// Benchmark encoding the fixed records used by the capture loop.
fn bench_encode_fixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_fixed");
    group.throughput(Throughput::Elements(1));

    let identify = Identify::new();
    group.bench_function("identify", |b| {
        b.iter(|| black_box(encode_record(black_box(&identify))));
    });

    let auth = AuthResult::new();
    group.bench_function("auth_result", |b| {
        b.iter(|| black_box(encode_record(black_box(&auth))));
    });

    group.finish();
}

/// Benchmark decoding fixed records out of a larger shared region.
fn bench_decode_fixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_fixed");
    group.throughput(Throughput::Elements(1));

    let mut region = encode_record(&FingerprintList::new());
    region.resize(4096, 0);
    group.bench_function("fingerprint_list", |b| {
        b.iter(|| {
            let list: FingerprintList = decode_record(black_box(&region)).unwrap();
            black_box(list);
        });
    });

    group.finish();
}

/// Benchmark buffer commands across payload sizes.
fn bench_buffer_command(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_command");

    for size in [69usize, 256, 1024, 4096] {
        let record = BufferCommand::new(Command::SetKeyData, vec![0xA5; size]);
        let bytes = encode_record(&record);
        group.throughput(Throughput::Bytes(record.encoded_len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &record, |b, record| {
            b.iter(|| black_box(encode_record(black_box(record))));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |b, bytes| {
            b.iter(|| {
                let record: BufferCommand = decode_record(black_box(bytes)).unwrap();
                black_box(record);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_fixed,
    bench_decode_fixed,
    bench_buffer_command
);
criterion_main!(benches);
