//! Benchmarks for the pigpio frame codec
//!
//! Measures request encoding, response decoding and reassembly of a pipelined
//! response stream delivered in small chunks.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use protocol::commands::{I2CRD, I2CWD, READ, WRITE};
use protocol::{
    Request, ResponseBuffer, ResponseFrame, ResponseResult, decode_response, encode_request,
    encode_response,
};

fn benchmark_requests(c: &mut Criterion) {
    let mut group = c.benchmark_group("requests");

    let write = Request::new(WRITE, 17, 1, 0);
    group.bench_function("encode_write", |b| {
        b.iter(|| encode_request(black_box(&write)))
    });

    for size in [16usize, 256, 4096] {
        let req = Request::with_extension(I2CWD, 1, 0, vec![0xA5; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode_i2c_write", size), &req, |b, req| {
            b.iter(|| encode_request(black_box(req)))
        });
    }

    group.finish();
}

fn benchmark_responses(c: &mut Criterion) {
    let mut group = c.benchmark_group("responses");

    let read = encode_response(&ResponseFrame {
        command: READ,
        p1: 4,
        p2: 0,
        result: ResponseResult::Value(1),
    });
    group.bench_function("decode_read", |b| {
        b.iter(|| decode_response(black_box(&read)))
    });

    let i2c = encode_response(&ResponseFrame {
        command: I2CRD,
        p1: 1,
        p2: 32,
        result: ResponseResult::Extended(vec![0x5A; 32].into()),
    });
    group.bench_function("decode_i2c_read", |b| {
        b.iter(|| decode_response(black_box(&i2c)))
    });

    group.finish();
}

fn benchmark_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    let frame = encode_response(&ResponseFrame {
        command: READ,
        p1: 4,
        p2: 0,
        result: ResponseResult::Value(1),
    });
    let stream: Vec<u8> = (0..256).flat_map(|_| frame.to_vec()).collect();

    for chunk in [7usize, 64, 1460] {
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::new("pipelined_reads", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut buf = ResponseBuffer::new();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    buf.push(piece);
                    while let Ok(Some(_)) = buf.next_frame() {
                        count += 1;
                    }
                }
                black_box(count)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_requests,
    benchmark_responses,
    benchmark_reassembly
);
criterion_main!(benches);
