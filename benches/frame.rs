// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Framing protocol benchmarks on an in-memory segment (no OS primitives).
//
// Run with:
//   cargo bench --bench frame
//
// Groups:
//   frame_send      — try_send into a free slot, slot cleared between iters
//   frame_roundtrip — try_send plus a full consume by one other registrant
//   frame_checksum  — checksum strategy alone, for scale
//
// Each group exercises the same payload sizes:
//   small  — 48 bytes   (chat-line scale)
//   medium — 512 bytes
//   large  — 4084 bytes (fills a 4 KiB segment exactly)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use memchan::frame::{FrameProto, RecvState, SendState, HEADER_SIZE};
use memchan::{Checksum, SumChecksum};

const SEGMENT: usize = 4096;

const SIZES: &[(&str, usize)] = &[
    ("small_48", 48),
    ("medium_512", 512),
    ("large_4084", SEGMENT - HEADER_SIZE as usize),
];

fn bench_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_send");

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            let mut buf = vec![0u8; SEGMENT];
            let mut sender: FrameProto<SumChecksum> = FrameProto::new();
            sender.init(&mut buf).unwrap();
            let payload = vec![0xabu8; sz];

            b.iter(|| {
                let state = sender.try_send(black_box(&mut buf), black_box(&payload));
                assert_eq!(state, SendState::Success);
                memchan::frame::clear_slot(&mut buf);
            });
        });
    }

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_roundtrip");

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            let mut buf = vec![0u8; SEGMENT];
            let mut sender: FrameProto<SumChecksum> = FrameProto::new();
            let mut reader: FrameProto<SumChecksum> = FrameProto::new();
            sender.init(&mut buf).unwrap();
            reader.init(&mut buf).unwrap();
            let payload = vec![0xabu8; sz];

            b.iter(|| {
                let state = sender.try_send(black_box(&mut buf), black_box(&payload));
                assert_eq!(state, SendState::Success);
                let mut delivered = 0usize;
                let state = reader.try_recv(&mut buf, |p| delivered = p.len());
                assert_eq!(state, RecvState::Success);
                black_box(delivered)
            });
        });
    }

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_checksum");

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            let payload = vec![0xabu8; sz];
            b.iter(|| black_box(SumChecksum::checksum(black_box(&payload))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_send, bench_roundtrip, bench_checksum);
criterion_main!(benches);
