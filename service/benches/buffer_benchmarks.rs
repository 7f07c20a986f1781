//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Benchmarks for the per-connection buffers

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mudwire_service::{InputBuffer, OutputBuffer, OutputSink};
use std::hint::black_box;
use std::io;

/// Accepts every byte
struct Discard;

impl OutputSink for Discard {
    fn send(&mut self, bytes: &[u8], _urgent: bool) -> io::Result<usize> {
        Ok(bytes.len())
    }
}

fn bench_output_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_append");
    let text = "The quick brown fox jumps over the lazy dog.\n".repeat(20);

    for capacity in [256, 4096, 65536] {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            let mut buffer = OutputBuffer::new(capacity);
            let mut sink = Discard;
            b.iter(|| {
                buffer.append(&mut sink, black_box(text.as_bytes())).unwrap();
                buffer.flush(&mut sink).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_input_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("input_commands");
    let mut line = b"say hello everyone ".to_vec();
    line.extend_from_slice(b" \x08\0");

    group.throughput(Throughput::Bytes(line.len() as u64 * 10));
    group.bench_function("push_and_take", |b| {
        let mut buffer = InputBuffer::new(2048);
        b.iter(|| {
            for _ in 0..10 {
                buffer.push(&line);
            }
            while let Some(command) = buffer.first_command(false) {
                black_box(command);
            }
        })
    });

    group.bench_function("backspace_heavy", |b| {
        let mut buffer = InputBuffer::new(2048);
        let edited = b"lokk\x08\x08ok around\x7f\x7f\x7f\x7f\x7f\x7fhere\0";
        b.iter(|| {
            buffer.push(black_box(edited));
            black_box(buffer.first_command(false));
        })
    });

    group.finish();
}

criterion_group!(benches, bench_output_append, bench_input_commands);
criterion_main!(benches);
