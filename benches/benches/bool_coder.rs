//! Benchmark of the boolean arithmetic coder hot path.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use webp_codec::vp8::bool_coder::{BoolDecoder, BoolEncoder};

fn bench_bool_coder(c: &mut Criterion) {
	let mut state = 0x9e37_79b9u32;
	let stream: Vec<(bool, u8)> = (0..100_000)
		.map(|_| {
			state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
			((state >> 13) & 1 != 0, (state % 254 + 1) as u8)
		})
		.collect();

	let mut group = c.benchmark_group("bool_coder");
	group.throughput(Throughput::Elements(stream.len() as u64));

	group.bench_function("encode", |b| {
		b.iter(|| {
			let mut enc = BoolEncoder::new();
			for &(bit, prob) in black_box(&stream) {
				enc.put_bool(bit, prob);
			}
			enc.finish()
		});
	});

	let bytes = {
		let mut enc = BoolEncoder::new();
		for &(bit, prob) in &stream {
			enc.put_bool(bit, prob);
		}
		enc.finish()
	};
	group.bench_function("decode", |b| {
		b.iter(|| {
			let mut dec = BoolDecoder::new(black_box(&bytes));
			let mut ones = 0u32;
			for &(_, prob) in &stream {
				ones += u32::from(dec.get_bool(prob));
			}
			ones
		});
	});
	group.finish();
}

criterion_group!(benches, bench_bool_coder);
criterion_main!(benches);
