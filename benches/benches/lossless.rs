//! Benchmark suite for the lossless codec.
//!
//! Run with: cargo bench --manifest-path benches/Cargo.toml

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use webp_benches::{gradient_image, noisy_image};
use webp_codec::EncoderConfig;
use webp_codec::vp8l;

fn bench_encode(c: &mut Criterion) {
	let mut group = c.benchmark_group("vp8l_encode");
	for (name, image) in [
		("gradient_256", gradient_image(256, 256)),
		("noise_256", noisy_image(256, 256, 0x1234)),
	] {
		group.throughput(Throughput::Elements(
			(image.width() * image.height()) as u64,
		));
		for method in [0u8, 4] {
			let config = EncoderConfig::lossless(method);
			group.bench_with_input(
				BenchmarkId::new(format!("m{method}"), name),
				&image,
				|b, image| {
					b.iter(|| vp8l::encode(&black_box(image).view_full(), &config).unwrap());
				},
			);
		}
	}
	group.finish();
}

fn bench_decode(c: &mut Criterion) {
	let mut group = c.benchmark_group("vp8l_decode");
	for (name, image) in [
		("gradient_256", gradient_image(256, 256)),
		("noise_256", noisy_image(256, 256, 0x5678)),
	] {
		let stream = vp8l::encode(&image.view_full(), &EncoderConfig::lossless(4)).unwrap();
		group.throughput(Throughput::Bytes(stream.len() as u64));
		group.bench_with_input(BenchmarkId::new("decode", name), &stream, |b, stream| {
			b.iter(|| vp8l::decode(black_box(stream)).unwrap());
		});
	}
	group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
