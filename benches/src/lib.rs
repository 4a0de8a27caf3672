//! Shared helpers for the benchmark suite.

use webp_codec::picture::ArgbBuffer;

/// Deterministic pseudo-random ARGB test image.
pub fn noisy_image(width: usize, height: usize, seed: u32) -> ArgbBuffer {
	let mut state = seed | 1;
	let pixels: Vec<u32> = (0..width * height)
		.map(|_| {
			state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
			0xff00_0000 | (state >> 8 & 0x00ff_ffff)
		})
		.collect();
	ArgbBuffer::from_pixels(pixels, width, height)
}

/// Smooth gradient image that compresses well.
pub fn gradient_image(width: usize, height: usize) -> ArgbBuffer {
	let pixels: Vec<u32> = (0..width * height)
		.map(|i| {
			let x = (i % width) as u32;
			let y = (i / width) as u32;
			0xff00_0000
				| ((x * 255 / width as u32) << 16)
				| ((y * 255 / height as u32) << 8)
				| ((x + y) & 0xff)
		})
		.collect();
	ArgbBuffer::from_pixels(pixels, width, height)
}
