//! VP8 lossy bitstream support (key frames only, as used by WebP).
//!
//! ## Frame layout
//!
//! | Field            | Size     | Description                           |
//! |------------------|----------|---------------------------------------|
//! | frame tag        | 3 bytes  | keyframe bit, version, show bit, partition 0 size (19 bits) |
//! | start code       | 3 bytes  | `0x9d 0x01 0x2a`                      |
//! | width            | 2 bytes  | 14-bit size plus 2-bit scale code     |
//! | height           | 2 bytes  | 14-bit size plus 2-bit scale code     |
//! | partition 0      | variable | header + mode syntax, boolean coded   |
//! | partition sizes  | 3 bytes each | for token partitions 1..n-1       |
//! | token partitions | variable | residual tokens, boolean coded        |
//!
//! Macroblocks are 16x16 luma plus two 8x8 chroma blocks, scanned in
//! raster order. Intra prediction runs on the unfiltered reconstruction;
//! the deblocking filter runs afterwards on the output planes.

pub mod bool_coder;
mod decoder;
mod encoder;
pub mod loop_filter;
pub mod predict;
pub mod probs;
pub mod quant;
pub mod tables;
pub mod tokens;
pub mod transform;

pub use decoder::{decode, peek_dimensions};
pub use encoder::encode;

use crate::vp8::quant::QuantDeltas;

/// Key-frame start code.
pub const START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];
/// Hard cap on the header/mode partition.
pub const MAX_PARTITION0_SIZE: usize = 1 << 19;
/// Hard cap on each token partition.
pub const MAX_PARTITION_SIZE: usize = 1 << 24;
/// Number of segments a frame can use.
pub const NUM_SEGMENTS: usize = 4;

/// Segmentation state signaled in the frame header.
#[derive(Debug, Clone)]
pub struct SegmentHeader {
	/// Segmentation in use at all.
	pub enabled: bool,
	/// Per-macroblock segment map present in this frame.
	pub update_map: bool,
	/// Deltas are absolute values rather than adjustments.
	pub absolute_delta: bool,
	/// Per-segment quantizer adjustment.
	pub quant_delta: [i32; NUM_SEGMENTS],
	/// Per-segment filter level adjustment.
	pub filter_delta: [i32; NUM_SEGMENTS],
	/// Probabilities of the segment-id tree.
	pub tree_probs: [u8; 3],
}

impl Default for SegmentHeader {
	fn default() -> Self {
		Self {
			enabled: false,
			update_map: false,
			absolute_delta: false,
			quant_delta: [0; NUM_SEGMENTS],
			filter_delta: [0; NUM_SEGMENTS],
			tree_probs: [255; 3],
		}
	}
}

/// Deblocking filter state signaled in the frame header.
#[derive(Debug, Clone, Copy)]
pub struct FilterHeader {
	/// Use the two-tap simple filter.
	pub simple: bool,
	/// Base filter level, 0 (off) to 63.
	pub level: i32,
	/// Sharpness, 0..=7.
	pub sharpness: i32,
	/// Filter-level delta for intra macroblocks (the only reference class
	/// of a key frame).
	pub intra_delta: i32,
	/// Additional delta for 4x4-mode macroblocks.
	pub bpred_delta: i32,
}

impl Default for FilterHeader {
	fn default() -> Self {
		Self {
			simple: false,
			level: 0,
			sharpness: 0,
			intra_delta: 0,
			bpred_delta: 0,
		}
	}
}

/// Quantizer state signaled in the frame header.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantHeader {
	/// Base 7-bit quantizer index (luma AC).
	pub base_q: i32,
	/// Plane-specific index deltas.
	pub deltas: QuantDeltas,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::EncoderConfig;
	use crate::picture::YuvaPlanes;
	use crate::yuv::{argb_to_yuva, yuva_to_argb};
	use crate::picture::ArgbBuffer;

	fn gradient_planes(width: usize, height: usize) -> YuvaPlanes {
		let pixels: Vec<u32> = (0..width * height)
			.map(|i| {
				let x = (i % width) as u32;
				let y = (i / width) as u32;
				let g = (x * 255 / width.max(2) as u32) & 0xff;
				let b = (y * 255 / height.max(2) as u32) & 0xff;
				0xff00_0000 | (g << 16) | (g << 8) | b
			})
			.collect();
		argb_to_yuva(&ArgbBuffer::from_pixels(pixels, width, height), false)
	}

	fn psnr(a: &[u8], b: &[u8]) -> f64 {
		let mse: f64 = a
			.iter()
			.zip(b)
			.map(|(&x, &y)| {
				let d = f64::from(x) - f64::from(y);
				d * d
			})
			.sum::<f64>()
			/ a.len() as f64;
		if mse == 0.0 { 99.0 } else { 10.0 * (255.0f64 * 255.0 / mse).log10() }
	}

	fn round_trip_quality(width: usize, height: usize, quality: f32, min_psnr: f64) {
		let planes = gradient_planes(width, height);
		let mut config = EncoderConfig::default();
		config.quality = quality;
		let bytes = encode(&planes, &config, &mut None).unwrap();

		let decoded = decode(&bytes, &Default::default()).unwrap();
		assert_eq!(decoded.y.width(), width);
		assert_eq!(decoded.y.height(), height);
		let got = psnr(decoded.y.data(), planes.y.data());
		assert!(got >= min_psnr, "{width}x{height} q{quality}: psnr {got:.2}");
	}

	#[test]
	fn test_small_frames_round_trip() {
		round_trip_quality(16, 16, 90.0, 30.0);
		round_trip_quality(32, 32, 75.0, 28.0);
		// Non-multiple-of-16 sizes exercise the cropping path.
		round_trip_quality(17, 13, 85.0, 28.0);
	}

	#[test]
	fn test_tiny_frame() {
		round_trip_quality(2, 2, 75.0, 28.0);
	}

	#[test]
	fn test_flat_frame_is_near_exact() {
		let planes = YuvaPlanes::new(24, 24, false);
		let mut flat = planes;
		flat.y.fill(128);
		flat.u.fill(100);
		flat.v.fill(160);
		let config = EncoderConfig::default();
		let bytes = encode(&flat, &config, &mut None).unwrap();
		let decoded = decode(&bytes, &Default::default()).unwrap();
		let err = decoded
			.y
			.data()
			.iter()
			.zip(flat.y.data())
			.map(|(&a, &b)| a.abs_diff(b) as u32)
			.max()
			.unwrap();
		assert!(err <= 2, "max luma error {err}");
	}

	#[test]
	fn test_quality_affects_size() {
		let planes = {
			// Noisy content so rate actually varies with quality.
			let mut state = 7u32;
			let pixels: Vec<u32> = (0..64 * 64)
				.map(|_| {
					state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
					0xff00_0000 | (state & 0x00ff_ffff)
				})
				.collect();
			argb_to_yuva(&ArgbBuffer::from_pixels(pixels, 64, 64), false)
		};
		let mut low = EncoderConfig::default();
		low.quality = 10.0;
		let mut high = EncoderConfig::default();
		high.quality = 95.0;
		let small = encode(&planes, &low, &mut None).unwrap();
		let large = encode(&planes, &high, &mut None).unwrap();
		assert!(small.len() < large.len());
	}

	#[test]
	fn test_decode_to_argb() {
		let planes = gradient_planes(20, 20);
		let config = EncoderConfig::default();
		let bytes = encode(&planes, &config, &mut None).unwrap();
		let decoded = decode(&bytes, &Default::default()).unwrap();
		let argb = yuva_to_argb(&decoded, true);
		assert_eq!(argb.width(), 20);
	}

	#[test]
	fn test_peek_dimensions() {
		let planes = gradient_planes(48, 32);
		let bytes = encode(&planes, &EncoderConfig::default(), &mut None).unwrap();
		let (w, h) = peek_dimensions(&bytes).unwrap();
		assert_eq!((w, h), (48, 32));
	}
}
