//! VP8L lossless bitstream support.
//!
//! ## Stream layout
//!
//! | Field          | Size   | Description                          |
//! |----------------|--------|--------------------------------------|
//! | signature      | 8 bits | always `0x2f`                        |
//! | width - 1      | 14 bits| little-endian bit packing            |
//! | height - 1     | 14 bits|                                      |
//! | alpha hint     | 1 bit  | set when alpha carries information   |
//! | version        | 3 bits | must be 0                            |
//! | transforms     | var    | up to four, each `1 | type(2) | ...` |
//! | coded image    | var    | cache + meta codes + prefix codes    |
//!
//! Transforms are written in the order the encoder applied them; the
//! decoder runs the inverses in reverse order. Transform parameters
//! (predictor modes, color multipliers, the palette, the entropy image)
//! are stored as recursively coded sub-images.

mod backref;
mod bits;
mod color_cache;
mod decoder;
mod encoder;
pub(crate) mod histogram;
mod huffman;
mod transforms;

pub use backref::{PixToken, length_prefix_code, prefix_code_to_value};
pub use decoder::{LosslessImage, decode, peek_header};
pub use encoder::encode;
pub use huffman::HuffmanTable;
pub use transforms::TransformType;

/// Signature byte opening every lossless stream.
pub const SIGNATURE: u8 = 0x2f;
/// Number of literal (green channel) codes.
pub const NUM_LITERAL_CODES: usize = 256;
/// Number of length prefix codes following the literals.
pub const NUM_LENGTH_CODES: usize = 24;
/// Number of distance prefix codes.
pub const NUM_DISTANCE_CODES: usize = 40;
/// Prefix codes per meta code: green+length, red, blue, alpha, distance.
pub const CODES_PER_META_CODE: usize = 5;
/// Largest palette the color-indexing transform can carry.
pub const MAX_PALETTE_SIZE: usize = 256;
/// Maximum number of transforms in one stream.
pub const MAX_TRANSFORMS: usize = 4;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::EncoderConfig;
	use crate::picture::ArgbBuffer;

	fn round_trip(pixels: Vec<u32>, width: usize, height: usize, config: &EncoderConfig) {
		let buf = ArgbBuffer::from_pixels(pixels, width, height);
		let bytes = encode(&buf.view_full(), config).unwrap();
		let image = decode(&bytes).unwrap();
		assert_eq!(image.pixels.as_slice(), buf.pixels());
		assert_eq!(image.width as usize, width);
		assert_eq!(image.height as usize, height);
	}

	#[test]
	fn test_single_red_pixel() {
		let config = EncoderConfig::lossless(4);
		let buf = ArgbBuffer::from_pixels(vec![0xffff_0000], 1, 1);
		let bytes = encode(&buf.view_full(), &config).unwrap();
		// A 1x1 stream stays tiny: header plus a handful of simple codes.
		assert!(bytes.len() <= 16, "stream is {} bytes", bytes.len());
		let image = decode(&bytes).unwrap();
		assert_eq!(image.pixels, vec![0xffff_0000]);
	}

	// test-log surfaces the encoder's debug trace on failure.
	#[test_log::test]
	fn test_gradient_round_trip_all_methods() {
		let width = 23;
		let height = 17;
		let pixels: Vec<u32> = (0..width * height)
			.map(|i| {
				let x = (i % width) as u32;
				let y = (i / width) as u32;
				0xff00_0000 | (x * 11 & 0xff) << 16 | (y * 17 & 0xff) << 8 | (x + y & 0xff)
			})
			.collect();
		for method in 0..=6 {
			round_trip(pixels.clone(), width, height, &EncoderConfig::lossless(method));
		}
	}

	#[test]
	fn test_palette_image_round_trip() {
		// 16x16 with four distinct colors: triggers color indexing with
		// four pixels per packed byte.
		let colors = [0xffff_0000u32, 0xff00_ff00, 0xff00_00ff, 0xffff_ffff];
		let pixels: Vec<u32> = (0..256).map(|i| colors[(i / 7) % 4]).collect();
		round_trip(pixels, 16, 16, &EncoderConfig::lossless(4));
	}

	#[test]
	fn test_transparent_alpha_preserved_in_exact_mode() {
		let mut config = EncoderConfig::lossless(5);
		config.exact = true;
		let pixels = vec![0x0012_3456, 0xffab_cdef, 0x80ff_0000, 0x0000_0000];
		round_trip(pixels, 2, 2, &config);
	}

	#[test]
	fn test_noisy_image_round_trip() {
		// Pseudo-random pixels defeat every transform; the stream must
		// still reconstruct exactly.
		let mut state = 0x1234_5678u32;
		let pixels: Vec<u32> = (0..31 * 19)
			.map(|_| {
				state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
				state | 0xff00_0000
			})
			.collect();
		round_trip(pixels, 31, 19, &EncoderConfig::lossless(6));
	}

	#[test]
	fn test_peek_header() {
		let config = EncoderConfig::lossless(2);
		let buf = ArgbBuffer::from_pixels(vec![0x8000_0000; 12], 4, 3);
		let bytes = encode(&buf.view_full(), &config).unwrap();
		let (width, height, has_alpha) = peek_header(&bytes).unwrap();
		assert_eq!((width, height), (4, 3));
		assert!(has_alpha);
	}
}
