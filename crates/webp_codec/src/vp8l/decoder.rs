//! Lossless bitstream decoder.
//!
//! Decoding happens in one pass over a complete buffer: header, transform
//! list (each transform pulling its parameters out of a recursively coded
//! sub-image), prefix-code groups, then the pixel loop. The recorded
//! transforms are inverted in reverse order at the end.

use log::debug;

use crate::error::DecodingError;
use crate::vp8l::bits::LBitReader;
use crate::vp8l::backref::{code_to_distance, prefix_code_to_value};
use crate::vp8l::color_cache::{ColorCache, MAX_CACHE_BITS};
use crate::vp8l::huffman::{HuffmanTable, read_code};
use crate::vp8l::transforms::{
	TransformType, add_green, add_pixels, bundling_bits, inverse_color_indexing,
	inverse_cross_color, inverse_predictor, subsample_size,
};
use crate::vp8l::{
	CODES_PER_META_CODE, MAX_PALETTE_SIZE, MAX_TRANSFORMS, NUM_DISTANCE_CODES, NUM_LENGTH_CODES,
	NUM_LITERAL_CODES, SIGNATURE,
};

/// A fully decoded lossless frame.
#[derive(Debug, Clone)]
pub struct LosslessImage {
	/// Frame width in pixels.
	pub width: u32,
	/// Frame height in pixels.
	pub height: u32,
	/// The header's alpha hint.
	pub has_alpha: bool,
	/// Row-major ARGB pixels.
	pub pixels: Vec<u32>,
}

/// Reads just the stream header: `(width, height, alpha hint)`.
pub fn peek_header(data: &[u8]) -> Result<(u32, u32, bool), DecodingError> {
	let mut r = LBitReader::new(data);
	read_header(&mut r)
}

fn read_header(r: &mut LBitReader<'_>) -> Result<(u32, u32, bool), DecodingError> {
	if r.read_bits(8)? as u8 != SIGNATURE {
		return Err(DecodingError::BitstreamError("missing lossless signature"));
	}
	let width = r.read_bits(14)? + 1;
	let height = r.read_bits(14)? + 1;
	let has_alpha = r.read_flag()?;
	if r.read_bits(3)? != 0 {
		return Err(DecodingError::UnsupportedFeature("lossless version != 0"));
	}
	Ok((width, height, has_alpha))
}

/// Decodes a complete lossless stream.
pub fn decode(data: &[u8]) -> Result<LosslessImage, DecodingError> {
	let mut r = LBitReader::new(data);
	let (width, height, has_alpha) = read_header(&mut r)?;
	let pixels = decode_image_stream(&mut r, width as usize, height as usize, true)?;
	Ok(LosslessImage {
		width,
		height,
		has_alpha,
		pixels,
	})
}

struct Transform {
	ttype: TransformType,
	bits: u8,
	/// Width of the coded image when this transform was read; the inverse
	/// runs at this width.
	xsize: usize,
	data: Vec<u32>,
}

// One recursion level of the stream: transforms (top level only), color
// cache, meta codes, prefix-code groups, pixels.
fn decode_image_stream(
	r: &mut LBitReader<'_>,
	width: usize,
	height: usize,
	top_level: bool,
) -> Result<Vec<u32>, DecodingError> {
	let full_width = width;
	let mut xsize = width;
	let mut transforms: Vec<Transform> = Vec::new();

	if top_level {
		let mut seen = [false; 4];
		while r.read_flag()? {
			if transforms.len() == MAX_TRANSFORMS {
				return Err(DecodingError::BitstreamError("too many transforms"));
			}
			let ttype = TransformType::from_bits(r.read_bits(2)?)?;
			if seen[ttype as usize] {
				return Err(DecodingError::BitstreamError("duplicate transform"));
			}
			seen[ttype as usize] = true;

			let transform = match ttype {
				TransformType::Predictor | TransformType::CrossColor => {
					let bits = r.read_bits(3)? as u8 + 2;
					let tw = subsample_size(xsize, bits);
					let th = subsample_size(height, bits);
					let data = decode_image_stream(r, tw, th, false)?;
					Transform {
						ttype,
						bits,
						xsize,
						data,
					}
				}
				TransformType::SubtractGreen => Transform {
					ttype,
					bits: 0,
					xsize,
					data: Vec::new(),
				},
				TransformType::ColorIndexing => {
					let num_colors = r.read_bits(8)? as usize + 1;
					if num_colors > MAX_PALETTE_SIZE {
						return Err(DecodingError::BitstreamError("palette too large"));
					}
					let bits = bundling_bits(num_colors);
					let deltas = decode_image_stream(r, num_colors, 1, false)?;
					// Palette entries are delta-coded against their
					// predecessor.
					let mut palette = Vec::with_capacity(num_colors);
					let mut prev = 0u32;
					for &d in &deltas {
						prev = add_pixels(d, prev);
						palette.push(prev);
					}
					let packed_xsize = subsample_size(xsize, bits);
					let transform = Transform {
						ttype,
						bits,
						xsize,
						data: palette,
					};
					xsize = packed_xsize;
					transform
				}
			};
			transforms.push(transform);
		}
	}

	// Color cache.
	let cache_bits = if r.read_flag()? {
		let bits = r.read_bits(4)? as u8;
		if !(1..=MAX_CACHE_BITS).contains(&bits) {
			return Err(DecodingError::BitstreamError("invalid color cache size"));
		}
		bits
	} else {
		0
	};
	let cache_size = if cache_bits == 0 { 0 } else { 1usize << cache_bits };

	// Meta prefix codes (top level only).
	let (entropy_tiles, entropy_bits, num_groups) = if top_level && r.read_flag()? {
		let bits = r.read_bits(3)? as u8 + 2;
		let ew = subsample_size(xsize, bits);
		let eh = subsample_size(height, bits);
		let image = decode_image_stream(r, ew, eh, false)?;
		let tiles: Vec<u16> = image.iter().map(|&px| (px >> 8) as u16).collect();
		let num_groups = usize::from(*tiles.iter().max().unwrap_or(&0)) + 1;
		(Some(tiles), bits, num_groups)
	} else {
		(None, 0, 1)
	};

	let mut groups = Vec::with_capacity(num_groups);
	for _ in 0..num_groups {
		let literal = read_code(r, NUM_LITERAL_CODES + NUM_LENGTH_CODES + cache_size)?;
		let red = read_code(r, NUM_LITERAL_CODES)?;
		let blue = read_code(r, NUM_LITERAL_CODES)?;
		let alpha = read_code(r, NUM_LITERAL_CODES)?;
		let distance = read_code(r, NUM_DISTANCE_CODES)?;
		let group: [HuffmanTable; CODES_PER_META_CODE] = [literal, red, blue, alpha, distance];
		groups.push(group);
	}
	if top_level {
		debug!(
			"lossless stream: {} transform(s), cache {} bits, {} code group(s)",
			transforms.len(),
			cache_bits,
			num_groups
		);
	}

	let total = xsize
		.checked_mul(height)
		.ok_or(DecodingError::BitstreamError("image size overflow"))?;
	let mut pixels = vec![0u32; total];
	let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));
	let tiles_per_row = if entropy_tiles.is_some() {
		subsample_size(xsize, entropy_bits)
	} else {
		0
	};

	let mut pos = 0usize;
	while pos < total {
		let x = pos % xsize;
		let y = pos / xsize;
		let group = match &entropy_tiles {
			Some(tiles) => {
				let idx = usize::from(tiles[(y >> entropy_bits) * tiles_per_row + (x >> entropy_bits)]);
				groups
					.get(idx)
					.ok_or(DecodingError::BitstreamError("meta code out of range"))?
			}
			None => &groups[0],
		};

		let symbol = group[0].decode(r)? as usize;
		if symbol < NUM_LITERAL_CODES {
			let red = group[1].decode(r)? as u32;
			let blue = group[2].decode(r)? as u32;
			let alpha = group[3].decode(r)? as u32;
			let px = (alpha << 24) | (red << 16) | ((symbol as u32) << 8) | blue;
			pixels[pos] = px;
			if let Some(cache) = cache.as_mut() {
				cache.insert(px);
			}
			pos += 1;
		} else if symbol < NUM_LITERAL_CODES + NUM_LENGTH_CODES {
			let len = read_prefix_value(r, (symbol - NUM_LITERAL_CODES) as u32)? as usize;
			let dist_sym = group[4].decode(r)? as u32;
			let dist_code = read_prefix_value(r, dist_sym)?;
			let dist = code_to_distance(xsize, dist_code);
			if dist > pos || pos + len > total {
				return Err(DecodingError::BitstreamError("copy out of bounds"));
			}
			for _ in 0..len {
				pixels[pos] = pixels[pos - dist];
				if let Some(cache) = cache.as_mut() {
					cache.insert(pixels[pos]);
				}
				pos += 1;
			}
		} else {
			let idx = (symbol - NUM_LITERAL_CODES - NUM_LENGTH_CODES) as u32;
			let cache = cache
				.as_ref()
				.ok_or(DecodingError::BitstreamError("cache hit without cache"))?;
			if idx as usize >= cache_size {
				return Err(DecodingError::BitstreamError("cache index out of range"));
			}
			pixels[pos] = cache.lookup(idx);
			pos += 1;
		}
	}

	// Undo the transforms, most recently written first.
	for transform in transforms.iter().rev() {
		match transform.ttype {
			TransformType::ColorIndexing => {
				let packed_xsize = subsample_size(transform.xsize, transform.bits);
				pixels = inverse_color_indexing(
					&pixels,
					packed_xsize,
					transform.xsize,
					height,
					transform.bits,
					&transform.data,
				);
			}
			TransformType::Predictor => {
				inverse_predictor(
					&mut pixels,
					transform.xsize,
					height,
					transform.bits,
					&transform.data,
				);
			}
			TransformType::CrossColor => {
				inverse_cross_color(
					&mut pixels,
					transform.xsize,
					height,
					transform.bits,
					&transform.data,
				);
			}
			TransformType::SubtractGreen => add_green(&mut pixels),
		}
	}

	debug_assert_eq!(pixels.len(), full_width * height);
	Ok(pixels)
}

fn read_prefix_value(r: &mut LBitReader<'_>, symbol: u32) -> Result<u32, DecodingError> {
	if symbol < 4 {
		return Ok(symbol + 1);
	}
	let extra_bits = (symbol - 2) >> 1;
	let extra = r.read_bits(extra_bits as u8)?;
	Ok(prefix_code_to_value(symbol, extra))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bad_signature_rejected() {
		assert!(matches!(
			decode(&[0x30, 0, 0, 0, 0]),
			Err(DecodingError::BitstreamError(_))
		));
	}

	#[test]
	fn test_truncated_stream() {
		// Valid header, then nothing.
		let err = decode(&[0x2f, 0x00, 0x00, 0x00]).unwrap_err();
		assert!(matches!(err, DecodingError::NotEnoughData { .. }));
	}

	#[test]
	fn test_version_rejected() {
		// Header with version bits set to 1.
		let mut data = vec![0x2f, 0, 0, 0, 0b0010_0000, 0, 0, 0];
		data.extend_from_slice(&[0; 8]);
		assert!(matches!(
			decode(&data),
			Err(DecodingError::UnsupportedFeature(_))
		));
	}
}
