//! Lossless bitstream encoder.
//!
//! Pipeline per image: analyze the palette potential, apply the transform
//! cascade (color indexing, or subtract-green / predictor / cross-color),
//! tokenize with the LZ77 matcher, pick a color-cache size by estimated
//! entropy, optionally split the canvas into entropy tiles with clustered
//! code groups, then emit prefix codes and tokens.

use std::collections::BTreeMap;

use log::debug;

use crate::config::{EncoderConfig, MAX_DIMENSION};
use crate::error::EncodingError;
use crate::picture::ArgbView;
use crate::vp8l::backref::{
	PixToken, apply_color_cache, compute_back_references, length_prefix_code,
};
use crate::vp8l::bits::LBitWriter;
use crate::vp8l::histogram::{Histogram, cluster_histograms, fast_log2};
use crate::vp8l::huffman::write_code;
use crate::vp8l::transforms::{
	ColorTransform, TransformType, bundling_bits, color_transform_delta, forward_cross_color,
	forward_predictor, sub_pixels, subsample_size, subtract_green, NUM_PREDICTORS,
};
use crate::vp8l::{MAX_PALETTE_SIZE, NUM_LENGTH_CODES, NUM_LITERAL_CODES, SIGNATURE};
use crate::yuv::cleanup_transparent_area;

/// Largest number of entropy-tile clusters the encoder produces.
const MAX_META_CODES: usize = 16;

/// Encodes an ARGB view into a standalone lossless stream.
pub fn encode(view: &ArgbView<'_>, config: &EncoderConfig) -> Result<Vec<u8>, EncodingError> {
	config.validate()?;
	let (width, height) = (view.width(), view.height());
	if width == 0 || height == 0 || width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize
	{
		return Err(EncodingError::BadDimension {
			width: width as u32,
			height: height as u32,
			max: MAX_DIMENSION,
		});
	}

	let mut pixels = view.to_pixels();
	if !config.exact {
		cleanup_transparent_area(&mut pixels);
	}
	let has_alpha = pixels.iter().any(|&px| px >> 24 != 0xff);

	let mut w = LBitWriter::new();
	w.write_bits(u64::from(SIGNATURE), 8);
	w.write_bits(width as u64 - 1, 14);
	w.write_bits(height as u64 - 1, 14);
	w.write_bits(u64::from(has_alpha), 1);
	w.write_bits(0, 3); // version

	let palette = detect_palette(&pixels);
	let effort = config.method;

	let (coded_pixels, coded_xsize) = if let Some(palette) = palette {
		debug!("lossless encoder: palette path, {} colors", palette.len());
		write_palette_transform(&mut w, &pixels, width, &palette, effort)
	} else {
		// Subtract green is always profitable enough to keep on.
		write_transform_tag(&mut w, TransformType::SubtractGreen);
		subtract_green(&mut pixels);

		// The tile machinery costs more than it saves on tiny images.
		if effort >= 1 && width * height >= 64 {
			let bits = if effort >= 4 { 4 } else { 5 };
			let modes = select_predictor_modes(&pixels, width, height, bits);
			write_transform_tag(&mut w, TransformType::Predictor);
			w.write_bits(u64::from(bits) - 2, 3);
			encode_entropy_coded_image(
				&mut w,
				&modes,
				subsample_size(width, bits),
				subsample_size(height, bits),
				effort.min(2),
				false,
			);
			pixels = forward_predictor(&pixels, width, height, bits, &modes);

			if effort >= 2 {
				let tiles = select_cross_color(&pixels, width, height, bits);
				write_transform_tag(&mut w, TransformType::CrossColor);
				w.write_bits(u64::from(bits) - 2, 3);
				encode_entropy_coded_image(
					&mut w,
					&tiles,
					subsample_size(width, bits),
					subsample_size(height, bits),
					effort.min(2),
					false,
				);
				forward_cross_color(&mut pixels, width, height, bits, &tiles);
			}
		}
		(pixels, width)
	};

	w.write_bits(0, 1); // end of transforms
	encode_entropy_coded_image(&mut w, &coded_pixels, coded_xsize, height, effort, true);
	Ok(w.finish())
}

fn write_transform_tag(w: &mut LBitWriter, ttype: TransformType) {
	w.write_bits(1, 1);
	w.write_bits(ttype as u64, 2);
}

// Returns the sorted palette when the image has few enough colors.
fn detect_palette(pixels: &[u32]) -> Option<Vec<u32>> {
	let mut colors = BTreeMap::new();
	for &px in pixels {
		colors.insert(px, ());
		if colors.len() > MAX_PALETTE_SIZE {
			return None;
		}
	}
	// A palette of one color still needs one entry; two or fewer pixels
	// gain nothing from indexing.
	if pixels.len() <= 2 {
		return None;
	}
	Some(colors.into_keys().collect())
}

// Writes the color-indexing transform (palette deltas as a sub-image) and
// returns the packed pixel rows plus the packed width.
fn write_palette_transform(
	w: &mut LBitWriter,
	pixels: &[u32],
	width: usize,
	palette: &[u32],
	effort: u8,
) -> (Vec<u32>, usize) {
	write_transform_tag(w, TransformType::ColorIndexing);
	w.write_bits(palette.len() as u64 - 1, 8);

	let mut deltas = Vec::with_capacity(palette.len());
	let mut prev = 0u32;
	for &color in palette {
		deltas.push(sub_pixels(color, prev));
		prev = color;
	}
	encode_entropy_coded_image(w, &deltas, palette.len(), 1, effort.min(2), false);

	let index_of: BTreeMap<u32, u8> = palette
		.iter()
		.enumerate()
		.map(|(i, &c)| (c, i as u8))
		.collect();

	let bits = bundling_bits(palette.len());
	let packed_width = subsample_size(width, bits);
	let height = pixels.len() / width;
	let bits_per_pixel = 8 >> bits;
	let pixels_per_slot = 1usize << bits;

	let mut packed = vec![0u32; packed_width * height];
	for y in 0..height {
		for x in 0..width {
			let idx = u32::from(index_of[&pixels[y * width + x]]);
			let slot = &mut packed[y * packed_width + (x >> bits)];
			let shift = (x & (pixels_per_slot - 1)) * bits_per_pixel;
			let green = (*slot >> 8 & 0xff) | (idx << shift);
			*slot = 0xff00_0000 | (green << 8);
		}
	}
	(packed, packed_width)
}

// Entropy proxy of one residual byte: distance from zero, mod 256.
#[inline]
fn residual_weight(byte: u32) -> u32 {
	let b = byte & 0xff;
	b.min(256 - b)
}

// Per-tile spatial predictor selection by residual byte entropy.
fn select_predictor_modes(pixels: &[u32], width: usize, height: usize, bits: u8) -> Vec<u32> {
	let tiles_w = subsample_size(width, bits);
	let tiles_h = subsample_size(height, bits);
	let tile_size = 1usize << bits;
	let mut modes = Vec::with_capacity(tiles_w * tiles_h);

	for ty in 0..tiles_h {
		for tx in 0..tiles_w {
			let x0 = tx * tile_size;
			let y0 = ty * tile_size;
			let x1 = (x0 + tile_size).min(width);
			let y1 = (y0 + tile_size).min(height);

			let mut best_mode = 0u8;
			let mut best_cost = f64::MAX;
			for mode in 0..NUM_PREDICTORS {
				let mut histogram = [0u32; 256];
				for y in y0..y1 {
					for x in x0..x1 {
						let residual = residual_at(pixels, width, x, y, mode);
						for shift in [0, 8, 16, 24] {
							histogram[(residual >> shift & 0xff) as usize] += 1;
						}
					}
				}
				let cost = entropy_estimate(&histogram);
				if cost < best_cost {
					best_cost = cost;
					best_mode = mode;
				}
			}
			modes.push(0xff00_0000 | (u32::from(best_mode) << 8));
		}
	}
	modes
}

fn entropy_estimate(histogram: &[u32; 256]) -> f64 {
	let total: u64 = histogram.iter().map(|&c| u64::from(c)).sum();
	if total == 0 {
		return 0.0;
	}
	let mut sum = 0.0;
	for &c in histogram {
		if c > 0 {
			sum += f64::from(c) * fast_log2(c);
		}
	}
	total as f64 * (total as f64).log2() - sum
}

// Residual of one pixel under `mode`, honoring the forced edge modes.
fn residual_at(pixels: &[u32], width: usize, x: usize, y: usize, mode: u8) -> u32 {
	use crate::vp8l::transforms::predict_at;
	sub_pixels(pixels[y * width + x], predict_at(pixels, width, x, y, mode))
}

// Candidate multipliers tried for each cross-color channel pair.
const MULTIPLIER_CANDIDATES: [i32; 9] = [0, 16, -16, 32, -32, 64, -64, 96, -96];

// Greedy per-tile search of the three cross-color multipliers.
fn select_cross_color(pixels: &[u32], width: usize, height: usize, bits: u8) -> Vec<u32> {
	let tiles_w = subsample_size(width, bits);
	let tiles_h = subsample_size(height, bits);
	let tile_size = 1usize << bits;
	let mut tiles = Vec::with_capacity(tiles_w * tiles_h);

	for ty in 0..tiles_h {
		for tx in 0..tiles_w {
			let x0 = tx * tile_size;
			let y0 = ty * tile_size;
			let x1 = (x0 + tile_size).min(width);
			let y1 = (y0 + tile_size).min(height);

			let mut cost_red = |m: i32| -> u64 {
				let mut cost = 0u64;
				for y in y0..y1 {
					for x in x0..x1 {
						let px = pixels[y * width + x];
						let green = (px >> 8) as u8;
						let red = (px >> 16 & 0xff)
							.wrapping_sub(color_transform_delta(m as u8, green))
							& 0xff;
						cost += u64::from(residual_weight(red));
					}
				}
				cost
			};
			let green_to_red = pick_multiplier(&mut cost_red);

			let mut cost_blue = |g2b: i32, r2b: i32| -> u64 {
				let mut cost = 0u64;
				for y in y0..y1 {
					for x in x0..x1 {
						let px = pixels[y * width + x];
						let green = (px >> 8) as u8;
						let red = (px >> 16) as u8;
						let blue = (px & 0xff)
							.wrapping_sub(color_transform_delta(g2b as u8, green))
							.wrapping_sub(color_transform_delta(r2b as u8, red))
							& 0xff;
						cost += u64::from(residual_weight(blue));
					}
				}
				cost
			};
			let green_to_blue = pick_multiplier(&mut |m| cost_blue(m, 0));
			let red_to_blue = pick_multiplier(&mut |m| cost_blue(green_to_blue, m));

			tiles.push(
				ColorTransform {
					green_to_red: green_to_red as u8,
					green_to_blue: green_to_blue as u8,
					red_to_blue: red_to_blue as u8,
				}
				.to_code(),
			);
		}
	}
	tiles
}

fn pick_multiplier(cost: &mut dyn FnMut(i32) -> u64) -> i32 {
	let mut best = 0;
	let mut best_cost = cost(0);
	for &m in &MULTIPLIER_CANDIDATES[1..] {
		let c = cost(m);
		if c < best_cost {
			best_cost = c;
			best = m;
		}
	}
	best
}

// Prefix codes of one code group, ready for emission.
struct CodeSet {
	literal: (Vec<u8>, Vec<u16>),
	red: (Vec<u8>, Vec<u16>),
	blue: (Vec<u8>, Vec<u16>),
	alpha: (Vec<u8>, Vec<u16>),
	distance: (Vec<u8>, Vec<u16>),
}

fn write_code_group(w: &mut LBitWriter, histogram: &Histogram) -> CodeSet {
	CodeSet {
		literal: write_code(w, &histogram.literal),
		red: write_code(w, &histogram.red),
		blue: write_code(w, &histogram.blue),
		alpha: write_code(w, &histogram.alpha),
		distance: write_code(w, &histogram.distance),
	}
}

// Core of the format: cache signaling, optional entropy tiling, prefix
// code groups and the token stream. `top_level` controls whether the
// meta-code flag is present at all.
fn encode_entropy_coded_image(
	w: &mut LBitWriter,
	pixels: &[u32],
	xsize: usize,
	ysize: usize,
	effort: u8,
	top_level: bool,
) {
	let tokens = compute_back_references(pixels, xsize, effort);

	// Color-cache size by estimated cost.
	let cache_candidates: &[u8] = if top_level && effort >= 1 {
		&[0, 2, 4, 6, 8, 10]
	} else {
		&[0]
	};
	let mut best_tokens = Vec::new();
	let mut best_bits = 0u8;
	let mut best_cost = f64::MAX;
	for &cache_bits in cache_candidates {
		let candidate = apply_color_cache(&tokens, pixels, cache_bits);
		let mut histogram = Histogram::new(cache_bits);
		for t in &candidate {
			histogram.add(t);
		}
		let cost = histogram.estimate_bits() + if cache_bits > 0 { f64::from(cache_bits) } else { 0.0 };
		if cost < best_cost {
			best_cost = cost;
			best_bits = cache_bits;
			best_tokens = candidate;
		}
	}
	let tokens = best_tokens;
	let cache_bits = best_bits;

	if cache_bits > 0 {
		w.write_bits(1, 1);
		w.write_bits(u64::from(cache_bits), 4);
	} else {
		w.write_bits(0, 1);
	}

	// Entropy tiling.
	let tiling = if top_level && effort >= 4 {
		plan_entropy_tiles(&tokens, xsize, ysize, cache_bits)
	} else {
		None
	};

	match tiling {
		Some((bits, mapping, histograms)) if histograms.len() > 1 => {
			debug!(
				"lossless encoder: {} entropy tile cluster(s) at {} bits",
				histograms.len(),
				bits
			);
			w.write_bits(1, 1);
			w.write_bits(u64::from(bits) - 2, 3);
			let tiles_w = subsample_size(xsize, bits);
			let tiles_h = subsample_size(ysize, bits);
			let entropy_pixels: Vec<u32> = mapping
				.iter()
				.map(|&idx| {
					let idx = u32::from(idx);
					0xff00_0000 | ((idx >> 8) << 16) | ((idx & 0xff) << 8)
				})
				.collect();
			encode_entropy_coded_image(w, &entropy_pixels, tiles_w, tiles_h, effort.min(2), false);

			let code_sets: Vec<CodeSet> = histograms
				.iter()
				.map(|h| write_code_group(w, h))
				.collect();
			emit_tokens(w, &tokens, xsize, |x, y| {
				usize::from(mapping[(y >> bits) * tiles_w + (x >> bits)])
			}, &code_sets);
		}
		_ => {
			if top_level {
				w.write_bits(0, 1); // single code group
			}
			let mut histogram = Histogram::new(cache_bits);
			for t in &tokens {
				histogram.add(t);
			}
			let code_sets = [write_code_group(w, &histogram)];
			emit_tokens(w, &tokens, xsize, |_, _| 0, &code_sets);
		}
	}
}

// Builds per-tile histograms and clusters them; `None` when a single tile
// covers everything.
fn plan_entropy_tiles(
	tokens: &[PixToken],
	xsize: usize,
	ysize: usize,
	cache_bits: u8,
) -> Option<(u8, Vec<u16>, Vec<Histogram>)> {
	// Grow tiles until their count stays manageable.
	let mut bits = 6u8;
	while bits < 9 && subsample_size(xsize, bits) * subsample_size(ysize, bits) > 64 {
		bits += 1;
	}
	let tiles_w = subsample_size(xsize, bits);
	let tiles_h = subsample_size(ysize, bits);
	if tiles_w * tiles_h <= 1 {
		return None;
	}

	let mut histograms: Vec<Histogram> =
		(0..tiles_w * tiles_h).map(|_| Histogram::new(cache_bits)).collect();
	let mut pos = 0usize;
	for token in tokens {
		let x = pos % xsize;
		let y = pos / xsize;
		histograms[(y >> bits) * tiles_w + (x >> bits)].add(token);
		pos += match token {
			PixToken::Copy { len, .. } => *len as usize,
			_ => 1,
		};
	}

	let (clusters, mapping) = cluster_histograms(histograms, MAX_META_CODES);
	Some((bits, mapping, clusters))
}

fn emit_tokens(
	w: &mut LBitWriter,
	tokens: &[PixToken],
	xsize: usize,
	group_of: impl Fn(usize, usize) -> usize,
	code_sets: &[CodeSet],
) {
	let mut pos = 0usize;
	for token in tokens {
		let x = pos % xsize;
		let y = pos / xsize;
		let set = &code_sets[group_of(x, y)];
		match *token {
			PixToken::Literal(px) => {
				let green = (px >> 8 & 0xff) as usize;
				let red = (px >> 16 & 0xff) as usize;
				let blue = (px & 0xff) as usize;
				let alpha = (px >> 24) as usize;
				put_code(w, &set.literal, green);
				put_code(w, &set.red, red);
				put_code(w, &set.blue, blue);
				put_code(w, &set.alpha, alpha);
				pos += 1;
			}
			PixToken::CacheIdx(idx) => {
				put_code(
					w,
					&set.literal,
					NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize,
				);
				pos += 1;
			}
			PixToken::Copy { len, dist_code } => {
				let (sym, extra_count, extra) = length_prefix_code(len);
				put_code(w, &set.literal, NUM_LITERAL_CODES + sym as usize);
				w.write_bits(u64::from(extra), extra_count as u8);
				let (dsym, dextra_count, dextra) = length_prefix_code(dist_code);
				put_code(w, &set.distance, dsym as usize);
				w.write_bits(u64::from(dextra), dextra_count as u8);
				pos += len as usize;
			}
		}
	}
}

#[inline]
fn put_code(w: &mut LBitWriter, set: &(Vec<u8>, Vec<u16>), symbol: usize) {
	let len = set.0[symbol];
	if len > 0 {
		w.write_bits(u64::from(set.1[symbol]), len);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_palette_detection() {
		let pixels = vec![1u32, 2, 3, 1, 2, 3, 1, 2];
		assert_eq!(detect_palette(&pixels), Some(vec![1, 2, 3]));

		let many: Vec<u32> = (0..300).collect();
		assert_eq!(detect_palette(&many), None);
	}

	#[test]
	fn test_predictor_mode_prefers_left_on_horizontal_gradient() {
		let width = 16;
		let height = 8;
		let pixels: Vec<u32> = (0..width * height)
			.map(|i| {
				let x = (i % width) as u32;
				0xff00_0000 | (x * 3) << 16 | (x * 3) << 8 | (x * 3)
			})
			.collect();
		let modes = select_predictor_modes(&pixels, width, height, 4);
		// Rows repeat, so "top" (mode 2) predicts exactly; "left" (mode 1)
		// leaves a constant small residual. Either is a sensible winner,
		// but the picked mode must beat the null predictor.
		for &code in &modes {
			let mode = (code >> 8) & 0xf;
			assert_ne!(mode, 0);
		}
	}

	#[test]
	fn test_cross_color_identity_on_gray() {
		// Gray pixels have red == green == blue; the greedy search must
		// find strong negative correlation multipliers or zero, never
		// corrupt the tile code layout.
		let pixels = vec![0xff40_4040u32; 64];
		let tiles = select_cross_color(&pixels, 8, 8, 3);
		assert_eq!(tiles.len(), 1);
		assert_eq!(tiles[0] >> 24, 0xff);
	}
}
