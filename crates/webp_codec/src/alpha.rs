//! Alpha plane codec.
//!
//! ## Payload layout
//!
//! | Offset | Size | Field      | Description                         |
//! |--------|------|------------|-------------------------------------|
//! | 0      | 1    | method     | 0 = raw bytes, 1 = lossless stream  |
//! | 1      | 1    | filter     | 0 none, 1 horizontal, 2 vertical, 3 gradient |
//! | 2      | 1    | reserved   | bit 0: level pre-processing applied |
//! | 3      | ...  | data       | plane bytes or a lossless bitstream |
//!
//! The predictive filter runs before compression; with
//! [`AlphaFilter::Best`] all four candidates are measured by byte entropy
//! and the cheapest wins. For the lossless method the filtered plane
//! rides in the green channel of a synthetic ARGB image.

use crate::config::{AlphaFilter, EncoderConfig};
use crate::error::{DecodingError, EncodingError};
use crate::picture::{ArgbBuffer, Plane};
use crate::vp8l;
use crate::vp8l::histogram::fast_log2;

const METHOD_RAW: u8 = 0;
const METHOD_LOSSLESS: u8 = 1;
const HEADER_LEN: usize = 3;

/// Encodes an alpha plane into an `ALPH` chunk payload.
pub fn encode_alpha(plane: &Plane, config: &EncoderConfig) -> Result<Vec<u8>, EncodingError> {
	let width = plane.width();
	let height = plane.height();
	let mut samples = Vec::with_capacity(width * height);
	for y in 0..height {
		samples.extend_from_slice(plane.row(y));
	}

	let pre_processed = if config.alpha_quality < 100 {
		quantize_levels(&mut samples, config.alpha_quality);
		true
	} else {
		false
	};

	let (filter, filtered) = match config.alpha_filter {
		AlphaFilter::None => (0u8, samples.clone()),
		AlphaFilter::Horizontal => (1, apply_filter(&samples, width, height, 1)),
		AlphaFilter::Vertical => (2, apply_filter(&samples, width, height, 2)),
		AlphaFilter::Gradient => (3, apply_filter(&samples, width, height, 3)),
		AlphaFilter::Best => pick_best_filter(&samples, width, height),
	};

	let method = if config.alpha_compression {
		METHOD_LOSSLESS
	} else {
		METHOD_RAW
	};

	let mut out = vec![method, filter, u8::from(pre_processed)];
	if method == METHOD_RAW {
		out.extend_from_slice(&filtered);
	} else {
		let pixels: Vec<u32> = filtered
			.iter()
			.map(|&a| 0xff00_0000 | (u32::from(a) << 8))
			.collect();
		let buf = ArgbBuffer::from_pixels(pixels, width, height);
		let mut cfg = EncoderConfig::lossless(config.method);
		cfg.exact = true;
		out.extend_from_slice(&vp8l::encode(&buf.view_full(), &cfg)?);
	}
	Ok(out)
}

/// Decodes an `ALPH` chunk payload back into plane bytes.
pub fn decode_alpha(data: &[u8], width: usize, height: usize) -> Result<Vec<u8>, DecodingError> {
	if data.len() < HEADER_LEN {
		return Err(DecodingError::NotEnoughData {
			needed: HEADER_LEN - data.len(),
		});
	}
	let method = data[0];
	let filter = data[1];
	if filter > 3 {
		return Err(DecodingError::BitstreamError("invalid alpha filter"));
	}
	let payload = &data[HEADER_LEN..];

	let filtered = match method {
		METHOD_RAW => {
			if payload.len() < width * height {
				return Err(DecodingError::NotEnoughData {
					needed: width * height - payload.len(),
				});
			}
			payload[..width * height].to_vec()
		}
		METHOD_LOSSLESS => {
			let image = vp8l::decode(payload)?;
			if image.width as usize != width || image.height as usize != height {
				return Err(DecodingError::BitstreamError("alpha plane size mismatch"));
			}
			image.pixels.iter().map(|&px| (px >> 8) as u8).collect()
		}
		_ => return Err(DecodingError::UnsupportedFeature("alpha method")),
	};

	Ok(unfilter(&filtered, width, height, filter))
}

// Reduces the number of distinct alpha levels; `quality` 0 keeps two
// levels, 99 keeps nearly all of them.
fn quantize_levels(samples: &mut [u8], quality: u8) {
	let levels = 2 + (u32::from(quality) * 253) / 100;
	let step = 255.0 / (levels - 1) as f64;
	for s in samples.iter_mut() {
		let q = (f64::from(*s) / step).round() * step;
		*s = q.round().clamp(0.0, 255.0) as u8;
	}
}

// Gradient predictor, clamped to byte range.
#[inline]
fn gradient(left: i32, top: i32, top_left: i32) -> u8 {
	(left + top - top_left).clamp(0, 255) as u8
}

fn predictor(samples: &[u8], width: usize, x: usize, y: usize, filter: u8) -> u8 {
	let i = y * width + x;
	if x == 0 && y == 0 {
		0
	} else if y == 0 {
		samples[i - 1]
	} else if x == 0 {
		samples[i - width]
	} else {
		match filter {
			1 => samples[i - 1],
			2 => samples[i - width],
			_ => gradient(
				i32::from(samples[i - 1]),
				i32::from(samples[i - width]),
				i32::from(samples[i - width - 1]),
			),
		}
	}
}

fn apply_filter(samples: &[u8], width: usize, height: usize, filter: u8) -> Vec<u8> {
	let mut out = vec![0u8; samples.len()];
	for y in 0..height {
		for x in 0..width {
			let i = y * width + x;
			out[i] = samples[i].wrapping_sub(predictor(samples, width, x, y, filter));
		}
	}
	out
}

fn unfilter(filtered: &[u8], width: usize, height: usize, filter: u8) -> Vec<u8> {
	if filter == 0 {
		return filtered.to_vec();
	}
	let mut out = vec![0u8; filtered.len()];
	for y in 0..height {
		for x in 0..width {
			let i = y * width + x;
			out[i] = filtered[i].wrapping_add(predictor(&out, width, x, y, filter));
		}
	}
	out
}

fn pick_best_filter(samples: &[u8], width: usize, height: usize) -> (u8, Vec<u8>) {
	let mut best: Option<(f64, u8, Vec<u8>)> = None;
	for filter in 0..=3u8 {
		let candidate = if filter == 0 {
			samples.to_vec()
		} else {
			apply_filter(samples, width, height, filter)
		};
		let cost = byte_entropy(&candidate);
		if best.as_ref().is_none_or(|(c, _, _)| cost < *c) {
			best = Some((cost, filter, candidate));
		}
	}
	let (_, filter, data) = best.unwrap();
	(filter, data)
}

fn byte_entropy(data: &[u8]) -> f64 {
	let mut histogram = [0u32; 256];
	for &b in data {
		histogram[b as usize] += 1;
	}
	let total = data.len() as f64;
	let mut sum = 0.0;
	for &c in &histogram {
		if c > 0 {
			sum += f64::from(c) * fast_log2(c);
		}
	}
	total * total.log2() - sum
}

#[cfg(test)]
mod tests {
	use super::*;

	fn plane_from(bytes: &[u8], width: usize, height: usize) -> Plane {
		let mut plane = Plane::new(width, height);
		for y in 0..height {
			plane.row_mut(y).copy_from_slice(&bytes[y * width..(y + 1) * width]);
		}
		plane
	}

	#[test]
	fn test_filters_round_trip() {
		let width = 9;
		let height = 5;
		let samples: Vec<u8> = (0..width * height).map(|i| (i * 37 % 251) as u8).collect();
		for filter in 0..=3u8 {
			let filtered = apply_filter(&samples, width, height, filter);
			assert_eq!(unfilter(&filtered, width, height, filter), samples);
		}
	}

	#[test]
	fn test_lossless_round_trip() {
		let width = 8;
		let height = 8;
		// Checkerboard of 0 and 255.
		let samples: Vec<u8> = (0..width * height)
			.map(|i| if (i % width + i / width) % 2 == 0 { 0 } else { 255 })
			.collect();
		let plane = plane_from(&samples, width, height);
		let config = EncoderConfig::default();
		let encoded = encode_alpha(&plane, &config).unwrap();
		let decoded = decode_alpha(&encoded, width, height).unwrap();
		assert_eq!(decoded, samples);
	}

	#[test]
	fn test_raw_method_round_trip() {
		let width = 5;
		let height = 4;
		let samples: Vec<u8> = (0..width * height).map(|i| (i * 13) as u8).collect();
		let plane = plane_from(&samples, width, height);
		let mut config = EncoderConfig::default();
		config.alpha_compression = false;
		config.alpha_filter = AlphaFilter::Gradient;
		let encoded = encode_alpha(&plane, &config).unwrap();
		assert_eq!(encoded[0], METHOD_RAW);
		assert_eq!(encoded[1], 3);
		let decoded = decode_alpha(&encoded, width, height).unwrap();
		assert_eq!(decoded, samples);
	}

	#[test]
	fn test_quantized_levels_shrink() {
		let mut samples: Vec<u8> = (0..=255).collect();
		quantize_levels(&mut samples, 10);
		let distinct: std::collections::BTreeSet<u8> = samples.iter().copied().collect();
		assert!(distinct.len() <= 28);
		// Extremes survive quantization.
		assert_eq!(samples[0], 0);
		assert_eq!(samples[255], 255);
	}

	#[test]
	fn test_gradient_wins_on_ramp() {
		let width = 16;
		let height = 16;
		let samples: Vec<u8> = (0..width * height)
			.map(|i| ((i % width) + (i / width)) as u8)
			.collect();
		let (filter, _) = pick_best_filter(&samples, width, height);
		// A diagonal ramp is exactly the gradient predictor's home turf.
		assert_eq!(filter, 3);
	}

	#[test]
	fn test_truncated_header() {
		assert!(matches!(
			decode_alpha(&[1, 2], 4, 4),
			Err(DecodingError::NotEnoughData { .. })
		));
	}
}
