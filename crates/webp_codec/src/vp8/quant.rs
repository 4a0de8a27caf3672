//! Quantization matrices and segment parameters.
//!
//! Quantizer indices are 7-bit; the DC/AC step tables translate them into
//! step sizes. The encoder-side matrix carries the reciprocal (`iq`),
//! rounding bias, zero-threshold and frequency sharpening needed by the
//! fixed-point quantizer: `level = (|v| + sharpen) * iq + bias >> QFIX`,
//! clamped to 2047.

use crate::vp8::tables::{AC_TABLE, DC_TABLE, ZIGZAG};

/// Fixed-point precision of the quantizer reciprocals.
pub const QFIX: u32 = 17;
/// Largest coefficient level the token alphabet can carry.
pub const MAX_LEVEL: i32 = 2047;

fn clip_q(q: i32) -> usize {
	q.clamp(0, 127) as usize
}

/// Dequantization steps of one plane kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantPair {
	/// DC step.
	pub dc: u16,
	/// AC step.
	pub ac: u16,
}

/// Per-plane dequantization factors of one segment.
#[derive(Debug, Clone, Copy)]
pub struct DequantFactors {
	/// Luma steps.
	pub y1: QuantPair,
	/// Luma-DC (Y2) steps.
	pub y2: QuantPair,
	/// Chroma steps.
	pub uv: QuantPair,
}

/// Quantizer index deltas signaled in the frame header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuantDeltas {
	/// Luma DC delta.
	pub y1_dc: i32,
	/// Y2 DC delta.
	pub y2_dc: i32,
	/// Y2 AC delta.
	pub y2_ac: i32,
	/// Chroma DC delta.
	pub uv_dc: i32,
	/// Chroma AC delta.
	pub uv_ac: i32,
}

/// Expands a base quantizer index plus header deltas into concrete steps.
pub fn dequant_factors(q_index: i32, deltas: &QuantDeltas) -> DequantFactors {
	let y1 = QuantPair {
		dc: DC_TABLE[clip_q(q_index + deltas.y1_dc)],
		ac: AC_TABLE[clip_q(q_index)],
	};
	let y2 = QuantPair {
		dc: DC_TABLE[clip_q(q_index + deltas.y2_dc)] * 2,
		ac: (u32::from(AC_TABLE[clip_q(q_index + deltas.y2_ac)]) * 155 / 100).max(8) as u16,
	};
	let uv = QuantPair {
		// Chroma DC saturates early to avoid color banding at low quality.
		dc: DC_TABLE[clip_q(q_index + deltas.uv_dc).min(117)],
		ac: AC_TABLE[clip_q(q_index + deltas.uv_ac)],
	};
	DequantFactors { y1, y2, uv }
}

// Frequency sharpening, favoring mid-band energy.
const FREQ_SHARPENING: [u16; 16] = [0, 30, 60, 90, 30, 60, 90, 90, 60, 90, 90, 90, 90, 90, 90, 90];
// Rounding biases per (plane kind, is_ac).
const BIAS_MATRICES: [[u16; 2]; 3] = [[96, 110], [96, 108], [110, 115]];

/// Plane kind selecting bias behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
	/// Luma AC blocks.
	Luma,
	/// The Y2 DC block.
	LumaDc,
	/// Chroma blocks.
	Chroma,
}

/// Encoder-side quantization matrix.
#[derive(Debug, Clone)]
pub struct QuantMatrix {
	/// Dequantization step per raster position.
	pub q: [u16; 16],
	iq: [u32; 16],
	bias: [u32; 16],
	zthresh: [i32; 16],
	sharpen: [i32; 16],
}

impl QuantMatrix {
	/// Builds the matrix for the given DC/AC steps.
	pub fn new(pair: QuantPair, kind: MatrixKind) -> Self {
		let kind_idx = match kind {
			MatrixKind::Luma => 0,
			MatrixKind::LumaDc => 1,
			MatrixKind::Chroma => 2,
		};
		let mut m = Self {
			q: [0; 16],
			iq: [0; 16],
			bias: [0; 16],
			zthresh: [0; 16],
			sharpen: [0; 16],
		};
		for i in 0..16 {
			let is_ac = usize::from(i > 0);
			let step = if is_ac == 1 { pair.ac } else { pair.dc };
			let bias = u32::from(BIAS_MATRICES[kind_idx][is_ac]);
			m.q[i] = step;
			m.iq[i] = (1 << QFIX) / u32::from(step);
			m.bias[i] = bias << (QFIX - 8);
			// Smallest |coefficient| that quantizes away from zero.
			m.zthresh[i] = (((1i64 << QFIX) - 1 - i64::from(m.bias[i])) / i64::from(m.iq[i])) as i32;
			m.sharpen[i] = (i32::from(FREQ_SHARPENING[i]) * i32::from(step)) >> 11;
		}
		m
	}

	/// Quantizes one coefficient at raster position `pos`. Returns the
	/// signed level.
	#[inline]
	pub fn quantize_coeff(&self, v: i32, pos: usize) -> i32 {
		let sign = v < 0;
		let v = v.abs() + self.sharpen[pos];
		if v <= self.zthresh[pos] {
			return 0;
		}
		let level = ((v as u32 * self.iq[pos] + self.bias[pos]) >> QFIX) as i32;
		let level = level.min(MAX_LEVEL);
		if sign { -level } else { level }
	}

	/// Quantizes a raster-order block into zigzag-order levels and writes
	/// the dequantized reconstruction back. Returns true when any level
	/// is non-zero. `first` is 1 for luma blocks whose DC went to Y2.
	pub fn quantize_block(
		&self,
		coeffs: &mut [i16; 16],
		levels: &mut [i16; 16],
		first: usize,
	) -> bool {
		let mut nz = false;
		for n in first..16 {
			let j = ZIGZAG[n];
			let level = self.quantize_coeff(i32::from(coeffs[j]), j);
			levels[n] = level as i16;
			coeffs[j] = (level * i32::from(self.q[j])) as i16;
			nz |= level != 0;
		}
		for n in 0..first {
			levels[n] = 0;
		}
		nz
	}
}

/// Maps a 0..=100 quality factor to a 7-bit quantizer index.
pub fn quality_to_q_index(quality: f32) -> i32 {
	let c = f64::from(quality) / 100.0;
	let linear = if c < 0.75 { c * 2.0 / 3.0 } else { 2.0 * c - 1.0 };
	let v = linear.max(0.0).cbrt();
	(127.0 * (1.0 - v)).round().clamp(0.0, 127.0) as i32
}

/// Rate-distortion multipliers of one segment, derived from its
/// quantizer.
#[derive(Debug, Clone, Copy)]
pub struct Lambdas {
	/// Intra-16x16 mode decision multiplier.
	pub i16x16: u64,
	/// Intra-4x4 mode decision multiplier.
	pub i4x4: u64,
	/// Chroma mode decision multiplier.
	pub uv: u64,
}

impl Lambdas {
	/// Derives the multipliers from the segment's luma AC step.
	pub fn new(ac_step: u16) -> Self {
		let q = u64::from(ac_step);
		Self {
			i16x16: 3 * q * q,
			i4x4: (3 * q * q) >> 7,
			uv: (3 * q * q) >> 6,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_quality_mapping_monotonic() {
		let mut prev = quality_to_q_index(0.0);
		assert_eq!(prev, 127);
		for q in 1..=100 {
			let idx = quality_to_q_index(q as f32);
			assert!(idx <= prev, "quality {q}");
			prev = idx;
		}
		assert_eq!(quality_to_q_index(100.0), 0);
	}

	#[test]
	fn test_quantize_dequantize_error_bounded() {
		let factors = dequant_factors(40, &QuantDeltas::default());
		let m = QuantMatrix::new(factors.y1, MatrixKind::Luma);
		for v in (-1000i32..1000).step_by(37) {
			let level = m.quantize_coeff(v, 5);
			let recon = level * i32::from(m.q[5]);
			// The reconstruction error stays within one step.
			assert!((recon - v).abs() <= i32::from(m.q[5]), "v={v} recon={recon}");
		}
	}

	#[test]
	fn test_zero_threshold_kills_small_coeffs() {
		let factors = dequant_factors(100, &QuantDeltas::default());
		let m = QuantMatrix::new(factors.y1, MatrixKind::Luma);
		assert_eq!(m.quantize_coeff(1, 8), 0);
		assert_eq!(m.quantize_coeff(-2, 8), 0);
	}

	#[test]
	fn test_level_clamp() {
		let factors = dequant_factors(0, &QuantDeltas::default());
		let m = QuantMatrix::new(factors.y1, MatrixKind::Luma);
		assert_eq!(m.quantize_coeff(30000, 1), MAX_LEVEL);
	}

	#[test]
	fn test_y2_ac_floor() {
		let f = dequant_factors(0, &QuantDeltas::default());
		assert!(f.y2.ac >= 8);
		assert_eq!(f.y2.dc, DC_TABLE[0] * 2);
	}
}
