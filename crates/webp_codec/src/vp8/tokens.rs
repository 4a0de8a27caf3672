//! Residual coefficient tokens.
//!
//! Coefficients are coded in zigzag order against the probability table
//! indexed by `[block type][band][context][node]`. The same branch walk
//! serves three purposes through the [`CoeffSink`] trait: emitting bits,
//! collecting per-branch statistics for the frame's probability updates,
//! and pricing a block for rate-distortion decisions.

use crate::dsp::bit_cost;
use crate::vp8::bool_coder::{BoolDecoder, BoolEncoder};
use crate::vp8::probs::COEFF_UPDATE_PROBS;
use crate::vp8::quant::QuantPair;
use crate::vp8::tables::{
	CAT1, CAT2, CAT3, CAT4, CAT5, CAT6, COEFF_BANDS, NUM_BANDS, NUM_CTX, NUM_PROBAS, NUM_TYPES,
	ZIGZAG,
};

/// Probability table of one block type.
pub type TypeProbs = [[[u8; NUM_PROBAS]; NUM_CTX]; NUM_BANDS];
/// Full coefficient probability table.
pub type CoeffProbs = [TypeProbs; NUM_TYPES];

const CAT3456: [&[u8]; 4] = [&CAT3, &CAT4, &CAT5, &CAT6];

/// Decodes the coefficients of one block starting at position `first`
/// with left+top context `ctx0`, dequantizing into raster order.
/// Returns the end position (number of coded positions).
pub fn get_coeffs(
	dec: &mut BoolDecoder<'_>,
	probs: &TypeProbs,
	first: usize,
	ctx0: usize,
	dq: QuantPair,
	out: &mut [i16; 16],
) -> usize {
	let mut n = first;
	let mut p = &probs[COEFF_BANDS[n]][ctx0];
	while n < 16 {
		if !dec.get_bool(p[0]) {
			return n; // end of block
		}
		// Zero run: the end-of-block check is skipped after a zero.
		while !dec.get_bool(p[1]) {
			n += 1;
			if n == 16 {
				return 16;
			}
			p = &probs[COEFF_BANDS[n]][0];
		}
		let (v, next_ctx) = if !dec.get_bool(p[2]) {
			(1, 1)
		} else {
			(get_large_value(dec, p), 2)
		};
		let value = if dec.get_flag() { -v } else { v };
		let q = if n == 0 { dq.dc } else { dq.ac };
		out[ZIGZAG[n]] = (value * i32::from(q)) as i16;
		n += 1;
		if n == 16 {
			return 16;
		}
		p = &probs[COEFF_BANDS[n]][next_ctx];
	}
	16
}

fn get_large_value(dec: &mut BoolDecoder<'_>, p: &[u8; NUM_PROBAS]) -> i32 {
	if !dec.get_bool(p[3]) {
		// 2, 3 or 4
		if !dec.get_bool(p[4]) {
			2
		} else {
			3 + i32::from(dec.get_bool(p[5]))
		}
	} else if !dec.get_bool(p[6]) {
		if !dec.get_bool(p[7]) {
			5 + i32::from(dec.get_bool(CAT1[0]))
		} else {
			7 + 2 * i32::from(dec.get_bool(CAT2[0])) + i32::from(dec.get_bool(CAT2[1]))
		}
	} else {
		let bit1 = usize::from(dec.get_bool(p[8]));
		let bit0 = usize::from(dec.get_bool(p[9 + bit1]));
		let cat = 2 * bit1 + bit0;
		let mut v = 0;
		for &prob in CAT3456[cat] {
			v = 2 * v + i32::from(dec.get_bool(prob));
		}
		v + 3 + (8 << cat)
	}
}

/// Where the coefficient branch walk sends its decisions.
pub trait CoeffSink {
	/// One adaptive-probability branch at `(band, ctx, node)`.
	fn put(&mut self, bit: bool, band: usize, ctx: usize, node: usize);
	/// One fixed-probability bit (signs, category extra bits).
	fn fixed(&mut self, bit: bool, prob: u8);
}

/// Sink writing real bits through the boolean encoder.
pub struct EncoderSink<'a, 'b> {
	enc: &'a mut BoolEncoder,
	probs: &'b TypeProbs,
}

impl<'a, 'b> EncoderSink<'a, 'b> {
	/// Binds the encoder to the probabilities of one block type.
	pub fn new(enc: &'a mut BoolEncoder, probs: &'b TypeProbs) -> Self {
		Self { enc, probs }
	}
}

impl CoeffSink for EncoderSink<'_, '_> {
	fn put(&mut self, bit: bool, band: usize, ctx: usize, node: usize) {
		self.enc.put_bool(bit, self.probs[band][ctx][node]);
	}

	fn fixed(&mut self, bit: bool, prob: u8) {
		self.enc.put_bool(bit, prob);
	}
}

/// Per-branch `(zeros, total)` counters of one block type.
pub type TypeStats = [[[[u32; 2]; NUM_PROBAS]; NUM_CTX]; NUM_BANDS];
/// Statistics of all block types.
pub type CoeffStats = [TypeStats; NUM_TYPES];

/// Fresh all-zero statistics.
pub fn new_stats() -> CoeffStats {
	[[[[[0; 2]; NUM_PROBAS]; NUM_CTX]; NUM_BANDS]; NUM_TYPES]
}

/// Sink that only counts branch outcomes.
pub struct StatsSink<'a> {
	stats: &'a mut TypeStats,
}

impl<'a> StatsSink<'a> {
	/// Binds the statistics of one block type.
	pub fn new(stats: &'a mut TypeStats) -> Self {
		Self { stats }
	}
}

impl CoeffSink for StatsSink<'_> {
	fn put(&mut self, bit: bool, band: usize, ctx: usize, node: usize) {
		let slot = &mut self.stats[band][ctx][node];
		slot[0] += u32::from(!bit);
		slot[1] += 1;
	}

	fn fixed(&mut self, _bit: bool, _prob: u8) {}
}

/// Sink accumulating the exact bit cost (in 1/256 bit units).
pub struct CostSink<'a> {
	probs: &'a TypeProbs,
	/// Accumulated cost.
	pub cost: u64,
}

impl<'a> CostSink<'a> {
	/// Starts a zero-cost accumulator over one block type's probabilities.
	pub fn new(probs: &'a TypeProbs) -> Self {
		Self { probs, cost: 0 }
	}
}

impl CoeffSink for CostSink<'_> {
	fn put(&mut self, bit: bool, band: usize, ctx: usize, node: usize) {
		self.cost += u64::from(bit_cost(bit, self.probs[band][ctx][node]));
	}

	fn fixed(&mut self, bit: bool, prob: u8) {
		self.cost += u64::from(bit_cost(bit, prob));
	}
}

/// Runs the coefficient branch walk over zigzag-order `levels`,
/// mirroring [`get_coeffs`] exactly. Returns true when any level is
/// non-zero.
pub fn code_coeffs<S: CoeffSink>(sink: &mut S, levels: &[i16; 16], first: usize, ctx0: usize) -> bool {
	let last = (first..16).rev().find(|&n| levels[n] != 0);
	let Some(last) = last else {
		sink.put(false, COEFF_BANDS[first], ctx0, 0);
		return false;
	};

	let mut n = first;
	let mut ctx = ctx0;
	loop {
		sink.put(true, COEFF_BANDS[n], ctx, 0);
		// Zero run up to the next non-zero level.
		while levels[n] == 0 {
			sink.put(false, COEFF_BANDS[n], ctx, 1);
			n += 1;
			ctx = 0;
		}
		sink.put(true, COEFF_BANDS[n], ctx, 1);

		let v = i32::from(levels[n]).unsigned_abs() as i32;
		if v == 1 {
			sink.put(false, COEFF_BANDS[n], ctx, 2);
		} else {
			sink.put(true, COEFF_BANDS[n], ctx, 2);
			put_large_value(sink, v, COEFF_BANDS[n], ctx);
		}
		sink.fixed(levels[n] < 0, 128);
		let next_ctx = if v == 1 { 1 } else { 2 };

		if n == last {
			if n + 1 < 16 {
				sink.put(false, COEFF_BANDS[n + 1], next_ctx, 0);
			}
			return true;
		}
		n += 1;
		ctx = next_ctx;
	}
}

fn put_large_value<S: CoeffSink>(sink: &mut S, v: i32, band: usize, ctx: usize) {
	debug_assert!(v >= 2);
	if v <= 4 {
		sink.put(false, band, ctx, 3);
		if v == 2 {
			sink.put(false, band, ctx, 4);
		} else {
			sink.put(true, band, ctx, 4);
			sink.put(v == 4, band, ctx, 5);
		}
	} else {
		sink.put(true, band, ctx, 3);
		if v <= 10 {
			sink.put(false, band, ctx, 6);
			if v <= 6 {
				sink.put(false, band, ctx, 7);
				sink.fixed(v == 6, CAT1[0]);
			} else {
				sink.put(true, band, ctx, 7);
				let r = v - 7;
				sink.fixed(r >> 1 & 1 != 0, CAT2[0]);
				sink.fixed(r & 1 != 0, CAT2[1]);
			}
		} else {
			sink.put(true, band, ctx, 6);
			let cat = match v {
				11..=18 => 0usize,
				19..=34 => 1,
				35..=66 => 2,
				_ => 3,
			};
			sink.put(cat >= 2, band, ctx, 8);
			sink.put(cat & 1 != 0, band, ctx, 9 + usize::from(cat >= 2));
			let residue = v - 3 - (8 << cat);
			let table = CAT3456[cat];
			for (i, &prob) in table.iter().enumerate() {
				sink.fixed(residue >> (table.len() - 1 - i) & 1 != 0, prob);
			}
		}
	}
}

/// Derives updated probabilities from collected statistics, keeping the
/// baseline where a branch was never visited.
pub fn probs_from_stats(baseline: &CoeffProbs, stats: &CoeffStats) -> CoeffProbs {
	let mut out = *baseline;
	for t in 0..NUM_TYPES {
		for b in 0..NUM_BANDS {
			for c in 0..NUM_CTX {
				for p in 0..NUM_PROBAS {
					let [zeros, total] = stats[t][b][c][p];
					if total > 0 {
						let prob = (255 * u64::from(zeros) / u64::from(total)) as u8;
						out[t][b][c][p] = prob.clamp(1, 255);
					}
				}
			}
		}
	}
	out
}

/// Writes the per-frame probability refresh flags, updating `current` in
/// place with the values actually signaled. An update is emitted only
/// when the statistics say it pays for its own signaling.
pub fn write_prob_updates(
	enc: &mut BoolEncoder,
	current: &mut CoeffProbs,
	proposed: &CoeffProbs,
	stats: &CoeffStats,
) {
	for t in 0..NUM_TYPES {
		for b in 0..NUM_BANDS {
			for c in 0..NUM_CTX {
				for p in 0..NUM_PROBAS {
					let update_prob = COEFF_UPDATE_PROBS[t][b][c][p];
					let old = current[t][b][c][p];
					let new = proposed[t][b][c][p];
					let [zeros, total] = stats[t][b][c][p];
					let ones = total - zeros;
					let use_update = new != old && total > 0 && {
						let old_cost = u64::from(zeros) * u64::from(bit_cost(false, old))
							+ u64::from(ones) * u64::from(bit_cost(true, old));
						let new_cost = u64::from(zeros) * u64::from(bit_cost(false, new))
							+ u64::from(ones) * u64::from(bit_cost(true, new))
							+ 8 * 256 + u64::from(bit_cost(true, update_prob));
						new_cost < old_cost
					};
					enc.put_bool(use_update, update_prob);
					if use_update {
						enc.put_literal(u32::from(new), 8);
						current[t][b][c][p] = new;
					}
				}
			}
		}
	}
}

/// Reads the per-frame probability refresh flags.
pub fn read_prob_updates(dec: &mut BoolDecoder<'_>, probs: &mut CoeffProbs) {
	for t in 0..NUM_TYPES {
		for b in 0..NUM_BANDS {
			for c in 0..NUM_CTX {
				for p in 0..NUM_PROBAS {
					if dec.get_bool(COEFF_UPDATE_PROBS[t][b][c][p]) {
						probs[t][b][c][p] = dec.get_literal(8) as u8;
					}
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vp8::probs::COEFF_PROBS;

	fn round_trip_levels(levels: [i16; 16], first: usize, ctx: usize) {
		let probs = &COEFF_PROBS[1];
		let mut enc = BoolEncoder::new();
		{
			let mut sink = EncoderSink::new(&mut enc, probs);
			code_coeffs(&mut sink, &levels, first, ctx);
		}
		let bytes = enc.finish();

		let dq = QuantPair { dc: 1, ac: 1 };
		let mut dec = BoolDecoder::new(&bytes);
		let mut out = [0i16; 16];
		get_coeffs(&mut dec, probs, first, ctx, dq, &mut out);

		// With unit quantizers the raster output equals the zigzag input.
		let mut expect = [0i16; 16];
		for n in 0..16 {
			expect[ZIGZAG[n]] = levels[n];
		}
		assert_eq!(out, expect, "levels {levels:?}");
	}

	#[test]
	fn test_residual_round_trip() {
		round_trip_levels([0; 16], 0, 0);
		round_trip_levels([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 0, 1);
		round_trip_levels([-3, 5, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, -1], 0, 2);
		round_trip_levels([60, -2, 7, 0, 0, 0, 11, 0, 19, 0, 0, 35, 0, 0, 0, 67], 0, 0);
		round_trip_levels([0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 1, 0);
		round_trip_levels([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2047], 0, 0);
	}

	#[test]
	fn test_all_category_ranges() {
		for v in [2i16, 3, 4, 5, 6, 7, 10, 11, 18, 19, 34, 35, 66, 67, 500, 2047] {
			let mut levels = [0i16; 16];
			levels[0] = v;
			levels[3] = -v;
			round_trip_levels(levels, 0, 0);
		}
	}

	#[test]
	fn test_cost_matches_stream_size_roughly() {
		let probs = &COEFF_PROBS[0];
		let levels: [i16; 16] = [9, -1, 3, 0, 0, 2, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];

		let mut cost_sink = CostSink::new(probs);
		code_coeffs(&mut cost_sink, &levels, 0, 0);

		let mut enc = BoolEncoder::new();
		for _ in 0..64 {
			let mut sink = EncoderSink::new(&mut enc, probs);
			code_coeffs(&mut sink, &levels, 0, 0);
		}
		let bytes = enc.finish();
		let actual_bits = bytes.len() as f64 * 8.0 / 64.0;
		let estimated_bits = cost_sink.cost as f64 / 256.0;
		assert!(
			(actual_bits - estimated_bits).abs() < 2.0,
			"estimated {estimated_bits}, actual {actual_bits}"
		);
	}

	#[test]
	fn test_stats_drive_updates() {
		let mut stats = new_stats();
		{
			let mut sink = StatsSink::new(&mut stats[0]);
			// A stream of empty blocks: the end-of-block branch is always
			// zero.
			for _ in 0..1000 {
				code_coeffs(&mut sink, &[0; 16], 0, 0);
			}
		}
		let baseline = COEFF_PROBS;
		let proposed = probs_from_stats(&baseline, &stats);
		assert_eq!(proposed[0][0][0][0], 255);

		let mut enc = BoolEncoder::new();
		let mut current = baseline;
		write_prob_updates(&mut enc, &mut current, &proposed, &stats);
		let bytes = enc.finish();

		let mut dec = BoolDecoder::new(&bytes);
		let mut decoded = baseline;
		read_prob_updates(&mut dec, &mut decoded);
		assert_eq!(decoded, current);
	}
}
