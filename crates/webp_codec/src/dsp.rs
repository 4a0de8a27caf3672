//! Shared scalar kernels: clipping and entropy-cost lookup tables.
//!
//! These are the only pieces of process-wide state in the crate. Both
//! tables live behind `OnceLock`, so initialization is idempotent and
//! re-entry is a no-op.

use std::sync::OnceLock;

/// Clip range covered by the table: inputs in `-255..=510`.
const CLIP_MIN: i32 = -255;
const CLIP_MAX: i32 = 510;

static CLIP_TABLE: OnceLock<Vec<u8>> = OnceLock::new();

fn clip_table() -> &'static [u8] {
	CLIP_TABLE.get_or_init(|| {
		(CLIP_MIN..=CLIP_MAX)
			.map(|v| v.clamp(0, 255) as u8)
			.collect()
	})
}

/// Clamps `v` to `[0, 255]`.
///
/// Values inside `-255..=510` (the range produced by the prediction and
/// reconstruction sums) go through the shared table; anything else takes
/// the slow path.
#[inline]
pub fn clip_8b(v: i32) -> u8 {
	if (CLIP_MIN..=CLIP_MAX).contains(&v) {
		clip_table()[(v - CLIP_MIN) as usize]
	} else if v < 0 {
		0
	} else {
		255
	}
}

static ENTROPY_COST: OnceLock<[u16; 256]> = OnceLock::new();

/// Cost in 1/256th of a bit of coding a zero-bit with probability `p`.
///
/// `cost(p) = -256 * log2(p / 256)`, with `cost(0)` pinned to the maximum
/// so degenerate probabilities never look free.
pub fn entropy_cost(p: u8) -> u16 {
	let table = ENTROPY_COST.get_or_init(|| {
		let mut t = [0u16; 256];
		for (p, slot) in t.iter_mut().enumerate() {
			let p = if p == 0 { 1.0 } else { p as f64 };
			*slot = (-256.0 * (p / 256.0).log2()).round() as u16;
		}
		t
	});
	table[p as usize]
}

/// Cost of coding bit `b` under probability-of-zero `p`.
#[inline]
pub fn bit_cost(b: bool, p: u8) -> u32 {
	u32::from(if b { entropy_cost(255 - p) } else { entropy_cost(p) })
}

/// Sum of squared differences between two equally sized slices.
pub fn sse(a: &[u8], b: &[u8]) -> u64 {
	a.iter()
		.zip(b)
		.map(|(&x, &y)| {
			let d = i64::from(x) - i64::from(y);
			(d * d) as u64
		})
		.sum()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_clip_matches_clamp() {
		for v in -600..900 {
			assert_eq!(clip_8b(v), v.clamp(0, 255) as u8);
		}
	}

	#[test]
	fn test_entropy_cost_monotonic() {
		// Higher probability of the coded symbol means fewer bits.
		assert!(entropy_cost(255) < entropy_cost(128));
		assert!(entropy_cost(128) < entropy_cost(1));
		// A fair coin costs one bit.
		assert_eq!(entropy_cost(128), 256);
	}

	#[test]
	fn test_bit_cost_symmetry() {
		assert_eq!(bit_cost(false, 128), bit_cost(true, 128));
		assert!(bit_cost(true, 250) > bit_cost(false, 250));
	}
}
