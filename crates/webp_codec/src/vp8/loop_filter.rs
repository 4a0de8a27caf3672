//! In-loop deblocking filters.
//!
//! Edges are described by a starting index, an `across` step (toward the
//! next sample over the edge) and an `along` step (to the next filtered
//! lane). Macroblock edges use the six-tap update unless high edge
//! variance forces the two-tap one; interior edges use the four-tap
//! variant. Limits follow the level/sharpness derivation of the format:
//! `mb_edge_limit = 2*(level+2) + interior`,
//! `sub_edge_limit = 2*level + interior`.

use crate::dsp::clip_8b;

#[inline]
fn sclip1(v: i32) -> i32 {
	v.clamp(-128, 127)
}

#[inline]
fn sclip2(v: i32) -> i32 {
	v.clamp(-16, 15)
}

#[inline]
fn abs_diff(a: u8, b: u8) -> i32 {
	(i32::from(a) - i32::from(b)).abs()
}

// Whether the edge needs the simple filter: |p0-q0|*2 + |p1-q1|/2 <= limit.
fn needs_filter(buf: &[u8], i: usize, across: usize, limit: i32) -> bool {
	let p1 = buf[i - 2 * across];
	let p0 = buf[i - across];
	let q0 = buf[i];
	let q1 = buf[i + across];
	4 * abs_diff(p0, q0) + abs_diff(p1, q1) <= 4 * limit
}

// Full mask of the normal filter: all interior steps small, edge step
// within limit.
fn needs_filter2(buf: &[u8], i: usize, across: usize, limit: i32, interior: i32) -> bool {
	let p3 = buf[i - 4 * across];
	let p2 = buf[i - 3 * across];
	let p1 = buf[i - 2 * across];
	let p0 = buf[i - across];
	let q0 = buf[i];
	let q1 = buf[i + across];
	let q2 = buf[i + 2 * across];
	let q3 = buf[i + 3 * across];
	if 4 * abs_diff(p0, q0) + abs_diff(p1, q1) > 4 * limit {
		return false;
	}
	abs_diff(p3, p2) <= interior
		&& abs_diff(p2, p1) <= interior
		&& abs_diff(p1, p0) <= interior
		&& abs_diff(q3, q2) <= interior
		&& abs_diff(q2, q1) <= interior
		&& abs_diff(q1, q0) <= interior
}

// High edge variance: a strong step right at the edge.
fn hev(buf: &[u8], i: usize, across: usize, thresh: i32) -> bool {
	abs_diff(buf[i - 2 * across], buf[i - across]) > thresh
		|| abs_diff(buf[i + across], buf[i]) > thresh
}

// Two-pixel update used by the simple filter and on high-variance edges.
fn do_filter2(buf: &mut [u8], i: usize, across: usize) {
	let p1 = i32::from(buf[i - 2 * across]);
	let p0 = i32::from(buf[i - across]);
	let q0 = i32::from(buf[i]);
	let q1 = i32::from(buf[i + across]);
	let a = 3 * (q0 - p0) + sclip1(p1 - q1);
	let a1 = sclip2((a + 4) >> 3);
	let a2 = sclip2((a + 3) >> 3);
	buf[i - across] = clip_8b(p0 + a2);
	buf[i] = clip_8b(q0 - a1);
}

// Four-pixel update of interior edges.
fn do_filter4(buf: &mut [u8], i: usize, across: usize) {
	let p1 = i32::from(buf[i - 2 * across]);
	let p0 = i32::from(buf[i - across]);
	let q0 = i32::from(buf[i]);
	let q1 = i32::from(buf[i + across]);
	let a = 3 * (q0 - p0);
	let a1 = sclip2((a + 4) >> 3);
	let a2 = sclip2((a + 3) >> 3);
	let a3 = (a1 + 1) >> 1;
	buf[i - 2 * across] = clip_8b(p1 + a3);
	buf[i - across] = clip_8b(p0 + a2);
	buf[i] = clip_8b(q0 - a1);
	buf[i + across] = clip_8b(q1 - a3);
}

// Six-pixel update of macroblock edges.
fn do_filter6(buf: &mut [u8], i: usize, across: usize) {
	let p2 = i32::from(buf[i - 3 * across]);
	let p1 = i32::from(buf[i - 2 * across]);
	let p0 = i32::from(buf[i - across]);
	let q0 = i32::from(buf[i]);
	let q1 = i32::from(buf[i + across]);
	let q2 = i32::from(buf[i + 2 * across]);
	let a = sclip1(3 * (q0 - p0) + sclip1(p1 - q1));
	let a1 = (27 * a + 63) >> 7;
	let a2 = (18 * a + 63) >> 7;
	let a3 = (9 * a + 63) >> 7;
	buf[i - 3 * across] = clip_8b(p2 + a3);
	buf[i - 2 * across] = clip_8b(p1 + a2);
	buf[i - across] = clip_8b(p0 + a1);
	buf[i] = clip_8b(q0 - a1);
	buf[i + across] = clip_8b(q1 - a2);
	buf[i + 2 * across] = clip_8b(q2 - a3);
}

/// Runs the simple filter along one edge of `count` lanes.
pub fn filter_edge_simple(
	buf: &mut [u8],
	start: usize,
	across: usize,
	along: usize,
	count: usize,
	limit: i32,
) {
	for lane in 0..count {
		let i = start + lane * along;
		if needs_filter(buf, i, across, limit) {
			do_filter2(buf, i, across);
		}
	}
}

/// Runs the normal filter along one edge; `mb_edge` selects the six-tap
/// update for low-variance lanes.
#[allow(clippy::too_many_arguments)]
pub fn filter_edge_normal(
	buf: &mut [u8],
	start: usize,
	across: usize,
	along: usize,
	count: usize,
	limit: i32,
	interior: i32,
	hev_thresh: i32,
	mb_edge: bool,
) {
	for lane in 0..count {
		let i = start + lane * along;
		if needs_filter2(buf, i, across, limit, interior) {
			if hev(buf, i, across, hev_thresh) {
				do_filter2(buf, i, across);
			} else if mb_edge {
				do_filter6(buf, i, across);
			} else {
				do_filter4(buf, i, across);
			}
		}
	}
}

/// Interior limit derived from the filter level and sharpness.
pub fn interior_limit(level: i32, sharpness: i32) -> i32 {
	let mut ilevel = level;
	if sharpness > 0 {
		ilevel >>= if sharpness > 4 { 2 } else { 1 };
		ilevel = ilevel.min(9 - sharpness);
	}
	ilevel.max(1)
}

/// High-edge-variance threshold of a key frame at the given level.
pub fn hev_threshold(level: i32) -> i32 {
	if level >= 40 {
		2
	} else if level >= 15 {
		1
	} else {
		0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// One horizontal lane of 8 samples around an edge at index 4.
	fn lane(values: [u8; 8]) -> Vec<u8> {
		values.to_vec()
	}

	#[test]
	fn test_small_step_gets_smoothed() {
		let mut buf = lane([80, 80, 80, 80, 96, 96, 96, 96]);
		filter_edge_normal(&mut buf, 4, 1, 1, 1, 40, 10, 0, true);
		// The step across the edge must shrink.
		let step_before = 16;
		let step_after = (i32::from(buf[4]) - i32::from(buf[3])).abs();
		assert!(step_after < step_before, "{buf:?}");
	}

	#[test]
	fn test_strong_edge_is_preserved() {
		// A genuine image edge (large step) exceeds the limit and stays.
		let original = [20u8, 20, 20, 20, 220, 220, 220, 220];
		let mut buf = lane(original);
		filter_edge_normal(&mut buf, 4, 1, 1, 1, 20, 5, 1, true);
		assert_eq!(buf, original);
	}

	#[test]
	fn test_simple_filter_touches_two_pixels() {
		let mut buf = lane([100, 100, 100, 100, 110, 110, 110, 110]);
		filter_edge_simple(&mut buf, 4, 1, 1, 1, 30);
		assert_eq!(buf[2], 100);
		assert_eq!(buf[5], 110);
		assert!(buf[3] != 100 || buf[4] != 110);
	}

	#[test]
	fn test_interior_limit_bounds() {
		assert_eq!(interior_limit(63, 0), 63);
		assert_eq!(interior_limit(63, 1), 8);
		assert_eq!(interior_limit(63, 7), 2);
		assert_eq!(interior_limit(0, 0), 1);
	}

	#[test]
	fn test_hev_threshold_steps() {
		assert_eq!(hev_threshold(10), 0);
		assert_eq!(hev_threshold(20), 1);
		assert_eq!(hev_threshold(50), 2);
	}

	#[test]
	fn test_filter_vertical_edge_via_stride() {
		// 8 rows x 1 column image: filter a horizontal edge between rows
		// 3 and 4 using `across = stride`.
		let mut buf = vec![90u8, 90, 90, 90, 104, 104, 104, 104];
		filter_edge_normal(&mut buf, 4, 1, 1, 1, 40, 10, 0, false);
		let inner_changed = buf != vec![90, 90, 90, 90, 104, 104, 104, 104];
		assert!(inner_changed);
	}
}
