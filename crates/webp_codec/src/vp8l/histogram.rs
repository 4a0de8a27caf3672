//! Symbol statistics and entropy estimation for the lossless encoder.
//!
//! Costs are Shannon estimates computed with a table-backed `fast_log2`,
//! good enough to steer transform selection, color-cache sizing and the
//! greedy meta-Huffman clustering without building actual codes.

use std::sync::OnceLock;

use crate::vp8l::backref::{PixToken, length_prefix_code};
use crate::vp8l::NUM_DISTANCE_CODES;
use crate::vp8l::NUM_LENGTH_CODES;
use crate::vp8l::NUM_LITERAL_CODES;

static LOG2_TABLE: OnceLock<[f64; 256]> = OnceLock::new();

/// Table-accelerated `log2(v)`, exact for `v < 256`.
pub fn fast_log2(v: u32) -> f64 {
	let table = LOG2_TABLE.get_or_init(|| {
		let mut t = [0.0; 256];
		for (i, slot) in t.iter_mut().enumerate().skip(1) {
			*slot = (i as f64).log2();
		}
		t
	});
	if v < 256 {
		table[v as usize]
	} else {
		let shift = 32 - v.leading_zeros() - 8;
		table[(v >> shift) as usize] + f64::from(shift)
	}
}

// Shannon entropy of one frequency array, in bits.
fn bits_entropy(counts: &[u32]) -> f64 {
	let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
	if total == 0 {
		return 0.0;
	}
	let mut sum = 0.0;
	for &c in counts {
		if c > 0 {
			sum += f64::from(c) * fast_log2(c);
		}
	}
	let total_log = total as f64 * (total as f64).log2();
	(total_log - sum).max(0.0)
}

/// Per-channel symbol counts of one tile cluster.
#[derive(Debug, Clone)]
pub struct Histogram {
	/// Green literals + length prefixes + cache indices.
	pub literal: Vec<u32>,
	/// Red channel literals.
	pub red: [u32; 256],
	/// Blue channel literals.
	pub blue: [u32; 256],
	/// Alpha channel literals.
	pub alpha: [u32; 256],
	/// Distance prefix symbols.
	pub distance: [u32; NUM_DISTANCE_CODES],
	/// Extra bits spent by length/distance codes.
	pub extra_bits: u64,
}

impl Histogram {
	/// Empty histogram for the given cache size.
	pub fn new(cache_bits: u8) -> Self {
		let cache_size = if cache_bits == 0 { 0 } else { 1usize << cache_bits };
		Self {
			literal: vec![0; NUM_LITERAL_CODES + NUM_LENGTH_CODES + cache_size],
			red: [0; 256],
			blue: [0; 256],
			alpha: [0; 256],
			distance: [0; NUM_DISTANCE_CODES],
			extra_bits: 0,
		}
	}

	/// Records one token.
	pub fn add(&mut self, token: &PixToken) {
		match *token {
			PixToken::Literal(argb) => {
				self.alpha[(argb >> 24) as usize] += 1;
				self.red[(argb >> 16 & 0xff) as usize] += 1;
				self.literal[(argb >> 8 & 0xff) as usize] += 1;
				self.blue[(argb & 0xff) as usize] += 1;
			}
			PixToken::CacheIdx(idx) => {
				self.literal[NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize] += 1;
			}
			PixToken::Copy { len, dist_code } => {
				let (sym, extra, _) = length_prefix_code(len);
				self.literal[NUM_LITERAL_CODES + sym as usize] += 1;
				self.extra_bits += u64::from(extra);
				let (dsym, dextra, _) = length_prefix_code(dist_code);
				self.distance[dsym as usize] += 1;
				self.extra_bits += u64::from(dextra);
			}
		}
	}

	/// Merges another histogram into this one.
	pub fn merge(&mut self, other: &Histogram) {
		debug_assert_eq!(self.literal.len(), other.literal.len());
		for (a, b) in self.literal.iter_mut().zip(&other.literal) {
			*a += b;
		}
		for (a, b) in self.red.iter_mut().zip(&other.red) {
			*a += b;
		}
		for (a, b) in self.blue.iter_mut().zip(&other.blue) {
			*a += b;
		}
		for (a, b) in self.alpha.iter_mut().zip(&other.alpha) {
			*a += b;
		}
		for (a, b) in self.distance.iter_mut().zip(&other.distance) {
			*a += b;
		}
		self.extra_bits += other.extra_bits;
	}

	/// Estimated cost in bits of coding all recorded symbols.
	pub fn estimate_bits(&self) -> f64 {
		bits_entropy(&self.literal)
			+ bits_entropy(&self.red)
			+ bits_entropy(&self.blue)
			+ bits_entropy(&self.alpha)
			+ bits_entropy(&self.distance)
			+ self.extra_bits as f64
	}
}

/// Greedily merges `histograms` until at most `max_clusters` remain or no
/// merge saves bits. Returns the clusters and, for each input, the cluster
/// index it got folded into.
pub fn cluster_histograms(
	histograms: Vec<Histogram>,
	max_clusters: usize,
) -> (Vec<Histogram>, Vec<u16>) {
	let mut clusters: Vec<Option<Histogram>> = histograms.into_iter().map(Some).collect();
	let mut mapping: Vec<u16> = (0..clusters.len() as u16).collect();
	let mut costs: Vec<f64> = clusters
		.iter()
		.map(|h| h.as_ref().map_or(0.0, Histogram::estimate_bits))
		.collect();
	let mut alive: Vec<usize> = (0..clusters.len()).collect();

	while alive.len() > 1 {
		let mut best: Option<(f64, usize, usize)> = None;
		for (ai, &a) in alive.iter().enumerate() {
			for &b in &alive[ai + 1..] {
				let mut merged = clusters[a].clone().unwrap();
				merged.merge(clusters[b].as_ref().unwrap());
				let delta = merged.estimate_bits() - costs[a] - costs[b];
				if best.is_none_or(|(d, _, _)| delta < d) {
					best = Some((delta, a, b));
				}
			}
		}
		let Some((delta, a, b)) = best else { break };
		if delta >= 0.0 && alive.len() <= max_clusters {
			break;
		}
		let other = clusters[b].take().unwrap();
		let target = clusters[a].as_mut().unwrap();
		target.merge(&other);
		costs[a] = target.estimate_bits();
		for m in mapping.iter_mut() {
			if *m == b as u16 {
				*m = a as u16;
			}
		}
		alive.retain(|&i| i != b);
	}

	// Compact the surviving clusters.
	let mut out = Vec::new();
	let mut remap = vec![0u16; clusters.len()];
	for (new_idx, &old_idx) in alive.iter().enumerate() {
		remap[old_idx] = new_idx as u16;
		out.push(clusters[old_idx].take().unwrap());
	}
	for m in mapping.iter_mut() {
		*m = remap[*m as usize];
	}
	(out, mapping)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fast_log2_accuracy() {
		for v in [1u32, 2, 7, 255, 256, 1000, 65536, 1 << 20] {
			let exact = f64::from(v).log2();
			assert!((fast_log2(v) - exact).abs() < 0.01, "log2({v})");
		}
	}

	#[test]
	fn test_entropy_of_uniform() {
		// 256 equally likely symbols cost 8 bits each.
		let counts = [4u32; 256];
		let bits = bits_entropy(&counts);
		assert!((bits - 1024.0 * 8.0).abs() < 1.0);
	}

	#[test]
	fn test_single_symbol_is_free() {
		let mut counts = [0u32; 256];
		counts[42] = 1000;
		assert!(bits_entropy(&counts) < 1.0);
	}

	#[test]
	fn test_clustering_merges_identical() {
		let mut h = Histogram::new(0);
		for i in 0..100u32 {
			h.add(&PixToken::Literal(0xff00_0000 | (i % 7) << 8));
		}
		let inputs = vec![h.clone(), h.clone(), h];
		let (clusters, mapping) = cluster_histograms(inputs, 8);
		// Identical histograms merge for free.
		assert_eq!(clusters.len(), 1);
		assert!(mapping.iter().all(|&m| m == 0));
	}
}
