//! Canonical prefix codes for the lossless entropy layer.
//!
//! The encoder builds depth-limited code lengths with the package-merge
//! algorithm (cap 15), converts them to canonical codes emitted
//! bit-reversed for the LSB-first stream, and serializes the lengths with
//! the RLE code-length alphabet (symbols 16/17/18 with offsets 3/3/11 and
//! up to 138 zeros per token). The decoder rebuilds the codes into a
//! two-level lookup table with an 8-bit root.

use crate::error::DecodingError;
use crate::vp8l::bits::{LBitReader, LBitWriter};

/// Longest code length the bitstream allows.
pub const MAX_CODE_LENGTH: u8 = 15;
/// Number of symbols in the code-length alphabet.
pub const CODE_LENGTH_CODES: usize = 19;
/// Root table size is `1 << ROOT_BITS`.
const ROOT_BITS: u8 = 8;

/// Storage order of the code-length-code lengths in the stream.
pub const CODE_LENGTH_ORDER: [usize; CODE_LENGTH_CODES] = [
	17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

// ---------------------------------------------------------------------------
// Code construction (encoder side)

/// Computes optimal depth-limited code lengths with package-merge.
///
/// Symbols with zero frequency get length 0. A single used symbol gets
/// length 1 (the stream encodes it as a simple code and the decoder spends
/// zero bits per symbol).
pub fn build_code_lengths(freqs: &[u32], max_depth: u8) -> Vec<u8> {
	let mut lengths = vec![0u8; freqs.len()];
	let mut leaves: Vec<(u64, usize)> = freqs
		.iter()
		.enumerate()
		.filter(|&(_, &f)| f > 0)
		.map(|(i, &f)| (u64::from(f), i))
		.collect();

	match leaves.len() {
		0 => return lengths,
		1 => {
			lengths[leaves[0].1] = 1;
			return lengths;
		}
		2 => {
			lengths[leaves[0].1] = 1;
			lengths[leaves[1].1] = 1;
			return lengths;
		}
		_ => {}
	}
	assert!(leaves.len() <= 1 << max_depth);
	leaves.sort_unstable();

	// Package-merge: repeatedly pair the cheapest items of the previous
	// level with the leaf list, `max_depth` levels deep. Counting how
	// often a leaf appears in the first 2n-2 packages of the final level
	// yields its depth.
	type Package = (u64, Vec<usize>);
	let singles: Vec<Package> = leaves.iter().map(|&(w, s)| (w, vec![s])).collect();
	let mut level: Vec<Package> = singles.clone();

	for _ in 1..max_depth {
		let mut paired: Vec<Package> = Vec::with_capacity(level.len() / 2);
		for pair in level.chunks_exact(2) {
			let mut syms = pair[0].1.clone();
			syms.extend_from_slice(&pair[1].1);
			paired.push((pair[0].0 + pair[1].0, syms));
		}
		// Merge the fresh leaves with the packaged pairs, keeping weight order.
		let mut merged = Vec::with_capacity(singles.len() + paired.len());
		let (mut i, mut j) = (0, 0);
		while i < singles.len() || j < paired.len() {
			let take_single = match (singles.get(i), paired.get(j)) {
				(Some(a), Some(b)) => a.0 <= b.0,
				(Some(_), None) => true,
				_ => false,
			};
			if take_single {
				merged.push(singles[i].clone());
				i += 1;
			} else {
				merged.push(paired[j].clone());
				j += 1;
			}
		}
		level = merged;
	}

	for package in level.iter().take(2 * leaves.len() - 2) {
		for &sym in &package.1 {
			lengths[sym] += 1;
		}
	}
	lengths
}

/// Converts code lengths into canonical codes, bit-reversed for LSB-first
/// emission.
pub fn lengths_to_codes(lengths: &[u8]) -> Vec<u16> {
	let mut depth_count = [0u32; MAX_CODE_LENGTH as usize + 1];
	for &l in lengths {
		depth_count[l as usize] += 1;
	}
	depth_count[0] = 0;

	let mut next_code = [0u32; MAX_CODE_LENGTH as usize + 1];
	let mut code = 0;
	for len in 1..=MAX_CODE_LENGTH as usize {
		code = (code + depth_count[len - 1]) << 1;
		next_code[len] = code;
	}

	lengths
		.iter()
		.map(|&len| {
			if len == 0 {
				return 0;
			}
			let code = next_code[len as usize];
			next_code[len as usize] += 1;
			(code as u16).reverse_bits() >> (16 - len)
		})
		.collect()
}

/// One RLE token of the serialized code-length sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LengthToken {
	code: u8,
	extra: u8,
}

// Symbols 0..=15 are literal depths; 16 repeats the previous depth 3..=6
// times, 17 emits 3..=10 zeros, 18 emits 11..=138 zeros.
fn tokenize_lengths(lengths: &[u8]) -> Vec<LengthToken> {
	let mut tokens = Vec::new();
	let mut prev_value = 8u8;
	let mut i = 0;
	while i < lengths.len() {
		let value = lengths[i];
		let mut k = i + 1;
		while k < lengths.len() && lengths[k] == value {
			k += 1;
		}
		let mut runs = k - i;
		i = k;

		if value == 0 {
			while runs >= 1 {
				if runs < 3 {
					for _ in 0..runs {
						tokens.push(LengthToken { code: 0, extra: 0 });
					}
					break;
				} else if runs < 11 {
					tokens.push(LengthToken {
						code: 17,
						extra: (runs - 3) as u8,
					});
					break;
				} else if runs < 139 {
					tokens.push(LengthToken {
						code: 18,
						extra: (runs - 11) as u8,
					});
					break;
				} else {
					tokens.push(LengthToken {
						code: 18,
						extra: 0x7f,
					});
					runs -= 138;
				}
			}
		} else {
			if value != prev_value {
				tokens.push(LengthToken { code: value, extra: 0 });
				runs -= 1;
				prev_value = value;
			}
			while runs >= 1 {
				if runs < 3 {
					for _ in 0..runs {
						tokens.push(LengthToken { code: value, extra: 0 });
					}
					break;
				} else if runs < 7 {
					tokens.push(LengthToken {
						code: 16,
						extra: (runs - 3) as u8,
					});
					break;
				} else {
					tokens.push(LengthToken { code: 16, extra: 3 });
					runs -= 6;
				}
			}
		}
	}
	tokens
}

/// Writes a 1- or 2-symbol simple code.
pub fn write_simple_code(w: &mut LBitWriter, symbols: &[u16]) {
	debug_assert!(!symbols.is_empty() && symbols.len() <= 2);
	w.write_bits(1, 1); // simple code
	w.write_bits(symbols.len() as u64 - 1, 1);
	if symbols.len() == 1 && symbols[0] <= 1 {
		w.write_bits(0, 1); // first symbol in one bit
		w.write_bits(u64::from(symbols[0]), 1);
	} else {
		w.write_bits(1, 1);
		w.write_bits(u64::from(symbols[0]), 8);
	}
	if symbols.len() == 2 {
		w.write_bits(u64::from(symbols[1]), 8);
	}
}

/// Serializes a full set of code lengths, choosing the simple form when
/// at most two symbols are used and their values fit eight bits.
pub fn write_code_lengths(w: &mut LBitWriter, lengths: &[u8]) {
	let used: Vec<u16> = lengths
		.iter()
		.enumerate()
		.filter(|&(_, &l)| l > 0)
		.map(|(i, _)| i as u16)
		.collect();
	if used.is_empty() {
		// An unused tree still needs a parsable entry.
		write_simple_code(w, &[0]);
		return;
	}
	if used.len() <= 2 && used.iter().all(|&s| s < 256) {
		write_simple_code(w, &used);
		return;
	}

	let tokens = tokenize_lengths(lengths);
	let mut cl_freqs = [0u32; CODE_LENGTH_CODES];
	for t in &tokens {
		cl_freqs[t.code as usize] += 1;
	}
	let cl_lengths = build_code_lengths(&cl_freqs, 7);
	let cl_codes = lengths_to_codes(&cl_lengths);
	let single_cl = cl_lengths.iter().filter(|&&l| l > 0).count() == 1;

	w.write_bits(0, 1); // normal code
	w.write_bits(CODE_LENGTH_CODES as u64 - 4, 4);
	for &i in CODE_LENGTH_ORDER.iter() {
		if single_cl && cl_lengths[i] > 0 {
			w.write_bits(1, 3);
		} else {
			w.write_bits(u64::from(cl_lengths[i]), 3);
		}
	}
	w.write_bits(0, 1); // no explicit max-symbol

	for t in &tokens {
		if !single_cl {
			w.write_bits(
				u64::from(cl_codes[t.code as usize]),
				cl_lengths[t.code as usize],
			);
		}
		match t.code {
			16 => w.write_bits(u64::from(t.extra), 2),
			17 => w.write_bits(u64::from(t.extra), 3),
			18 => w.write_bits(u64::from(t.extra), 7),
			_ => {}
		}
	}
}

// ---------------------------------------------------------------------------
// Decode tables (decoder side)

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
	/// Code length; for root entries pointing at a second level this is
	/// `ROOT_BITS + sub_bits`, for degenerate single-symbol codes it is 0.
	bits: u8,
	/// Decoded symbol, or offset of the second-level table.
	value: u16,
}

/// Two-level canonical Huffman decode table.
#[derive(Debug, Clone)]
pub struct HuffmanTable {
	entries: Vec<Entry>,
}

impl HuffmanTable {
	/// Table that decodes a single symbol without consuming bits.
	pub fn single_symbol(symbol: u16) -> Self {
		Self {
			entries: vec![
				Entry {
					bits: 0,
					value: symbol,
				};
				1 << ROOT_BITS
			],
		}
	}

	/// Builds the table from per-symbol code lengths.
	pub fn build(code_lengths: &[u8]) -> Result<Self, DecodingError> {
		let mut counts = [0u32; MAX_CODE_LENGTH as usize + 1];
		for &l in code_lengths {
			if l > MAX_CODE_LENGTH {
				return Err(DecodingError::BitstreamError("code length exceeds 15"));
			}
			counts[l as usize] += 1;
		}
		let used = code_lengths.len() - counts[0] as usize;
		match used {
			0 => return Err(DecodingError::BitstreamError("empty huffman code")),
			1 => {
				let sym = code_lengths.iter().position(|&l| l > 0).unwrap();
				return Ok(Self::single_symbol(sym as u16));
			}
			_ => {}
		}

		// The code must fill its space exactly.
		let mut space = 0u64;
		for len in 1..=MAX_CODE_LENGTH as usize {
			space += u64::from(counts[len]) << (MAX_CODE_LENGTH as usize - len);
		}
		if space != 1 << MAX_CODE_LENGTH {
			return Err(DecodingError::BitstreamError(
				"over- or under-subscribed huffman code",
			));
		}

		// Symbols in canonical order: by length, then by value.
		let mut offsets = [0usize; MAX_CODE_LENGTH as usize + 2];
		for len in 1..=MAX_CODE_LENGTH as usize {
			offsets[len + 1] = offsets[len] + counts[len] as usize;
		}
		let mut sorted = vec![0u16; used];
		for (sym, &len) in code_lengths.iter().enumerate() {
			if len > 0 {
				sorted[offsets[len as usize]] = sym as u16;
				offsets[len as usize] += 1;
			}
		}

		let mut entries = vec![Entry::default(); 1 << ROOT_BITS];
		let mut key = 0usize; // bit-reversed code
		let mut symbol_idx = 0;
		// Symbols not yet placed, per length; drives second-level sizing.
		let mut remaining = counts;

		// Codes fitting in the root table, replicated over the unused
		// high bits.
		for len in 1..=ROOT_BITS {
			for _ in 0..counts[len as usize] {
				let entry = Entry {
					bits: len,
					value: sorted[symbol_idx],
				};
				symbol_idx += 1;
				let step = 1usize << len;
				let mut i = key;
				while i < (1 << ROOT_BITS) {
					entries[i] = entry;
					i += step;
				}
				key = next_key(key, len);
				remaining[len as usize] -= 1;
			}
		}

		// Longer codes chain through second-level tables keyed on the low
		// eight bits.
		let mut sub_start = 0usize;
		let mut sub_prefix = usize::MAX;
		let mut sub_bits = 0u8;
		for len in (ROOT_BITS + 1)..=MAX_CODE_LENGTH {
			while remaining[len as usize] > 0 {
				let prefix = key & ((1 << ROOT_BITS) - 1);
				if prefix != sub_prefix {
					sub_bits = next_table_bits(&remaining, len);
					sub_start = entries.len();
					entries.resize(sub_start + (1 << sub_bits), Entry::default());
					sub_prefix = prefix;
					entries[prefix] = Entry {
						bits: ROOT_BITS + sub_bits,
						value: sub_start as u16,
					};
				}
				let entry = Entry {
					bits: len,
					value: sorted[symbol_idx],
				};
				symbol_idx += 1;
				let step = 1usize << (len - ROOT_BITS);
				let mut i = key >> ROOT_BITS;
				while i < (1 << sub_bits) {
					entries[sub_start + i] = entry;
					i += step;
				}
				key = next_key(key, len);
				remaining[len as usize] -= 1;
			}
		}

		Ok(Self { entries })
	}

	/// Decodes one symbol from the reader.
	#[inline]
	pub fn decode(&self, r: &mut LBitReader<'_>) -> Result<u16, DecodingError> {
		let entry = self.entries[r.peek(ROOT_BITS) as usize];
		if entry.bits <= ROOT_BITS {
			r.consume(entry.bits)?;
			Ok(entry.value)
		} else {
			r.consume(ROOT_BITS)?;
			let sub_bits = entry.bits - ROOT_BITS;
			let sub = self.entries[entry.value as usize + r.peek(sub_bits) as usize];
			r.consume(sub.bits - ROOT_BITS)?;
			Ok(sub.value)
		}
	}
}

// Advances a bit-reversed canonical code of the given length.
fn next_key(key: usize, len: u8) -> usize {
	let mut step = 1usize << (len - 1);
	while key & step != 0 {
		step >>= 1;
	}
	if step == 0 { 0 } else { (key & (step - 1)) + step }
}

// Size (in bits) of the second-level table starting at codes of `len`,
// given the not-yet-placed symbol counts.
fn next_table_bits(remaining: &[u32; MAX_CODE_LENGTH as usize + 1], mut len: u8) -> u8 {
	let mut left = 1i64 << (len - ROOT_BITS);
	while len < MAX_CODE_LENGTH {
		left -= i64::from(remaining[len as usize]);
		if left <= 0 {
			break;
		}
		len += 1;
		left <<= 1;
	}
	len - ROOT_BITS
}

/// Reads one serialized code (simple or normal form) for an alphabet of
/// `alphabet_size` symbols and builds its decode table.
pub fn read_code(
	r: &mut LBitReader<'_>,
	alphabet_size: usize,
) -> Result<HuffmanTable, DecodingError> {
	if r.read_flag()? {
		// Simple code: one or two symbols listed verbatim.
		let num_symbols = 1 + r.read_bits(1)? as usize;
		let first = if r.read_flag()? {
			r.read_bits(8)? as u16
		} else {
			r.read_bits(1)? as u16
		};
		if usize::from(first) >= alphabet_size {
			return Err(DecodingError::BitstreamError("simple code symbol range"));
		}
		if num_symbols == 1 {
			return Ok(HuffmanTable::single_symbol(first));
		}
		let second = r.read_bits(8)? as u16;
		if usize::from(second) >= alphabet_size || second == first {
			return Err(DecodingError::BitstreamError("simple code symbol range"));
		}
		let mut lengths = vec![0u8; alphabet_size];
		lengths[usize::from(first)] = 1;
		lengths[usize::from(second)] = 1;
		return HuffmanTable::build(&lengths);
	}

	// Normal form: code-length code first.
	let num_lengths = 4 + r.read_bits(4)? as usize;
	if num_lengths > CODE_LENGTH_CODES {
		return Err(DecodingError::BitstreamError("too many code length codes"));
	}
	let mut cl_lengths = [0u8; CODE_LENGTH_CODES];
	for &i in CODE_LENGTH_ORDER.iter().take(num_lengths) {
		cl_lengths[i] = r.read_bits(3)? as u8;
	}
	let cl_table = HuffmanTable::build(&cl_lengths)?;

	let max_symbol = if r.read_flag()? {
		let nbits = 2 + 2 * r.read_bits(3)? as u8;
		let max = 2 + r.read_bits(nbits)? as usize;
		if max > alphabet_size {
			return Err(DecodingError::BitstreamError("max symbol out of range"));
		}
		max
	} else {
		alphabet_size
	};

	let mut lengths = vec![0u8; alphabet_size];
	let mut prev = 8u8;
	let mut symbol = 0usize;
	let mut budget = max_symbol;
	while symbol < alphabet_size {
		if budget == 0 {
			break;
		}
		budget -= 1;
		let code = cl_table.decode(r)? as u8;
		match code {
			0..=15 => {
				lengths[symbol] = code;
				symbol += 1;
				if code != 0 {
					prev = code;
				}
			}
			16 => {
				let repeat = 3 + r.read_bits(2)? as usize;
				if symbol + repeat > alphabet_size {
					return Err(DecodingError::BitstreamError("code length repeat overflow"));
				}
				lengths[symbol..symbol + repeat].fill(prev);
				symbol += repeat;
			}
			17 => {
				symbol += 3 + r.read_bits(3)? as usize;
			}
			18 => {
				symbol += 11 + r.read_bits(7)? as usize;
			}
			_ => return Err(DecodingError::BitstreamError("invalid code length code")),
		}
		if symbol > alphabet_size {
			return Err(DecodingError::BitstreamError("code length overflow"));
		}
	}
	HuffmanTable::build(&lengths)
}

/// Writes a code built from `freqs` and returns `(lengths, codes)` for the
/// subsequent symbol emission.
///
/// When at most one symbol is used the stream carries a simple code and
/// the decoder spends no bits per symbol, so the returned lengths are all
/// zero and emission writes nothing.
pub fn write_code(w: &mut LBitWriter, freqs: &[u32]) -> (Vec<u8>, Vec<u16>) {
	let mut lengths = build_code_lengths(freqs, MAX_CODE_LENGTH);
	write_code_lengths(w, &lengths);
	if lengths.iter().filter(|&&l| l > 0).count() <= 1 {
		lengths.fill(0);
	}
	let codes = lengths_to_codes(&lengths);
	(lengths, codes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_package_merge_depth_limit() {
		// Exponential frequencies would want depths far beyond the cap.
		let freqs: Vec<u32> = (0..40).map(|i| 1u32 << (i % 30)).collect();
		let lengths = build_code_lengths(&freqs, MAX_CODE_LENGTH);
		assert!(lengths.iter().all(|&l| l <= MAX_CODE_LENGTH));
		// Kraft equality must hold for a complete code.
		let kraft: u64 = lengths
			.iter()
			.filter(|&&l| l > 0)
			.map(|&l| 1u64 << (MAX_CODE_LENGTH - l))
			.sum();
		assert_eq!(kraft, 1 << MAX_CODE_LENGTH);
	}

	#[test]
	fn test_balanced_frequencies() {
		let freqs = [10u32; 8];
		let lengths = build_code_lengths(&freqs, 15);
		assert!(lengths.iter().all(|&l| l == 3));
	}

	#[test]
	fn test_round_trip_through_bitstream() {
		let freqs: Vec<u32> = (0..280)
			.map(|i| match i {
				0..=9 => 1000 - i,
				10..=60 => 17,
				100 => 2,
				256..=260 => 40,
				_ => 0,
			})
			.collect();

		let mut w = LBitWriter::new();
		let (lengths, codes) = write_code(&mut w, &freqs);
		// Emit every used symbol once.
		for (sym, &len) in lengths.iter().enumerate() {
			if len > 0 {
				w.write_bits(u64::from(codes[sym]), len);
			}
		}
		let bytes = w.finish();

		let mut r = LBitReader::new(&bytes);
		let table = read_code(&mut r, 280).unwrap();
		for (sym, &len) in lengths.iter().enumerate() {
			if len > 0 {
				assert_eq!(table.decode(&mut r).unwrap(), sym as u16);
			}
		}
	}

	#[test]
	fn test_simple_code_round_trip() {
		for symbols in [vec![0u16], vec![1], vec![77], vec![3, 200]] {
			let mut w = LBitWriter::new();
			write_simple_code(&mut w, &symbols);
			// A single-symbol table consumes no bits, a two-symbol table one
			// bit per symbol.
			for (i, _) in symbols.iter().enumerate() {
				if symbols.len() == 2 {
					w.write_bits(i as u64, 1);
				}
			}
			let bytes = w.finish();
			let mut r = LBitReader::new(&bytes);
			let table = read_code(&mut r, 256).unwrap();
			for &sym in &symbols {
				assert_eq!(table.decode(&mut r).unwrap(), sym);
			}
		}
	}

	#[test]
	fn test_long_codes_use_second_level() {
		// A skewed distribution forcing lengths beyond the 8-bit root.
		let mut freqs = vec![0u32; 300];
		for (i, f) in freqs.iter_mut().enumerate().take(40) {
			*f = 1 << (29 - i.min(29));
		}
		let lengths = build_code_lengths(&freqs, 15);
		assert!(lengths.iter().any(|&l| l > 8));
		let table = HuffmanTable::build(&lengths).unwrap();
		let codes = lengths_to_codes(&lengths);

		let mut w = LBitWriter::new();
		for sym in (0..40).rev() {
			w.write_bits(u64::from(codes[sym]), lengths[sym]);
		}
		let bytes = w.finish();
		let mut r = LBitReader::new(&bytes);
		for sym in (0..40u16).rev() {
			assert_eq!(table.decode(&mut r).unwrap(), sym);
		}
	}

	#[test]
	fn test_invalid_lengths_rejected() {
		// Over-subscribed: three codes of length 1.
		let lengths = [1u8, 1, 1];
		assert!(HuffmanTable::build(&lengths).is_err());
		// Under-subscribed: single length-2 pair missing codespace.
		let lengths = [2u8, 2, 0];
		assert!(HuffmanTable::build(&lengths).is_err());
	}
}
