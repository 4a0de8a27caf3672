//! Lossy bitstream encoder.
//!
//! One encode call runs the pass sequence Init -> Analyze -> StatPass* ->
//! Encode -> Finalize:
//!
//! 1. **Analyze** clusters macroblocks into quality segments by luma
//!    activity (k-means over per-macroblock variance) and derives the
//!    per-segment quantizer deltas from the noise-shaping strength.
//! 2. The **main pass** performs per-macroblock rate-distortion mode
//!    decisions (`J = 256*D + lambda*R`), quantizes and reconstructs
//!    exactly like the decoder will, and records token statistics.
//! 3. **Finalize** derives updated coefficient probabilities from the
//!    statistics, writes the headers and mode syntax into partition 0 and
//!    the residual tokens into the token partitions.
//!
//! When a size or distortion target is set, the whole sequence repeats
//! under a bisection over the quality factor, bounded by `pass`.

use log::debug;

use crate::config::{EncoderConfig, FilterType, MAX_DIMENSION};
use crate::dsp::{bit_cost, sse};
use crate::error::EncodingError;
use crate::picture::{Plane, ProgressHook, YuvaPlanes};
use crate::vp8::bool_coder::BoolEncoder;
use crate::vp8::predict::{Ctx4, pred4, pred_block};
use crate::vp8::probs::{COEFF_PROBS, KF_BMODE_PROBS};
use crate::vp8::quant::{
	DequantFactors, Lambdas, MatrixKind, QuantMatrix, dequant_factors, quality_to_q_index,
};
use crate::vp8::tables::{
	B_PRED, BMODE_TREE, KF_UV_MODE_PROB, KF_YMODE_PROB, KF_YMODE_TREE, SEGMENT_TREE,
	UV_MODE_TREE,
};
use crate::vp8::tokens::{
	CoeffProbs, CoeffStats, CostSink, EncoderSink, StatsSink, code_coeffs, new_stats,
	probs_from_stats, write_prob_updates,
};
use crate::vp8::transform::{ftransform, ftransform_wht, itransform, itransform_wht};
use crate::vp8::{
	MAX_PARTITION0_SIZE, MAX_PARTITION_SIZE, NUM_SEGMENTS, START_CODE,
};

/// Encodes YUV planes into a standalone VP8 key-frame payload.
pub fn encode(
	planes: &YuvaPlanes,
	config: &EncoderConfig,
	progress: &mut Option<&mut ProgressHook<'_>>,
) -> Result<Vec<u8>, EncodingError> {
	config.validate()?;
	let width = planes.y.width();
	let height = planes.y.height();
	if width == 0 || height == 0 || width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize
	{
		return Err(EncodingError::BadDimension {
			width: width as u32,
			height: height as u32,
			max: MAX_DIMENSION,
		});
	}

	if config.target_size == 0 && config.target_psnr == 0.0 {
		return Ok(encode_frame(planes, config, config.quality, progress)?.0);
	}

	// Bisection over the quality factor toward the byte or distortion
	// target, bounded by the configured number of passes.
	let mut lo = 0.0f32;
	let mut hi = 100.0f32;
	let mut q = config.quality;
	let mut best: Option<Vec<u8>> = None;
	let size_target = config.target_size > 0;
	for pass in 0..config.pass.max(2) {
		let (bytes, psnr) = encode_frame(planes, config, q, progress)?;
		debug!(
			"target pass {pass}: q={q:.1} -> {} bytes, {psnr:.2} dB",
			bytes.len()
		);
		let meets = if size_target {
			bytes.len() as u64 <= u64::from(config.target_size)
		} else {
			psnr >= f64::from(config.target_psnr)
		};
		if meets {
			best = Some(bytes);
			// Inside the byte budget there is room for more quality; past
			// the distortion target there is room for fewer bytes.
			if size_target { lo = q } else { hi = q }
		} else if size_target {
			hi = q;
		} else {
			lo = q;
		}
		q = (lo + hi) / 2.0;
	}
	match best {
		Some(bytes) => Ok(bytes),
		None => {
			let fallback = if size_target { 0.0 } else { 100.0 };
			Ok(encode_frame(planes, config, fallback, progress)?.0)
		}
	}
}

// Per-macroblock decisions of the main pass, replayed during emission.
struct MbRecord {
	segment: usize,
	skip: bool,
	is_i4: bool,
	ymode: i8,
	bmodes: [u8; 16],
	uvmode: i8,
	y2: [i16; 16],
	y2_ctx: usize,
	y: [[i16; 16]; 16],
	y_ctx: [usize; 16],
	uv: [[i16; 16]; 8],
	uv_ctx: [usize; 8],
}

// Everything the per-segment coding needs.
struct Segment {
	y1: QuantMatrix,
	y2: QuantMatrix,
	uv: QuantMatrix,
	lambdas: Lambdas,
	quant_delta: i32,
}

fn pad_plane(src: &Plane, target_w: usize, target_h: usize) -> Plane {
	let mut out = Plane::new(target_w, target_h);
	for y in 0..target_h {
		let sy = y.min(src.height() - 1);
		let row = src.row(sy);
		let dst = out.row_mut(y);
		dst[..src.width()].copy_from_slice(row);
		let last = row[src.width() - 1];
		dst[src.width()..].fill(last);
	}
	out
}

// Luma activity of one macroblock, the segmentation metric.
fn mb_activity(y: &Plane, mb_x: usize, mb_y: usize) -> u64 {
	let mut sum = 0u64;
	let mut sum_sq = 0u64;
	for r in 0..16 {
		for &v in &y.row(mb_y * 16 + r)[mb_x * 16..mb_x * 16 + 16] {
			sum += u64::from(v);
			sum_sq += u64::from(v) * u64::from(v);
		}
	}
	// 256 * variance.
	sum_sq.saturating_sub(sum * sum / 256)
}

// One-dimensional k-means over the activity metric.
fn cluster_activities(activities: &[u64], k: usize) -> Vec<usize> {
	let min = *activities.iter().min().unwrap();
	let max = *activities.iter().max().unwrap();
	if k <= 1 || min == max {
		return vec![0; activities.len()];
	}
	let mut centers: Vec<u64> = (0..k)
		.map(|i| min + (max - min) * (2 * i as u64 + 1) / (2 * k as u64))
		.collect();
	let mut assignment = vec![0usize; activities.len()];
	for _ in 0..6 {
		for (i, &a) in activities.iter().enumerate() {
			assignment[i] = centers
				.iter()
				.enumerate()
				.min_by_key(|&(_, &c)| c.abs_diff(a))
				.map(|(idx, _)| idx)
				.unwrap();
		}
		let mut sums = vec![0u64; k];
		let mut counts = vec![0u64; k];
		for (i, &a) in activities.iter().enumerate() {
			sums[assignment[i]] += a;
			counts[assignment[i]] += 1;
		}
		for c in 0..k {
			if counts[c] > 0 {
				centers[c] = sums[c] / counts[c];
			}
		}
	}
	// Re-rank clusters by center so segment 0 is the flattest.
	let mut order: Vec<usize> = (0..k).collect();
	order.sort_by_key(|&c| centers[c]);
	let mut rank = vec![0usize; k];
	for (r, &c) in order.iter().enumerate() {
		rank[c] = r;
	}
	for a in assignment.iter_mut() {
		*a = rank[*a];
	}
	assignment
}

fn tree_cost(tree: &[i8], probs: &[u8], value: i8) -> u64 {
	// Walk every path; the matching leaf's accumulated cost wins.
	fn walk(tree: &[i8], probs: &[u8], node: usize, value: i8, acc: u64) -> Option<u64> {
		for bit in 0..2usize {
			let next = tree[node + bit];
			let cost = acc + u64::from(bit_cost(bit == 1, probs[node >> 1]));
			if next <= 0 {
				if -next == value {
					return Some(cost);
				}
			} else if let Some(c) = walk(tree, probs, next as usize, value, cost) {
				return Some(c);
			}
		}
		None
	}
	walk(tree, probs, 0, value, 0).expect("value not in tree")
}

#[allow(clippy::too_many_arguments)]
fn encode_frame(
	planes: &YuvaPlanes,
	config: &EncoderConfig,
	quality: f32,
	progress: &mut Option<&mut ProgressHook<'_>>,
) -> Result<(Vec<u8>, f64), EncodingError> {
	let width = planes.y.width();
	let height = planes.y.height();
	let mb_w = width.div_ceil(16);
	let mb_h = height.div_ceil(16);
	let y_stride = mb_w * 16;
	let uv_stride = mb_w * 8;

	let src_y = pad_plane(&planes.y, y_stride, mb_h * 16);
	let src_u = pad_plane(&planes.u, uv_stride, mb_h * 8);
	let src_v = pad_plane(&planes.v, uv_stride, mb_h * 8);

	// --- analysis pass: segmentation ---
	let base_q = quality_to_q_index(quality);
	let num_segments = usize::from(config.segments).min(NUM_SEGMENTS);
	let (segment_map, seg_deltas, segmentation) = if num_segments > 1 && config.sns_strength > 0 {
		let activities: Vec<u64> = (0..mb_w * mb_h)
			.map(|i| mb_activity(&src_y, i % mb_w, i / mb_w))
			.collect();
		let map = cluster_activities(&activities, num_segments);
		let amp = i32::from(config.sns_strength) * 24 / 100;
		let deltas: Vec<i32> = (0..num_segments)
			.map(|i| {
				let spread = 2 * i as i32 - (num_segments as i32 - 1);
				(spread * amp / (2 * (num_segments as i32 - 1).max(1))).clamp(-15, 15)
			})
			.collect();
		let distinct = map.iter().any(|&s| s != map[0]);
		(map, deltas, distinct)
	} else {
		(vec![0; mb_w * mb_h], vec![0], false)
	};

	let segments: Vec<Segment> = (0..num_segments.max(1))
		.map(|s| {
			let delta = seg_deltas.get(s).copied().unwrap_or(0);
			let f = dequant_factors(base_q + delta, &Default::default());
			new_segment(f, delta)
		})
		.collect();

	debug!(
		"vp8 encoder: {mb_w}x{mb_h} macroblocks, base q {base_q}, {} segment(s)",
		if segmentation { num_segments } else { 1 }
	);

	// --- main pass ---
	let mut records: Vec<MbRecord> = Vec::with_capacity(mb_w * mb_h);
	let mut stats: CoeffStats = new_stats();
	let mut total_sse = 0u64;

	let mut top_nz = vec![NzContext::default(); mb_w];
	let mut top_y = vec![127u8; y_stride + 4];
	let mut top_u = vec![127u8; uv_stride];
	let mut top_v = vec![127u8; uv_stride];
	let mut top_bmodes = vec![[0u8; 4]; mb_w];

	let do_i4 = config.method >= 3;

	for mb_y in 0..mb_h {
		let mut left_nz = NzContext::default();
		let mut left_y = [129u8; 16];
		let mut left_u = [129u8; 8];
		let mut left_v = [129u8; 8];
		let mut left_bmodes = [0u8; 4];
		let mut tl_y = if mb_y == 0 { 127u8 } else { 129 };
		let mut tl_u = tl_y;
		let mut tl_v = tl_y;

		let mut strip_y = vec![0u8; y_stride * 16];
		let mut strip_u = vec![0u8; uv_stride * 8];
		let mut strip_v = vec![0u8; uv_stride * 8];

		for mb_x in 0..mb_w {
			let segment_id = segment_map[mb_y * mb_w + mb_x];
			let seg = &segments[segment_id];
			let has_top = mb_y > 0;
			let has_left = mb_x > 0;

			let mut ctx = MbContext {
				has_top,
				has_left,
				mb_y,
				top_y: &top_y,
				top_u: &top_u,
				top_v: &top_v,
				left_y: &left_y,
				left_u: &left_u,
				left_v: &left_v,
				tl_y,
				tl_u,
				tl_v,
				left_nz: &mut left_nz,
				top_nz: &mut top_nz,
				mb_x,
			};

			let record = encode_macroblock(
				&src_y,
				&src_u,
				&src_v,
				&mut strip_y,
				&mut strip_u,
				&mut strip_v,
				y_stride,
				uv_stride,
				&mut ctx,
				seg,
				segment_id,
				do_i4,
				&top_bmodes[mb_x],
				&left_bmodes,
				&mut total_sse,
			);

			// Token statistics, mirrored from the exact emission walk.
			record_tokens(&record, &mut stats);

			// Context bookkeeping.
			tl_y = top_y[mb_x * 16 + 15];
			tl_u = top_u[mb_x * 8 + 7];
			tl_v = top_v[mb_x * 8 + 7];
			for r in 0..16 {
				left_y[r] = strip_y[r * y_stride + mb_x * 16 + 15];
			}
			for r in 0..8 {
				left_u[r] = strip_u[r * uv_stride + mb_x * 8 + 7];
				left_v[r] = strip_v[r * uv_stride + mb_x * 8 + 7];
			}
			let bottom = 15 * y_stride;
			top_y[mb_x * 16..mb_x * 16 + 16]
				.copy_from_slice(&strip_y[bottom + mb_x * 16..bottom + mb_x * 16 + 16]);
			if mb_x + 1 == mb_w {
				let last = top_y[y_stride - 1];
				top_y[y_stride..].fill(last);
			}
			let bottom_uv = 7 * uv_stride;
			top_u[mb_x * 8..mb_x * 8 + 8]
				.copy_from_slice(&strip_u[bottom_uv + mb_x * 8..bottom_uv + mb_x * 8 + 8]);
			top_v[mb_x * 8..mb_x * 8 + 8]
				.copy_from_slice(&strip_v[bottom_uv + mb_x * 8..bottom_uv + mb_x * 8 + 8]);
			top_bmodes[mb_x] = if record.is_i4 {
				[
					record.bmodes[12],
					record.bmodes[13],
					record.bmodes[14],
					record.bmodes[15],
				]
			} else {
				[0; 4]
			};
			left_bmodes = if record.is_i4 {
				[
					record.bmodes[3],
					record.bmodes[7],
					record.bmodes[11],
					record.bmodes[15],
				]
			} else {
				[0; 4]
			};

			records.push(record);
		}

		if let Some(hook) = progress.as_mut() {
			let percent = (mb_y as u32 + 1) * 100 / mb_h as u32;
			if !hook(percent) {
				return Err(EncodingError::UserAbort);
			}
		}
	}

	// --- finalize: probabilities, headers, partitions ---
	let proposed = probs_from_stats(&COEFF_PROBS, &stats);
	let mut probs: CoeffProbs = COEFF_PROBS;

	// Probability of the skip flag being zero.
	let skipped = records.iter().filter(|r| r.skip).count();
	let skip_prob =
		(255 * (records.len() - skipped) / records.len().max(1)).clamp(1, 254) as u8;

	let filter_level = i32::from(config.filter_strength) * 63 / 100;

	let mut p0 = BoolEncoder::new();
	p0.put_flag(false); // color space
	p0.put_flag(false); // clamping

	// Segmentation header.
	p0.put_flag(segmentation);
	let tree_probs = if segmentation {
		let tprobs = segment_tree_probs(&segment_map);
		p0.put_flag(true); // update map
		p0.put_flag(true); // update data
		p0.put_flag(false); // delta mode
		for seg in 0..NUM_SEGMENTS {
			match segments.get(seg) {
				Some(s) if s.quant_delta != 0 => {
					p0.put_flag(true);
					p0.put_signed(s.quant_delta, 7);
				}
				_ => p0.put_flag(false),
			}
		}
		for _ in 0..NUM_SEGMENTS {
			p0.put_flag(false); // no per-segment filter deltas
		}
		for &p in &tprobs {
			p0.put_flag(true);
			p0.put_literal(u32::from(p), 8);
		}
		tprobs
	} else {
		[255; 3]
	};

	// Filter header.
	p0.put_flag(config.filter_type == FilterType::Simple);
	p0.put_literal(filter_level as u32, 6);
	p0.put_literal(u32::from(config.filter_sharpness), 3);
	p0.put_flag(false); // no filter deltas

	let num_partitions_log2 = config.partitions;
	p0.put_literal(u32::from(num_partitions_log2), 2);
	let num_partitions = 1usize << num_partitions_log2;

	// Quant header: the base index plus no plane deltas.
	p0.put_literal(base_q as u32, 7);
	for _ in 0..5 {
		p0.put_flag(false);
	}

	p0.put_flag(false); // refresh entropy probs (key frame convention)
	write_prob_updates(&mut p0, &mut probs, &proposed, &stats);
	p0.put_flag(true); // macroblock skipping in use
	p0.put_literal(u32::from(skip_prob), 8);

	// Mode syntax, raster order.
	for (index, record) in records.iter().enumerate() {
		if segmentation {
			p0.put_tree(&SEGMENT_TREE, &tree_probs, record.segment as i8);
		}
		p0.put_bool(record.skip, skip_prob);
		p0.put_tree(&KF_YMODE_TREE, &KF_YMODE_PROB, record.ymode);
		if record.is_i4 {
			put_bmodes(&mut p0, &records, index, mb_w);
		}
		p0.put_tree(&UV_MODE_TREE, &KF_UV_MODE_PROB, record.uvmode);
	}
	let partition0 = p0.finish();
	if partition0.len() > MAX_PARTITION0_SIZE {
		return Err(EncodingError::Partition0Overflow {
			size: partition0.len(),
			limit: MAX_PARTITION0_SIZE,
		});
	}

	// Residual partitions.
	let mut token_encoders: Vec<BoolEncoder> = (0..num_partitions).map(|_| BoolEncoder::new()).collect();
	for (i, record) in records.iter().enumerate() {
		let mb_y = i / mb_w;
		let enc = &mut token_encoders[mb_y % num_partitions];
		emit_tokens(record, enc, &probs);
	}
	let token_partitions: Vec<Vec<u8>> = token_encoders.into_iter().map(BoolEncoder::finish).collect();
	for part in &token_partitions {
		if part.len() > MAX_PARTITION_SIZE {
			return Err(EncodingError::PartitionOverflow {
				size: part.len(),
				limit: MAX_PARTITION_SIZE,
			});
		}
	}

	// --- assemble the frame ---
	let mut out = Vec::new();
	let tag: u32 = (partition0.len() as u32) << 5 | 1 << 4; // keyframe, show bit
	out.push(tag as u8);
	out.push((tag >> 8) as u8);
	out.push((tag >> 16) as u8);
	out.extend_from_slice(&START_CODE);
	out.extend_from_slice(&(width as u16).to_le_bytes());
	out.extend_from_slice(&(height as u16).to_le_bytes());
	out.extend_from_slice(&partition0);
	for part in &token_partitions[..num_partitions - 1] {
		let size = part.len() as u32;
		out.extend_from_slice(&[size as u8, (size >> 8) as u8, (size >> 16) as u8]);
	}
	for part in &token_partitions {
		out.extend_from_slice(part);
	}

	let mse = total_sse as f64 / (width * height) as f64;
	let psnr = if mse <= 0.0 {
		99.0
	} else {
		10.0 * (255.0f64 * 255.0 / mse).log10()
	};
	Ok((out, psnr))
}

fn new_segment(f: DequantFactors, quant_delta: i32) -> Segment {
	Segment {
		y1: QuantMatrix::new(f.y1, MatrixKind::Luma),
		y2: QuantMatrix::new(f.y2, MatrixKind::LumaDc),
		uv: QuantMatrix::new(f.uv, MatrixKind::Chroma),
		lambdas: Lambdas::new(f.y1.ac),
		quant_delta,
	}
}

fn segment_tree_probs(map: &[usize]) -> [u8; 3] {
	let mut counts = [0u64; 4];
	for &s in map {
		counts[s] += 1;
	}
	let total = counts.iter().sum::<u64>().max(1);
	let left = counts[0] + counts[1];
	let prob = |num: u64, den: u64| -> u8 {
		if den == 0 {
			255
		} else {
			((255 * num / den) as u8).clamp(1, 255)
		}
	};
	[
		prob(left, total),
		prob(counts[0], left),
		prob(counts[2], counts[2] + counts[3]),
	]
}

#[derive(Debug, Clone, Copy, Default)]
struct NzContext {
	y: [bool; 4],
	u: [bool; 2],
	v: [bool; 2],
	y2: bool,
}

struct MbContext<'a> {
	has_top: bool,
	has_left: bool,
	mb_y: usize,
	top_y: &'a [u8],
	top_u: &'a [u8],
	top_v: &'a [u8],
	left_y: &'a [u8; 16],
	left_u: &'a [u8; 8],
	left_v: &'a [u8; 8],
	tl_y: u8,
	tl_u: u8,
	tl_v: u8,
	left_nz: &'a mut NzContext,
	top_nz: &'a mut Vec<NzContext>,
	mb_x: usize,
}

// Candidate reconstruction of a whole luma or chroma plane of one mode.
struct LumaCandidate {
	recon: Vec<u8>,
	levels: [[i16; 16]; 16],
	y2: [i16; 16],
	nz: [bool; 16],
	has_y2_coeffs: bool,
	distortion: u64,
	rate: u64,
}

#[allow(clippy::too_many_arguments)]
fn encode_macroblock(
	src_y: &Plane,
	src_u: &Plane,
	src_v: &Plane,
	strip_y: &mut [u8],
	strip_u: &mut [u8],
	strip_v: &mut [u8],
	y_stride: usize,
	uv_stride: usize,
	ctx: &mut MbContext<'_>,
	seg: &Segment,
	segment_id: usize,
	do_i4: bool,
	top_bmodes: &[u8; 4],
	left_bmodes: &[u8; 4],
	total_sse: &mut u64,
) -> MbRecord {
	let mb_x = ctx.mb_x;

	// --- intra 16x16 search ---
	let mut best_i16: Option<(LumaCandidate, i8)> = None;
	for mode in 0..4i8 {
		let candidate = try_i16(src_y, ctx, seg, mode);
		let mode_rate = tree_cost(&KF_YMODE_TREE, &KF_YMODE_PROB, mode);
		let j = score(candidate.distortion, candidate.rate + mode_rate, seg.lambdas.i16x16);
		let better = match &best_i16 {
			Some((c, m)) => {
				j < score(
					c.distortion,
					c.rate + tree_cost(&KF_YMODE_TREE, &KF_YMODE_PROB, *m),
					seg.lambdas.i16x16,
				)
			}
			None => true,
		};
		if better {
			best_i16 = Some((candidate, mode));
		}
	}
	let (i16_candidate, i16_mode) = best_i16.unwrap();

	// --- intra 4x4 search ---
	let i4_candidate = if do_i4 && i16_candidate.distortion > 0 {
		Some(try_i4(src_y, ctx, seg, top_bmodes, left_bmodes))
	} else {
		None
	};

	let use_i4 = match &i4_candidate {
		Some((candidate, _)) => {
			let i16_rate =
				i16_candidate.rate + tree_cost(&KF_YMODE_TREE, &KF_YMODE_PROB, i16_mode);
			let i4_rate = candidate.rate + tree_cost(&KF_YMODE_TREE, &KF_YMODE_PROB, B_PRED);
			score(candidate.distortion, i4_rate, seg.lambdas.i16x16)
				< score(i16_candidate.distortion, i16_rate, seg.lambdas.i16x16)
		}
		None => false,
	};

	let (luma, ymode, bmodes, is_i4) = if use_i4 {
		let (candidate, modes) = i4_candidate.unwrap();
		(candidate, B_PRED, modes, true)
	} else {
		(i16_candidate, i16_mode, [0u8; 16], false)
	};

	// --- chroma search ---
	let mut best_uv: Option<(Vec<u8>, Vec<u8>, [[i16; 16]; 8], [bool; 8], u64, u64, i8)> = None;
	for mode in 0..4i8 {
		let (recon_u, recon_v, levels, nz, d, r) = try_uv(src_u, src_v, ctx, seg, mode);
		let rate = r + tree_cost(&UV_MODE_TREE, &KF_UV_MODE_PROB, mode);
		let better = match &best_uv {
			Some((.., bd, br, bm)) => {
				let best_rate = br + tree_cost(&UV_MODE_TREE, &KF_UV_MODE_PROB, *bm);
				score(d, rate, seg.lambdas.uv) < score(*bd, best_rate, seg.lambdas.uv)
			}
			None => true,
		};
		if better {
			best_uv = Some((recon_u, recon_v, levels, nz, d, r, mode));
		}
	}
	let (recon_u, recon_v, uv_levels, uv_nz, uv_d, _, uvmode) = best_uv.unwrap();

	*total_sse += luma.distortion + uv_d;

	// --- commit reconstruction into the strips ---
	for r in 0..16 {
		strip_y[r * y_stride + mb_x * 16..r * y_stride + mb_x * 16 + 16]
			.copy_from_slice(&luma.recon[r * 16..r * 16 + 16]);
	}
	for r in 0..8 {
		strip_u[r * uv_stride + mb_x * 8..r * uv_stride + mb_x * 8 + 8]
			.copy_from_slice(&recon_u[r * 8..r * 8 + 8]);
		strip_v[r * uv_stride + mb_x * 8..r * uv_stride + mb_x * 8 + 8]
			.copy_from_slice(&recon_v[r * 8..r * 8 + 8]);
	}

	// --- skip decision and context updates (must mirror the decoder) ---
	let has_any = luma.nz.iter().any(|&b| b)
		|| uv_nz.iter().any(|&b| b)
		|| (!is_i4 && luma.has_y2_coeffs);
	let skip = !has_any;

	// Context values consumed by emission, captured before the update.
	let y2_ctx = usize::from(ctx.left_nz.y2) + usize::from(ctx.top_nz[mb_x].y2);
	let mut y_ctx = [0usize; 16];
	let mut uv_ctx = [0usize; 8];
	for by in 0..4 {
		for bx in 0..4 {
			let block = by * 4 + bx;
			y_ctx[block] = usize::from(if bx == 0 {
				ctx.left_nz.y[by]
			} else {
				luma.nz[block - 1]
			}) + usize::from(if by == 0 {
				ctx.top_nz[mb_x].y[bx]
			} else {
				luma.nz[block - 4]
			});
		}
	}
	for (plane, base) in [(0usize, 0usize), (1, 4)] {
		for by in 0..2 {
			for bx in 0..2 {
				let block = base + by * 2 + bx;
				let (left_arr, top_arr) = if plane == 0 {
					(&ctx.left_nz.u, &ctx.top_nz[mb_x].u)
				} else {
					(&ctx.left_nz.v, &ctx.top_nz[mb_x].v)
				};
				uv_ctx[block] = usize::from(if bx == 0 {
					left_arr[by]
				} else {
					uv_nz[block - 1]
				}) + usize::from(if by == 0 {
					top_arr[bx]
				} else {
					uv_nz[block - 2]
				});
			}
		}
	}

	if skip {
		ctx.left_nz.y = [false; 4];
		ctx.left_nz.u = [false; 2];
		ctx.left_nz.v = [false; 2];
		ctx.top_nz[mb_x].y = [false; 4];
		ctx.top_nz[mb_x].u = [false; 2];
		ctx.top_nz[mb_x].v = [false; 2];
		if !is_i4 {
			ctx.left_nz.y2 = false;
			ctx.top_nz[mb_x].y2 = false;
		}
	} else {
		if !is_i4 {
			ctx.left_nz.y2 = luma.has_y2_coeffs;
			ctx.top_nz[mb_x].y2 = luma.has_y2_coeffs;
		}
		for by in 0..4 {
			ctx.left_nz.y[by] = luma.nz[by * 4 + 3];
		}
		for bx in 0..4 {
			ctx.top_nz[mb_x].y[bx] = luma.nz[12 + bx];
		}
		for by in 0..2 {
			ctx.left_nz.u[by] = uv_nz[by * 2 + 1];
			ctx.left_nz.v[by] = uv_nz[4 + by * 2 + 1];
		}
		for bx in 0..2 {
			ctx.top_nz[mb_x].u[bx] = uv_nz[2 + bx];
			ctx.top_nz[mb_x].v[bx] = uv_nz[4 + 2 + bx];
		}
	}

	MbRecord {
		segment: segment_id,
		skip,
		is_i4,
		ymode,
		bmodes,
		uvmode,
		y2: luma.y2,
		y2_ctx,
		y: luma.levels,
		y_ctx,
		uv: uv_levels,
		uv_ctx,
	}
}

// 256*D + lambda-weighted rate, rate in 1/256 bit units.
fn score(distortion: u64, rate: u64, lambda: u64) -> u64 {
	256 * distortion + ((lambda * rate) >> 8)
}

fn try_i16(src_y: &Plane, ctx: &MbContext<'_>, seg: &Segment, mode: i8) -> LumaCandidate {
	let mb_x = ctx.mb_x;
	let mut pred = vec![0u8; 16 * 16];
	pred_block(
		mode as u8,
		&mut pred,
		16,
		ctx.has_top.then(|| &ctx.top_y[mb_x * 16..mb_x * 16 + 16]),
		ctx.has_left.then_some(&ctx.left_y[..]),
		ctx.tl_y,
		16,
	);

	let y0 = ctx.mb_y * 16;
	let mut levels = [[0i16; 16]; 16];
	let mut coeffs = [[0i16; 16]; 16];
	let mut dcs = [0i16; 16];
	for by in 0..4 {
		for bx in 0..4 {
			let block = by * 4 + bx;
			let src_base = (y0 + by * 4) * src_y.stride() + mb_x * 16 + bx * 4;
			ftransform(
				&src_y.data()[src_base..],
				src_y.stride(),
				&pred[by * 4 * 16 + bx * 4..],
				16,
				&mut coeffs[block],
			);
			dcs[block] = coeffs[block][0];
		}
	}
	let mut y2 = [0i16; 16];
	let mut y2_coeffs = [0i16; 16];
	ftransform_wht(&dcs, &mut y2_coeffs);
	let has_y2_coeffs = seg.y2.quantize_block(&mut y2_coeffs, &mut y2, 0);
	let mut restored_dcs = [0i16; 16];
	itransform_wht(&y2_coeffs, &mut restored_dcs);

	let mut nz = [false; 16];
	let mut rate = 0u64;
	for block in 0..16 {
		nz[block] = seg.y1.quantize_block(&mut coeffs[block], &mut levels[block], 1);
		coeffs[block][0] = restored_dcs[block];
	}
	{
		let mut cost = CostSink::new(&COEFF_PROBS[1]);
		code_coeffs(&mut cost, &y2, 0, 0);
		rate += cost.cost;
		for block in 0..16 {
			let mut cost = CostSink::new(&COEFF_PROBS[0]);
			code_coeffs(&mut cost, &levels[block], 1, 0);
			rate += cost.cost;
		}
	}

	// Reconstruct and measure.
	let mut recon = vec![0u8; 16 * 16];
	for by in 0..4 {
		for bx in 0..4 {
			let block = by * 4 + bx;
			let mut out = [0u8; 16];
			itransform(&pred[by * 4 * 16 + bx * 4..], 16, &coeffs[block], &mut out, 4);
			for r in 0..4 {
				recon[(by * 4 + r) * 16 + bx * 4..(by * 4 + r) * 16 + bx * 4 + 4]
					.copy_from_slice(&out[r * 4..r * 4 + 4]);
			}
		}
	}
	let mut distortion = 0u64;
	for r in 0..16 {
		let row = (y0 + r) * src_y.stride() + mb_x * 16;
		distortion += sse(&src_y.data()[row..row + 16], &recon[r * 16..r * 16 + 16]);
	}

	LumaCandidate {
		recon,
		levels,
		y2,
		nz,
		has_y2_coeffs,
		distortion,
		rate,
	}
}

fn try_i4(
	src_y: &Plane,
	ctx: &MbContext<'_>,
	seg: &Segment,
	top_bmodes: &[u8; 4],
	left_bmodes: &[u8; 4],
) -> (LumaCandidate, [u8; 16]) {
	let mb_x = ctx.mb_x;
	let y0 = ctx.mb_y * 16;
	let mut recon = vec![0u8; 16 * 16];
	let mut levels = [[0i16; 16]; 16];
	let mut nz = [false; 16];
	let mut bmodes = [0u8; 16];
	let mut total_d = 0u64;
	let mut total_r = 0u64;

	for by in 0..4 {
		for bx in 0..4 {
			let block = by * 4 + bx;
			let c4 = build_ctx4_enc(&recon, ctx, bx, by);
			let above = if by == 0 {
				top_bmodes[bx]
			} else {
				bmodes[block - 4]
			};
			let left = if bx == 0 {
				left_bmodes[by]
			} else {
				bmodes[block - 1]
			};
			let mode_probs = &KF_BMODE_PROBS[above as usize][left as usize];

			let mut best: Option<(u64, u8, [u8; 16], [i16; 16], bool, u64, u64)> = None;
			for mode in 0..10u8 {
				let mut pred = [0u8; 16];
				pred4(mode, &mut pred, 4, &c4);
				let src_base = (y0 + by * 4) * src_y.stride() + mb_x * 16 + bx * 4;
				let mut coeffs = [0i16; 16];
				ftransform(&src_y.data()[src_base..], src_y.stride(), &pred, 4, &mut coeffs);
				let mut block_levels = [0i16; 16];
				let has = seg.y1.quantize_block(&mut coeffs, &mut block_levels, 0);
				let mut out = [0u8; 16];
				itransform(&pred, 4, &coeffs, &mut out, 4);

				let mut d = 0u64;
				for r in 0..4 {
					d += sse(
						&src_y.data()[src_base + r * src_y.stride()..src_base + r * src_y.stride() + 4],
						&out[r * 4..r * 4 + 4],
					);
				}
				let mut cost = CostSink::new(&COEFF_PROBS[3]);
				code_coeffs(&mut cost, &block_levels, 0, 0);
				let r_bits =
					cost.cost + tree_cost(&BMODE_TREE, mode_probs, mode as i8);
				let j = score(d, r_bits, seg.lambdas.i4x4);
				if best.as_ref().is_none_or(|b| j < b.0) {
					best = Some((j, mode, out, block_levels, has, d, r_bits));
				}
			}
			let (_, mode, out, block_levels, has, d, r_bits) = best.unwrap();
			bmodes[block] = mode;
			levels[block] = block_levels;
			nz[block] = has;
			total_d += d;
			total_r += r_bits;
			for r in 0..4 {
				recon[(by * 4 + r) * 16 + bx * 4..(by * 4 + r) * 16 + bx * 4 + 4]
					.copy_from_slice(&out[r * 4..r * 4 + 4]);
			}
		}
	}

	(
		LumaCandidate {
			recon,
			levels,
			y2: [0; 16],
			nz,
			has_y2_coeffs: false,
			distortion: total_d,
			rate: total_r,
		},
		bmodes,
	)
}

// 4x4 context inside the encoder: mixes the committed reconstruction of
// this macroblock with the saved top/left arrays.
fn build_ctx4_enc(recon: &[u8], ctx: &MbContext<'_>, bx: usize, by: usize) -> Ctx4 {
	let mb_x = ctx.mb_x;
	let sample_top = |i: usize| -> u8 {
		if by == 0 {
			if ctx.has_top {
				ctx.top_y[mb_x * 16 + bx * 4 + i]
			} else {
				127
			}
		} else {
			recon[(by * 4 - 1) * 16 + bx * 4 + i]
		}
	};
	let mut t = [0u8; 4];
	let mut tr = [0u8; 4];
	for i in 0..4 {
		t[i] = sample_top(i);
	}
	for i in 0..4 {
		tr[i] = if bx == 3 {
			if by == 0 {
				if ctx.has_top {
					ctx.top_y[mb_x * 16 + 16 + i]
				} else {
					127
				}
			} else {
				t[3]
			}
		} else {
			sample_top(4 + i)
		};
	}
	let mut l = [0u8; 4];
	for i in 0..4 {
		l[i] = if bx == 0 {
			if ctx.has_left {
				ctx.left_y[by * 4 + i]
			} else {
				129
			}
		} else {
			recon[(by * 4 + i) * 16 + bx * 4 - 1]
		};
	}
	let x = match (bx, by) {
		(0, 0) => ctx.tl_y,
		(0, _) => {
			if ctx.has_left {
				ctx.left_y[by * 4 - 1]
			} else {
				129
			}
		}
		(_, 0) => {
			if ctx.has_top {
				ctx.top_y[mb_x * 16 + bx * 4 - 1]
			} else {
				127
			}
		}
		_ => recon[(by * 4 - 1) * 16 + bx * 4 - 1],
	};
	Ctx4 { l, x, t, tr }
}

#[allow(clippy::type_complexity)]
fn try_uv(
	src_u: &Plane,
	src_v: &Plane,
	ctx: &MbContext<'_>,
	seg: &Segment,
	mode: i8,
) -> (Vec<u8>, Vec<u8>, [[i16; 16]; 8], [bool; 8], u64, u64) {
	let mb_x = ctx.mb_x;
	let y0 = ctx.mb_y * 8;
	let mut levels = [[0i16; 16]; 8];
	let mut nz = [false; 8];
	let mut distortion = 0u64;
	let mut rate = 0u64;
	let mut recons: Vec<Vec<u8>> = Vec::with_capacity(2);

	for (plane_idx, (src, top, left, tl)) in [
		(src_u, ctx.top_u, ctx.left_u, ctx.tl_u),
		(src_v, ctx.top_v, ctx.left_v, ctx.tl_v),
	]
	.into_iter()
	.enumerate()
	{
		let mut pred = vec![0u8; 8 * 8];
		pred_block(
			mode as u8,
			&mut pred,
			8,
			ctx.has_top.then(|| &top[mb_x * 8..mb_x * 8 + 8]),
			ctx.has_left.then_some(&left[..]),
			tl,
			8,
		);
		let mut recon = vec![0u8; 8 * 8];
		for by in 0..2 {
			for bx in 0..2 {
				let block = plane_idx * 4 + by * 2 + bx;
				let src_base = (y0 + by * 4) * src.stride() + mb_x * 8 + bx * 4;
				let mut coeffs = [0i16; 16];
				ftransform(&src.data()[src_base..], src.stride(), &pred[by * 4 * 8 + bx * 4..], 8, &mut coeffs);
				nz[block] = seg.uv.quantize_block(&mut coeffs, &mut levels[block], 0);
				let mut out = [0u8; 16];
				itransform(&pred[by * 4 * 8 + bx * 4..], 8, &coeffs, &mut out, 4);
				for r in 0..4 {
					recon[(by * 4 + r) * 8 + bx * 4..(by * 4 + r) * 8 + bx * 4 + 4]
						.copy_from_slice(&out[r * 4..r * 4 + 4]);
					distortion += sse(
						&src.data()[src_base + r * src.stride()..src_base + r * src.stride() + 4],
						&out[r * 4..r * 4 + 4],
					);
				}
				let mut cost = CostSink::new(&COEFF_PROBS[2]);
				code_coeffs(&mut cost, &levels[block], 0, 0);
				rate += cost.cost;
			}
		}
		recons.push(recon);
	}
	let recon_v = recons.pop().unwrap();
	let recon_u = recons.pop().unwrap();
	(recon_u, recon_v, levels, nz, distortion, rate)
}

// Statistics use the same branch walk as emission.
fn record_tokens(record: &MbRecord, stats: &mut CoeffStats) {
	if record.skip {
		return;
	}
	if !record.is_i4 {
		let mut sink = StatsSink::new(&mut stats[1]);
		code_coeffs(&mut sink, &record.y2, 0, record.y2_ctx);
	}
	let (ytype, first) = if record.is_i4 { (3, 0) } else { (0, 1) };
	for block in 0..16 {
		let mut sink = StatsSink::new(&mut stats[ytype]);
		code_coeffs(&mut sink, &record.y[block], first, record.y_ctx[block]);
	}
	for block in 0..8 {
		let mut sink = StatsSink::new(&mut stats[2]);
		code_coeffs(&mut sink, &record.uv[block], 0, record.uv_ctx[block]);
	}
}

fn emit_tokens(record: &MbRecord, enc: &mut BoolEncoder, probs: &CoeffProbs) {
	if record.skip {
		return;
	}
	if !record.is_i4 {
		let mut sink = EncoderSink::new(enc, &probs[1]);
		code_coeffs(&mut sink, &record.y2, 0, record.y2_ctx);
	}
	let (ytype, first) = if record.is_i4 { (3, 0) } else { (0, 1) };
	for block in 0..16 {
		let mut sink = EncoderSink::new(enc, &probs[ytype]);
		code_coeffs(&mut sink, &record.y[block], first, record.y_ctx[block]);
	}
	for block in 0..8 {
		let mut sink = EncoderSink::new(enc, &probs[2]);
		code_coeffs(&mut sink, &record.uv[block], 0, record.uv_ctx[block]);
	}
}

// The 4x4 mode syntax needs neighbor modes, reconstructed from the
// already-decided records in raster order.
fn put_bmodes(enc: &mut BoolEncoder, records: &[MbRecord], index: usize, mb_w: usize) {
	let record = &records[index];
	let mb_x = index % mb_w;
	let mb_y = index / mb_w;
	let above_record = (mb_y > 0).then(|| &records[index - mb_w]);
	let left_record = (mb_x > 0).then(|| &records[index - 1]);

	for by in 0..4 {
		for bx in 0..4 {
			let block = by * 4 + bx;
			let above = if by > 0 {
				record.bmodes[block - 4]
			} else {
				above_record
					.filter(|r| r.is_i4)
					.map_or(0, |r| r.bmodes[12 + bx])
			};
			let left = if bx > 0 {
				record.bmodes[block - 1]
			} else {
				left_record
					.filter(|r| r.is_i4)
					.map_or(0, |r| r.bmodes[by * 4 + 3])
			};
			enc.put_tree(
				&BMODE_TREE,
				&KF_BMODE_PROBS[above as usize][left as usize],
				record.bmodes[block] as i8,
			);
		}
	}
}
