//! Lossy bitstream decoder.
//!
//! The decoder runs macroblock by macroblock in raster order. Intra
//! prediction context (one row above, one column to the left) lives in
//! dedicated arrays saved from the unfiltered reconstruction, so the
//! deblocking stage never feeds back into prediction. Reconstructed
//! macroblock rows are handed to a [`FrameAssembler`] as owned strips;
//! with `use_threads` the assembler runs on a worker thread and filters
//! row `r` while the main thread decodes row `r + 1`, producing output
//! byte-identical to the single-threaded run.

use std::sync::mpsc;

use log::debug;

use crate::config::DecoderOptions;
use crate::error::DecodingError;
use crate::picture::{Plane, YuvaPlanes};
use crate::vp8::bool_coder::BoolDecoder;
use crate::vp8::loop_filter::{
	filter_edge_normal, filter_edge_simple, hev_threshold, interior_limit,
};
use crate::vp8::predict::{Ctx4, pred4, pred_block};
use crate::vp8::probs::{COEFF_PROBS, KF_BMODE_PROBS};
use crate::vp8::quant::{DequantFactors, QuantDeltas, dequant_factors};
use crate::vp8::tables::{
	B_PRED, BMODE_TREE, KF_UV_MODE_PROB, KF_YMODE_PROB, KF_YMODE_TREE, SEGMENT_TREE,
	UV_MODE_TREE,
};
use crate::vp8::tokens::{CoeffProbs, get_coeffs, read_prob_updates};
use crate::vp8::transform::{itransform, itransform_wht};
use crate::vp8::{
	FilterHeader, MAX_PARTITION0_SIZE, NUM_SEGMENTS, QuantHeader, SegmentHeader, START_CODE,
};

/// Reads just the frame dimensions from a VP8 payload.
pub fn peek_dimensions(data: &[u8]) -> Result<(u32, u32), DecodingError> {
	let header = parse_uncompressed_header(data)?;
	Ok((u32::from(header.width), u32::from(header.height)))
}

struct UncompressedHeader {
	width: u16,
	height: u16,
	partition0: std::ops::Range<usize>,
}

fn parse_uncompressed_header(data: &[u8]) -> Result<UncompressedHeader, DecodingError> {
	if data.len() < 10 {
		return Err(DecodingError::NotEnoughData {
			needed: 10 - data.len(),
		});
	}
	let tag = u32::from(data[0]) | u32::from(data[1]) << 8 | u32::from(data[2]) << 16;
	if tag & 1 != 0 {
		return Err(DecodingError::UnsupportedFeature("non-key frame"));
	}
	let version = (tag >> 1) & 7;
	if version > 3 {
		return Err(DecodingError::BitstreamError("invalid frame version"));
	}
	let partition0_len = (tag >> 5) as usize;
	if data[3..6] != START_CODE {
		return Err(DecodingError::BitstreamError("missing start code"));
	}
	let width = u16::from_le_bytes([data[6], data[7]]) & 0x3fff;
	let height = u16::from_le_bytes([data[8], data[9]]) & 0x3fff;
	if width == 0 || height == 0 {
		return Err(DecodingError::BadDimension {
			width: u32::from(width),
			height: u32::from(height),
		});
	}
	if partition0_len > MAX_PARTITION0_SIZE {
		return Err(DecodingError::BitstreamError("oversized mode partition"));
	}
	if 10 + partition0_len > data.len() {
		return Err(DecodingError::NotEnoughData {
			needed: 10 + partition0_len - data.len(),
		});
	}
	Ok(UncompressedHeader {
		width,
		height,
		partition0: 10..10 + partition0_len,
	})
}

fn parse_segment_header(dec: &mut BoolDecoder<'_>) -> SegmentHeader {
	let mut header = SegmentHeader::default();
	header.enabled = dec.get_flag();
	if !header.enabled {
		return header;
	}
	header.update_map = dec.get_flag();
	let update_data = dec.get_flag();
	if update_data {
		header.absolute_delta = dec.get_flag();
		for delta in header.quant_delta.iter_mut() {
			*delta = dec.get_optional_signed(7);
		}
		for delta in header.filter_delta.iter_mut() {
			*delta = dec.get_optional_signed(6);
		}
	}
	if header.update_map {
		for prob in header.tree_probs.iter_mut() {
			*prob = if dec.get_flag() {
				dec.get_literal(8) as u8
			} else {
				255
			};
		}
	}
	header
}

fn parse_filter_header(dec: &mut BoolDecoder<'_>) -> FilterHeader {
	let mut header = FilterHeader {
		simple: dec.get_flag(),
		level: dec.get_literal(6) as i32,
		sharpness: dec.get_literal(3) as i32,
		..FilterHeader::default()
	};
	if dec.get_flag() {
		// Filter deltas enabled; key frames only use the intra class.
		if dec.get_flag() {
			header.intra_delta = dec.get_signed_delta();
			for _ in 0..3 {
				let _ = dec.get_signed_delta();
			}
			header.bpred_delta = dec.get_signed_delta();
			for _ in 0..3 {
				let _ = dec.get_signed_delta();
			}
		}
	}
	header
}

fn parse_quant_header(dec: &mut BoolDecoder<'_>) -> QuantHeader {
	QuantHeader {
		base_q: dec.get_literal(7) as i32,
		deltas: QuantDeltas {
			y1_dc: dec.get_optional_signed(4),
			y2_dc: dec.get_optional_signed(4),
			y2_ac: dec.get_optional_signed(4),
			uv_dc: dec.get_optional_signed(4),
			uv_ac: dec.get_optional_signed(4),
		},
	}
}

impl BoolDecoder<'_> {
	// Filter deltas are flagged 6-bit magnitudes.
	fn get_signed_delta(&mut self) -> i32 {
		if self.get_flag() { self.get_signed(6) } else { 0 }
	}
}

// Per-macroblock info the filter stage needs.
#[derive(Debug, Clone, Copy)]
struct MbFilterInfo {
	level: i32,
	// Inner edges are skipped for coefficient-free 16x16 macroblocks.
	inner: bool,
}

// One reconstructed macroblock row, handed over as owned storage.
struct Strip {
	y: Vec<u8>,
	u: Vec<u8>,
	v: Vec<u8>,
	filters: Vec<MbFilterInfo>,
}

// Collects strips into full planes and runs the deblocking filter.
struct FrameAssembler {
	y: Plane,
	u: Plane,
	v: Plane,
	mb_w: usize,
	rows_done: usize,
	filter: FilterHeader,
	filter_enabled: bool,
}

impl FrameAssembler {
	fn new(mb_w: usize, mb_h: usize, filter: FilterHeader, filter_enabled: bool) -> Self {
		Self {
			y: Plane::new(mb_w * 16, mb_h * 16),
			u: Plane::new(mb_w * 8, mb_h * 8),
			v: Plane::new(mb_w * 8, mb_h * 8),
			mb_w,
			rows_done: 0,
			filter,
			filter_enabled,
		}
	}

	fn push_row(&mut self, strip: Strip) {
		let mb_y = self.rows_done;
		for (r, row) in strip.y.chunks_exact(self.mb_w * 16).enumerate() {
			self.y.row_mut(mb_y * 16 + r).copy_from_slice(row);
		}
		for (r, row) in strip.u.chunks_exact(self.mb_w * 8).enumerate() {
			self.u.row_mut(mb_y * 8 + r).copy_from_slice(row);
		}
		for (r, row) in strip.v.chunks_exact(self.mb_w * 8).enumerate() {
			self.v.row_mut(mb_y * 8 + r).copy_from_slice(row);
		}
		self.rows_done += 1;
		if self.filter_enabled {
			self.filter_row(mb_y, &strip.filters);
		}
	}

	// Deblocks one macroblock row: its left/top macroblock edges and the
	// interior 4x4 edges.
	fn filter_row(&mut self, mb_y: usize, infos: &[MbFilterInfo]) {
		for (mb_x, info) in infos.iter().enumerate() {
			if info.level == 0 {
				continue;
			}
			let level = info.level;
			let ilevel = interior_limit(level, self.filter.sharpness);
			let mb_limit = 2 * (level + 2) + ilevel;
			let sub_limit = 2 * level + ilevel;
			let hev_t = hev_threshold(level);
			let simple = self.filter.simple;

			filter_plane_edges(
				self.y.data_mut(),
				self.mb_w * 16,
				mb_x * 16,
				mb_y * 16,
				16,
				simple,
				info.inner,
				mb_limit,
				sub_limit,
				ilevel,
				hev_t,
			);
			if !simple {
				for plane in [self.u.data_mut(), self.v.data_mut()] {
					filter_plane_edges(
						plane,
						self.mb_w * 8,
						mb_x * 8,
						mb_y * 8,
						8,
						false,
						info.inner,
						mb_limit,
						sub_limit,
						ilevel,
						hev_t,
					);
				}
			}
		}
	}

	fn finish(self, width: usize, height: usize) -> YuvaPlanes {
		let mut out = YuvaPlanes::new(width, height, false);
		for y in 0..height {
			out.y.row_mut(y).copy_from_slice(&self.y.row(y)[..width]);
		}
		let (uv_w, uv_h) = (width.div_ceil(2), height.div_ceil(2));
		for y in 0..uv_h {
			out.u.row_mut(y).copy_from_slice(&self.u.row(y)[..uv_w]);
			out.v.row_mut(y).copy_from_slice(&self.v.row(y)[..uv_w]);
		}
		out
	}
}

// Shared by luma (16) and chroma (8) blocks of one macroblock.
#[allow(clippy::too_many_arguments)]
fn filter_plane_edges(
	data: &mut [u8],
	stride: usize,
	x0: usize,
	y0: usize,
	size: usize,
	simple: bool,
	inner: bool,
	mb_limit: i32,
	sub_limit: i32,
	ilevel: i32,
	hev_t: i32,
) {
	let base = y0 * stride + x0;
	// Left macroblock edge.
	if x0 > 0 {
		if simple {
			filter_edge_simple(data, base, 1, stride, size, mb_limit);
		} else {
			filter_edge_normal(data, base, 1, stride, size, mb_limit, ilevel, hev_t, true);
		}
	}
	// Interior vertical edges.
	if inner {
		let step = 4;
		let mut x = step;
		while x < size {
			if simple {
				filter_edge_simple(data, base + x, 1, stride, size, sub_limit);
			} else {
				filter_edge_normal(
					data, base + x, 1, stride, size, sub_limit, ilevel, hev_t, false,
				);
			}
			x += step;
		}
	}
	// Top macroblock edge.
	if y0 > 0 {
		if simple {
			filter_edge_simple(data, base, stride, 1, size, mb_limit);
		} else {
			filter_edge_normal(data, base, stride, 1, size, mb_limit, ilevel, hev_t, true);
		}
	}
	// Interior horizontal edges.
	if inner {
		let mut y = 4;
		while y < size {
			if simple {
				filter_edge_simple(data, base + y * stride, stride, 1, size, sub_limit);
			} else {
				filter_edge_normal(
					data,
					base + y * stride,
					stride,
					1,
					size,
					sub_limit,
					ilevel,
					hev_t,
					false,
				);
			}
			y += 4;
		}
	}
}

// Non-zero-coefficient context of one macroblock column or the running
// left edge.
#[derive(Debug, Clone, Copy, Default)]
struct NzContext {
	y: [bool; 4],
	u: [bool; 2],
	v: [bool; 2],
	y2: bool,
}

/// Decodes a complete VP8 key frame into YUV planes.
pub fn decode(data: &[u8], options: &DecoderOptions) -> Result<YuvaPlanes, DecodingError> {
	let header = parse_uncompressed_header(data)?;
	let width = usize::from(header.width);
	let height = usize::from(header.height);
	let mb_w = width.div_ceil(16);
	let mb_h = height.div_ceil(16);

	let needed = mb_w * 16 * mb_h * 16 * 3 / 2;
	if needed > options.memory_limit {
		return Err(DecodingError::MemoryLimitExceeded {
			requested: needed,
			limit: options.memory_limit,
		});
	}

	let mut dec = BoolDecoder::new(&data[header.partition0.clone()]);

	if dec.get_flag() {
		return Err(DecodingError::UnsupportedFeature("reserved color space"));
	}
	let _clamping = dec.get_flag();
	let segment = parse_segment_header(&mut dec);
	let mut filter = parse_filter_header(&mut dec);
	if options.no_filter {
		filter.level = 0;
	}

	let num_partitions = 1usize << dec.get_literal(2);
	let quant = parse_quant_header(&mut dec);
	let _refresh_entropy = dec.get_flag();

	let mut probs: CoeffProbs = COEFF_PROBS;
	read_prob_updates(&mut dec, &mut probs);

	let use_skip = dec.get_flag();
	let skip_prob = if use_skip { dec.get_literal(8) as u8 } else { 0 };

	// Token partition layout after partition 0.
	let parts_start = header.partition0.end;
	let sizes_len = (num_partitions - 1) * 3;
	if parts_start + sizes_len > data.len() {
		return Err(DecodingError::NotEnoughData {
			needed: parts_start + sizes_len - data.len(),
		});
	}
	let mut partitions = Vec::with_capacity(num_partitions);
	let mut offset = parts_start + sizes_len;
	for i in 0..num_partitions {
		let size = if i + 1 < num_partitions {
			let s = &data[parts_start + i * 3..];
			usize::from(s[0]) | usize::from(s[1]) << 8 | usize::from(s[2]) << 16
		} else {
			data.len().saturating_sub(offset)
		};
		if offset + size > data.len() {
			return Err(DecodingError::NotEnoughData {
				needed: offset + size - data.len(),
			});
		}
		partitions.push(BoolDecoder::new(&data[offset..offset + size]));
		offset += size;
	}

	// Per-segment dequantization factors.
	let mut seg_quants = [dequant_factors(quant.base_q, &quant.deltas); NUM_SEGMENTS];
	if segment.enabled {
		for s in 0..NUM_SEGMENTS {
			let q = if segment.absolute_delta {
				segment.quant_delta[s]
			} else {
				quant.base_q + segment.quant_delta[s]
			};
			seg_quants[s] = dequant_factors(q, &quant.deltas);
		}
	}

	debug!(
		"vp8 frame: {width}x{height}, {num_partitions} partition(s), base q {}, filter level {}",
		quant.base_q, filter.level
	);

	let filter_enabled = filter.level > 0;
	let mut run = |sink: &mut dyn FnMut(Strip)| -> Result<(), DecodingError> {
		decode_macroblocks(
			&mut dec,
			&mut partitions,
			&probs,
			&segment,
			&seg_quants,
			&filter,
			use_skip,
			skip_prob,
			mb_w,
			mb_h,
			sink,
		)
	};

	let assembler = if options.use_threads {
		let (tx, rx) = mpsc::channel::<Strip>();
		let mut assembler = FrameAssembler::new(mb_w, mb_h, filter, filter_enabled);
		std::thread::scope(|scope| {
			let worker = scope.spawn(move || {
				for strip in rx {
					assembler.push_row(strip);
				}
				assembler
			});
			let result = run(&mut |strip| {
				// A failed send means the worker died; surfaced at join.
				let _ = tx.send(strip);
			});
			drop(tx);
			let assembler = worker.join().expect("filter worker panicked");
			result.map(|()| assembler)
		})?
	} else {
		let mut assembler = FrameAssembler::new(mb_w, mb_h, filter, filter_enabled);
		run(&mut |strip| assembler.push_row(strip))?;
		assembler
	};

	Ok(assembler.finish(width, height))
}

#[allow(clippy::too_many_arguments)]
fn decode_macroblocks(
	dec: &mut BoolDecoder<'_>,
	partitions: &mut [BoolDecoder<'_>],
	probs: &CoeffProbs,
	segment: &SegmentHeader,
	seg_quants: &[DequantFactors; NUM_SEGMENTS],
	filter: &FilterHeader,
	use_skip: bool,
	skip_prob: u8,
	mb_w: usize,
	mb_h: usize,
	sink: &mut dyn FnMut(Strip),
) -> Result<(), DecodingError> {
	let y_stride = mb_w * 16;
	let uv_stride = mb_w * 8;

	let mut top_nz = vec![NzContext::default(); mb_w];
	let mut top_y = vec![127u8; y_stride + 4];
	let mut top_u = vec![127u8; uv_stride];
	let mut top_v = vec![127u8; uv_stride];
	let mut top_bmodes = vec![[0u8; 4]; mb_w];

	for mb_y in 0..mb_h {
		let mut left_nz = NzContext::default();
		let mut left_y = [129u8; 16];
		let mut left_u = [129u8; 8];
		let mut left_v = [129u8; 8];
		let mut left_bmodes = [0u8; 4];
		// Top-left samples of the upcoming macroblock.
		let mut tl_y = if mb_y == 0 { 127 } else { 129 };
		let mut tl_u = tl_y;
		let mut tl_v = tl_y;

		let mut strip = Strip {
			y: vec![0; y_stride * 16],
			u: vec![0; uv_stride * 8],
			v: vec![0; uv_stride * 8],
			filters: Vec::with_capacity(mb_w),
		};
		let token_dec = &mut partitions[mb_y % partitions.len()];

		for mb_x in 0..mb_w {
			// --- mode syntax, partition 0 ---
			let segment_id = if segment.enabled && segment.update_map {
				dec.get_tree(&SEGMENT_TREE, &segment.tree_probs) as usize
			} else {
				0
			};
			let skip_flag = use_skip && dec.get_bool(skip_prob);
			let ymode = dec.get_tree(&KF_YMODE_TREE, &KF_YMODE_PROB);
			let is_i4 = ymode == B_PRED;
			let mut bmodes = [0u8; 16];
			if is_i4 {
				for by in 0..4 {
					for bx in 0..4 {
						let above = if by == 0 {
							top_bmodes[mb_x][bx]
						} else {
							bmodes[(by - 1) * 4 + bx]
						};
						let left = if bx == 0 {
							left_bmodes[by]
						} else {
							bmodes[by * 4 + bx - 1]
						};
						bmodes[by * 4 + bx] = dec.get_tree(
							&BMODE_TREE,
							&KF_BMODE_PROBS[above as usize][left as usize],
						) as u8;
					}
				}
			}
			let uvmode = dec.get_tree(&UV_MODE_TREE, &KF_UV_MODE_PROB);

			// --- residuals from the row's token partition ---
			let dq = &seg_quants[segment_id];
			let mut coeffs = [[0i16; 16]; 24]; // 16 Y + 4 U + 4 V
			let mut nz = [false; 24];

			if !skip_flag {
				if !is_i4 {
					let ctx = usize::from(left_nz.y2) + usize::from(top_nz[mb_x].y2);
					let mut y2 = [0i16; 16];
					let n = get_coeffs(token_dec, &probs[1], 0, ctx, dq.y2, &mut y2);
					let has_y2 = n > 0;
					left_nz.y2 = has_y2;
					top_nz[mb_x].y2 = has_y2;
					let mut dcs = [0i16; 16];
					itransform_wht(&y2, &mut dcs);
					for (block, &dc) in dcs.iter().enumerate() {
						coeffs[block][0] = dc;
					}
				}
				let (ytype, first) = if is_i4 { (3, 0) } else { (0, 1) };
				for by in 0..4 {
					for bx in 0..4 {
						let block = by * 4 + bx;
						let ctx = usize::from(if bx == 0 {
							left_nz.y[by]
						} else {
							nz[block - 1]
						}) + usize::from(if by == 0 {
							top_nz[mb_x].y[bx]
						} else {
							nz[block - 4]
						});
						let n = get_coeffs(
							token_dec,
							&probs[ytype],
							first,
							ctx,
							dq.y1,
							&mut coeffs[block],
						);
						nz[block] = n > first;
					}
				}
				for (plane, base) in [(0usize, 16usize), (1, 20)] {
					for by in 0..2 {
						for bx in 0..2 {
							let block = base + by * 2 + bx;
							let (left_arr, top_arr) = if plane == 0 {
								(&mut left_nz.u, &mut top_nz[mb_x].u)
							} else {
								(&mut left_nz.v, &mut top_nz[mb_x].v)
							};
							let ctx = usize::from(if bx == 0 {
								left_arr[by]
							} else {
								nz[block - 1]
							}) + usize::from(if by == 0 {
								top_arr[bx]
							} else {
								nz[block - 2]
							});
							let n = get_coeffs(
								token_dec,
								&probs[2],
								0,
								ctx,
								dq.uv,
								&mut coeffs[block],
							);
							nz[block] = n > 0;
						}
					}
				}
				// Fold the new flags back into the running contexts.
				for by in 0..4 {
					left_nz.y[by] = nz[by * 4 + 3];
				}
				for bx in 0..4 {
					top_nz[mb_x].y[bx] = nz[12 + bx];
				}
				for by in 0..2 {
					left_nz.u[by] = nz[16 + by * 2 + 1];
					left_nz.v[by] = nz[20 + by * 2 + 1];
				}
				for bx in 0..2 {
					top_nz[mb_x].u[bx] = nz[16 + 2 + bx];
					top_nz[mb_x].v[bx] = nz[20 + 2 + bx];
				}
			} else {
				left_nz.y = [false; 4];
				left_nz.u = [false; 2];
				left_nz.v = [false; 2];
				top_nz[mb_x].y = [false; 4];
				top_nz[mb_x].u = [false; 2];
				top_nz[mb_x].v = [false; 2];
				if !is_i4 {
					left_nz.y2 = false;
					top_nz[mb_x].y2 = false;
				}
			}

			let any_coeffs = nz.iter().any(|&b| b) || coeffs.iter().any(|c| c[0] != 0);

			// --- reconstruction ---
			let has_top = mb_y > 0;
			let has_left = mb_x > 0;
			reconstruct_luma(
				&mut strip.y,
				y_stride,
				mb_x,
				ymode,
				&bmodes,
				&coeffs[..16],
				has_top,
				has_left,
				&top_y,
				&left_y,
				tl_y,
			);
			reconstruct_chroma(
				&mut strip.u,
				uv_stride,
				mb_x,
				uvmode as u8,
				&coeffs[16..20],
				has_top,
				has_left,
				&top_u,
				&left_u,
				tl_u,
			);
			reconstruct_chroma(
				&mut strip.v,
				uv_stride,
				mb_x,
				uvmode as u8,
				&coeffs[20..24],
				has_top,
				has_left,
				&top_v,
				&left_v,
				tl_v,
			);

			// --- context bookkeeping for the next macroblock ---
			tl_y = top_y[mb_x * 16 + 15];
			tl_u = top_u[mb_x * 8 + 7];
			tl_v = top_v[mb_x * 8 + 7];
			for r in 0..16 {
				left_y[r] = strip.y[r * y_stride + mb_x * 16 + 15];
			}
			for r in 0..8 {
				left_u[r] = strip.u[r * uv_stride + mb_x * 8 + 7];
				left_v[r] = strip.v[r * uv_stride + mb_x * 8 + 7];
			}
			let bottom = 15 * y_stride;
			top_y[mb_x * 16..mb_x * 16 + 16]
				.copy_from_slice(&strip.y[bottom + mb_x * 16..bottom + mb_x * 16 + 16]);
			if mb_x + 1 == mb_w {
				let last = top_y[y_stride - 1];
				top_y[y_stride..].fill(last);
			}
			let bottom_uv = 7 * uv_stride;
			top_u[mb_x * 8..mb_x * 8 + 8]
				.copy_from_slice(&strip.u[bottom_uv + mb_x * 8..bottom_uv + mb_x * 8 + 8]);
			top_v[mb_x * 8..mb_x * 8 + 8]
				.copy_from_slice(&strip.v[bottom_uv + mb_x * 8..bottom_uv + mb_x * 8 + 8]);

			let implied = if is_i4 {
				[bmodes[12], bmodes[13], bmodes[14], bmodes[15]]
			} else {
				[0; 4]
			};
			top_bmodes[mb_x] = implied;
			left_bmodes = if is_i4 {
				[bmodes[3], bmodes[7], bmodes[11], bmodes[15]]
			} else {
				[0; 4]
			};

			// --- filter info ---
			let mut level = filter.level;
			if segment.enabled {
				level = if segment.absolute_delta {
					segment.filter_delta[segment_id]
				} else {
					level + segment.filter_delta[segment_id]
				};
			}
			level += filter.intra_delta;
			if is_i4 {
				level += filter.bpred_delta;
			}
			strip.filters.push(MbFilterInfo {
				level: level.clamp(0, 63),
				inner: is_i4 || any_coeffs,
			});
		}

		// Exhausted input keeps producing deterministic zeros, matching
		// the boolean decoder's end-of-stream contract; gross truncation
		// was already caught at the partition layout stage.
		sink(strip);
	}
	Ok(())
}

// Reconstructs the 16x16 luma block of one macroblock inside the strip.
#[allow(clippy::too_many_arguments)]
fn reconstruct_luma(
	strip: &mut [u8],
	stride: usize,
	mb_x: usize,
	ymode: i8,
	bmodes: &[u8; 16],
	coeffs: &[[i16; 16]],
	has_top: bool,
	has_left: bool,
	top: &[u8],
	left: &[u8; 16],
	top_left: u8,
) {
	let x0 = mb_x * 16;
	if ymode == B_PRED {
		// 4x4 blocks run sequentially; later blocks predict from the
		// reconstruction of earlier ones.
		for by in 0..4 {
			for bx in 0..4 {
				let block = by * 4 + bx;
				let ctx = build_ctx4(
					strip, stride, x0, bx, by, has_top, has_left, top, left, top_left,
				);
				let base = by * 4 * stride + x0 + bx * 4;
				let mut pred = [0u8; 16];
				pred4(bmodes[block], &mut pred, 4, &ctx);
				let mut out = [0u8; 16];
				itransform(&pred, 4, &coeffs[block], &mut out, 4);
				for r in 0..4 {
					strip[base + r * stride..base + r * stride + 4]
						.copy_from_slice(&out[r * 4..r * 4 + 4]);
				}
			}
		}
	} else {
		let mut pred = vec![0u8; 16 * 16];
		pred_block(
			ymode as u8,
			&mut pred,
			16,
			has_top.then(|| &top[x0..x0 + 16]),
			has_left.then_some(&left[..]),
			top_left,
			16,
		);
		add_residual_block(strip, stride, x0, &pred, 16, coeffs);
	}
}

#[allow(clippy::too_many_arguments)]
fn reconstruct_chroma(
	strip: &mut [u8],
	stride: usize,
	mb_x: usize,
	mode: u8,
	coeffs: &[[i16; 16]],
	has_top: bool,
	has_left: bool,
	top: &[u8],
	left: &[u8; 8],
	top_left: u8,
) {
	let x0 = mb_x * 8;
	let mut pred = vec![0u8; 8 * 8];
	pred_block(
		mode,
		&mut pred,
		8,
		has_top.then(|| &top[x0..x0 + 8]),
		has_left.then_some(&left[..]),
		top_left,
		8,
	);
	add_residual_block(strip, stride, x0, &pred, 8, coeffs);
}

// Adds the 4x4 residuals of a size x size block onto its prediction.
fn add_residual_block(
	strip: &mut [u8],
	stride: usize,
	x0: usize,
	pred: &[u8],
	size: usize,
	coeffs: &[[i16; 16]],
) {
	let blocks_per_row = size / 4;
	for by in 0..blocks_per_row {
		for bx in 0..blocks_per_row {
			let block = by * blocks_per_row + bx;
			let mut out = [0u8; 16];
			itransform(
				&pred[by * 4 * size + bx * 4..],
				size,
				&coeffs[block],
				&mut out,
				4,
			);
			let base = by * 4 * stride + x0 + bx * 4;
			for r in 0..4 {
				strip[base + r * stride..base + r * stride + 4]
					.copy_from_slice(&out[r * 4..r * 4 + 4]);
			}
		}
	}
}

// Gathers the 13 context samples of one 4x4 block.
#[allow(clippy::too_many_arguments)]
fn build_ctx4(
	strip: &[u8],
	stride: usize,
	x0: usize,
	bx: usize,
	by: usize,
	has_top: bool,
	has_left: bool,
	top: &[u8],
	left: &[u8; 16],
	top_left: u8,
) -> Ctx4 {
	let sample_top = |i: usize| -> u8 {
		if by == 0 {
			if has_top { top[x0 + bx * 4 + i] } else { 127 }
		} else {
			strip[(by * 4 - 1) * stride + x0 + bx * 4 + i]
		}
	};
	let mut t = [0u8; 4];
	let mut tr = [0u8; 4];
	for i in 0..4 {
		t[i] = sample_top(i);
	}
	for i in 0..4 {
		tr[i] = if bx == 3 {
			// The true above-right is only present on the top row; other
			// rows replicate the rightmost top sample.
			if by == 0 {
				if has_top { top[x0 + 16 + i] } else { 127 }
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
			if has_left { left[by * 4 + i] } else { 129 }
		} else {
			strip[(by * 4 + i) * stride + x0 + bx * 4 - 1]
		};
	}

	let x = match (bx, by) {
		(0, 0) => top_left,
		(0, _) => {
			if has_left {
				left[by * 4 - 1]
			} else {
				129
			}
		}
		(_, 0) => {
			if has_top {
				top[x0 + bx * 4 - 1]
			} else {
				127
			}
		}
		_ => strip[(by * 4 - 1) * stride + x0 + bx * 4 - 1],
	};

	Ctx4 { l, x, t, tr }
}
