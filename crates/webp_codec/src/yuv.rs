//! Color conversion between packed ARGB and planar YUV 4:2:0.
//!
//! All kernels are 16-bit fixed point. The RGB→YUV direction uses the
//! BT.601 studio-range matrix; the YUV→RGB direction is its inverse, with
//! an optional bilinear ("fancy") chroma upsampler for decoding.

use crate::dsp::clip_8b;
use crate::picture::{ArgbBuffer, Plane, YuvaPlanes};

const YUV_FIX: i32 = 16;
const YUV_HALF: i32 = 1 << (YUV_FIX - 1);

#[inline]
fn rgb_to_y(r: i32, g: i32, b: i32) -> u8 {
	let luma = 16839 * r + 33059 * g + 6420 * b;
	((luma + (16 << YUV_FIX) + YUV_HALF) >> YUV_FIX) as u8
}

#[inline]
fn rgb_to_u(r: i32, g: i32, b: i32) -> u8 {
	let u = -9719 * r - 19081 * g + 28800 * b;
	((u + (128 << YUV_FIX) + YUV_HALF) >> YUV_FIX).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_v(r: i32, g: i32, b: i32) -> u8 {
	let v = 28800 * r - 24116 * g - 4684 * b;
	((v + (128 << YUV_FIX) + YUV_HALF) >> YUV_FIX).clamp(0, 255) as u8
}

#[inline]
fn yuv_to_rgb(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
	let y1 = 76309 * (y - 16);
	let r = clip_8b((y1 + 104597 * (v - 128) + YUV_HALF) >> YUV_FIX);
	let g = clip_8b((y1 - 25675 * (u - 128) - 53279 * (v - 128) + YUV_HALF) >> YUV_FIX);
	let b = clip_8b((y1 + 132201 * (u - 128) + YUV_HALF) >> YUV_FIX);
	(r, g, b)
}

/// Converts a packed ARGB buffer into freshly allocated YUV 4:2:0 planes.
///
/// Chroma is averaged over each 2x2 block; odd edges reuse the last column
/// or row. Alpha is extracted into its own plane when `keep_alpha` is set.
pub fn argb_to_yuva(buf: &ArgbBuffer, keep_alpha: bool) -> YuvaPlanes {
	let (width, height) = (buf.width(), buf.height());
	let mut planes = YuvaPlanes::new(width, height, keep_alpha);

	for y in 0..height {
		let src = buf.row(y);
		let dst = planes.y.row_mut(y);
		for x in 0..width {
			let px = src[x];
			dst[x] = rgb_to_y(
				(px >> 16 & 0xff) as i32,
				(px >> 8 & 0xff) as i32,
				(px & 0xff) as i32,
			);
		}
		if let Some(a) = planes.a.as_mut() {
			let dst = a.row_mut(y);
			for x in 0..width {
				dst[x] = (src[x] >> 24) as u8;
			}
		}
	}

	let uv_w = width.div_ceil(2);
	let uv_h = height.div_ceil(2);
	for cy in 0..uv_h {
		for cx in 0..uv_w {
			let (mut r, mut g, mut b) = (0i32, 0i32, 0i32);
			for dy in 0..2 {
				for dx in 0..2 {
					let sx = (2 * cx + dx).min(width - 1);
					let sy = (2 * cy + dy).min(height - 1);
					let px = buf.row(sy)[sx];
					r += (px >> 16 & 0xff) as i32;
					g += (px >> 8 & 0xff) as i32;
					b += (px & 0xff) as i32;
				}
			}
			// Rounded average over the 2x2 block.
			let (r, g, b) = ((r + 2) >> 2, (g + 2) >> 2, (b + 2) >> 2);
			planes.u.row_mut(cy)[cx] = rgb_to_u(r, g, b);
			planes.v.row_mut(cy)[cx] = rgb_to_v(r, g, b);
		}
	}

	planes
}

/// Converts planar YUV(A) back into packed ARGB.
///
/// `fancy_upsampling` selects the 4-tap bilinear chroma filter; otherwise
/// each chroma sample is replicated over its 2x2 block.
pub fn yuva_to_argb(planes: &YuvaPlanes, fancy_upsampling: bool) -> ArgbBuffer {
	let (width, height) = (planes.y.width(), planes.y.height());
	let mut out = ArgbBuffer::new(width, height);

	for y in 0..height {
		for x in 0..width {
			let (u, v) = if fancy_upsampling {
				upsample_bilinear(&planes.u, &planes.v, x, y)
			} else {
				(
					i32::from(planes.u.at(x / 2, y / 2)),
					i32::from(planes.v.at(x / 2, y / 2)),
				)
			};
			let (r, g, b) = yuv_to_rgb(i32::from(planes.y.at(x, y)), u, v);
			let a = planes.a.as_ref().map_or(0xff, |a| a.at(x, y));
			out.row_mut(y)[x] = (u32::from(a) << 24)
				| (u32::from(r) << 16)
				| (u32::from(g) << 8)
				| u32::from(b);
		}
	}
	out
}

// (9 * nearest + 3 * horizontal neighbor + 3 * vertical + 1 * diagonal + 8) >> 4
fn upsample_bilinear(u: &Plane, v: &Plane, x: usize, y: usize) -> (i32, i32) {
	let cw = u.width();
	let ch = u.height();
	let cx = x / 2;
	let cy = y / 2;
	// Neighbor toward which this luma sample leans.
	let nx = if x % 2 == 0 { cx.saturating_sub(1) } else { (cx + 1).min(cw - 1) };
	let ny = if y % 2 == 0 { cy.saturating_sub(1) } else { (cy + 1).min(ch - 1) };

	let blend = |p: &Plane| -> i32 {
		let c = i32::from(p.at(cx, cy));
		let h = i32::from(p.at(nx, cy));
		let vv = i32::from(p.at(cx, ny));
		let d = i32::from(p.at(nx, ny));
		(9 * c + 3 * h + 3 * vv + d + 8) >> 4
	};
	(blend(u), blend(v))
}

/// Flattens the RGB values of fully transparent pixels to one uniform
/// color so they compress well without affecting the rendered output.
///
/// The replacement color is the average of all visible pixels (mid-gray
/// when the image is entirely transparent). Used when `exact` is off.
pub fn cleanup_transparent_area(pixels: &mut [u32]) {
	let mut sum = [0u64; 3];
	let mut count = 0u64;
	for &px in pixels.iter() {
		if px >> 24 != 0 {
			sum[0] += u64::from(px >> 16 & 0xff);
			sum[1] += u64::from(px >> 8 & 0xff);
			sum[2] += u64::from(px & 0xff);
			count += 1;
		}
	}
	let flat = if count == 0 {
		0x0080_8080
	} else {
		let r = (sum[0] / count) as u32;
		let g = (sum[1] / count) as u32;
		let b = (sum[2] / count) as u32;
		(r << 16) | (g << 8) | b
	};
	for px in pixels.iter_mut() {
		if *px >> 24 == 0 {
			*px = flat;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_gray_is_stable() {
		// Mid-gray has no chroma energy, so a YUV round-trip keeps it.
		let buf = ArgbBuffer::from_pixels(vec![0xff80_8080; 16], 4, 4);
		let planes = argb_to_yuva(&buf, false);
		let back = yuva_to_argb(&planes, false);
		for &px in back.pixels() {
			let r = px >> 16 & 0xff;
			let g = px >> 8 & 0xff;
			let b = px & 0xff;
			assert!(r.abs_diff(0x80) <= 2 && g.abs_diff(0x80) <= 2 && b.abs_diff(0x80) <= 2);
		}
	}

	#[test]
	fn test_round_trip_close() {
		let pixels: Vec<u32> = (0..64)
			.map(|i| 0xff00_0000 | (i * 4) << 16 | (255 - i * 2) << 8 | (i * 3))
			.collect();
		let buf = ArgbBuffer::from_pixels(pixels, 8, 8);
		let planes = argb_to_yuva(&buf, false);
		let back = yuva_to_argb(&planes, true);
		for (a, b) in buf.pixels().iter().zip(back.pixels()) {
			for shift in [0, 8, 16] {
				let x = (a >> shift & 0xff) as i32;
				let y = (b >> shift & 0xff) as i32;
				// 4:2:0 chroma subsampling on a gradient stays within a
				// small band.
				assert!((x - y).abs() <= 16, "{x} vs {y}");
			}
		}
	}

	#[test]
	fn test_alpha_plane_extraction() {
		let buf = ArgbBuffer::from_pixels(vec![0x40ff_0000; 4], 2, 2);
		let planes = argb_to_yuva(&buf, true);
		assert_eq!(planes.a.as_ref().unwrap().at(1, 1), 0x40);
	}

	#[test]
	fn test_cleanup_flattens_invisible() {
		let mut pixels = vec![0xffff_0000, 0x0012_3456, 0xffff_0000, 0x0065_4321];
		cleanup_transparent_area(&mut pixels);
		assert_eq!(pixels[1], pixels[3]);
		assert_eq!(pixels[1], 0x00ff_0000);
		assert_eq!(pixels[0], 0xffff_0000);
	}
}
