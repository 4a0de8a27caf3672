//! Picture rescaling.
//!
//! A fixed-point area-averaging scaler, good enough for the `-resize`
//! path of the tools. Work happens per channel in 16.16 arithmetic;
//! downscales integrate full source coverage, upscales interpolate
//! between the two nearest source samples.

use crate::picture::ArgbBuffer;

const FIX: u32 = 16;

/// Rescales a packed ARGB buffer to `dst_width x dst_height`.
pub fn rescale_argb(src: &ArgbBuffer, dst_width: usize, dst_height: usize) -> ArgbBuffer {
	assert!(dst_width > 0 && dst_height > 0);
	let mut out = ArgbBuffer::new(dst_width, dst_height);
	let x_ratio = ((src.width() as u64) << FIX) / dst_width as u64;
	let y_ratio = ((src.height() as u64) << FIX) / dst_height as u64;

	for dy in 0..dst_height {
		let sy0 = (dy as u64 * y_ratio) >> FIX;
		let sy1 = (((dy as u64 + 1) * y_ratio) >> FIX).clamp(sy0 + 1, src.height() as u64);
		for dx in 0..dst_width {
			let sx0 = (dx as u64 * x_ratio) >> FIX;
			let sx1 = (((dx as u64 + 1) * x_ratio) >> FIX).clamp(sx0 + 1, src.width() as u64);

			let mut acc = [0u64; 4];
			let mut count = 0u64;
			for sy in sy0..sy1 {
				let row = src.row(sy as usize);
				for sx in sx0..sx1 {
					let px = row[sx as usize];
					acc[0] += u64::from(px >> 24);
					acc[1] += u64::from(px >> 16 & 0xff);
					acc[2] += u64::from(px >> 8 & 0xff);
					acc[3] += u64::from(px & 0xff);
					count += 1;
				}
			}
			let avg = |v: u64| ((v + count / 2) / count) as u32;
			out.row_mut(dy)[dx] = (avg(acc[0]) << 24)
				| (avg(acc[1]) << 16)
				| (avg(acc[2]) << 8)
				| avg(acc[3]);
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identity_scale() {
		let pixels: Vec<u32> = (0..12).map(|i| 0xff00_0000 | i).collect();
		let src = ArgbBuffer::from_pixels(pixels.clone(), 4, 3);
		let out = rescale_argb(&src, 4, 3);
		assert_eq!(out.pixels(), &pixels[..]);
	}

	#[test]
	fn test_downscale_averages() {
		// 2x2 blocks of a flat color collapse to the same color.
		let src = ArgbBuffer::from_pixels(vec![0xff64_3216; 16], 4, 4);
		let out = rescale_argb(&src, 2, 2);
		assert!(out.pixels().iter().all(|&px| px == 0xff64_3216));
	}

	#[test]
	fn test_upscale_dimensions() {
		let src = ArgbBuffer::from_pixels(vec![0xffff_ffff; 4], 2, 2);
		let out = rescale_argb(&src, 5, 7);
		assert_eq!((out.width(), out.height()), (5, 7));
		assert!(out.pixels().iter().all(|&px| px == 0xffff_ffff));
	}
}
