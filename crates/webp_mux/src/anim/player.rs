//! Animation playback: canvas reconstruction.

use webp_codec::config::DecoderOptions;
use webp_codec::picture::ArgbBuffer;

use crate::demux::Demuxer;
use crate::error::DemuxError;
use crate::simple::decode_image_payload;

/// Steps through an animation's frames, maintaining the canvas.
#[derive(Debug)]
pub struct AnimationPlayer<'a> {
	demuxer: &'a Demuxer<'a>,
	options: DecoderOptions,
	canvas: ArgbBuffer,
	next_frame: usize,
	/// Rectangle of the previous frame when it asked for disposal.
	pending_dispose: Option<(usize, usize, usize, usize)>,
}

impl<'a> AnimationPlayer<'a> {
	/// New player over a parsed animation.
	pub fn new(demuxer: &'a Demuxer<'a>) -> Result<Self, DemuxError> {
		let features = demuxer.features();
		if !features.has_animation {
			return Err(DemuxError::BitstreamError("not an animation"));
		}
		Ok(Self {
			demuxer,
			options: DecoderOptions::default(),
			canvas: ArgbBuffer::new(features.width as usize, features.height as usize),
			next_frame: 0,
			pending_dispose: None,
		})
	}

	/// Animation loop count as stored (0 = forever).
	pub fn loop_count(&self) -> u16 {
		self.demuxer.loop_count()
	}

	/// Decodes and composites the next frame. Returns the frame duration
	/// and the updated canvas, or `None` past the last frame.
	pub fn next_frame(&mut self) -> Result<Option<(u32, &ArgbBuffer)>, DemuxError> {
		let Some(info) = self.demuxer.frame(self.next_frame) else {
			return Ok(None);
		};
		self.next_frame += 1;

		// Previous frame's disposal applies before this frame lands.
		if let Some((x, y, w, h)) = self.pending_dispose.take() {
			let background = background_argb(self.demuxer.background_color());
			for row in y..y + h {
				self.canvas.row_mut(row)[x..x + w].fill(background);
			}
		}

		let alpha = info.alpha.as_ref().map(|r| self.demuxer.bytes(r));
		let image = decode_image_payload(
			info.format,
			self.demuxer.bytes(&info.image),
			alpha,
			&self.options,
		)?;
		if image.width() != info.width as usize || image.height() != info.height as usize {
			return Err(DemuxError::BitstreamError("frame size mismatch"));
		}

		let x0 = info.x as usize;
		let y0 = info.y as usize;
		for row in 0..image.height() {
			let src = image.row(row);
			let dst = &mut self.canvas.row_mut(y0 + row)[x0..x0 + image.width()];
			if info.blend {
				for (d, &s) in dst.iter_mut().zip(src) {
					*d = blend_pixel(s, *d);
				}
			} else {
				dst.copy_from_slice(src);
			}
		}

		if info.dispose_to_background {
			self.pending_dispose =
				Some((x0, y0, info.width as usize, info.height as usize));
		}

		Ok(Some((info.duration, &self.canvas)))
	}
}

// ANIM stores the background as B, G, R, A bytes.
fn background_argb(bytes: [u8; 4]) -> u32 {
	(u32::from(bytes[3]) << 24)
		| (u32::from(bytes[2]) << 16)
		| (u32::from(bytes[1]) << 8)
		| u32::from(bytes[0])
}

// Source-over compositing in straight-alpha byte arithmetic.
fn blend_pixel(src: u32, dst: u32) -> u32 {
	let sa = src >> 24;
	if sa == 255 {
		return src;
	}
	if sa == 0 {
		return dst;
	}
	let da = dst >> 24;
	let out_a = sa + da * (255 - sa) / 255;
	if out_a == 0 {
		return 0;
	}
	let mut out = out_a << 24;
	for shift in [16, 8, 0] {
		let s = src >> shift & 0xff;
		let d = dst >> shift & 0xff;
		let channel = (s * sa * 255 + d * da * (255 - sa)) / (out_a * 255);
		out |= channel.min(255) << shift;
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_blend_opaque_wins() {
		assert_eq!(blend_pixel(0xffaa_bbcc, 0xff11_2233), 0xffaa_bbcc);
	}

	#[test]
	fn test_blend_transparent_keeps_dst() {
		assert_eq!(blend_pixel(0x00aa_bbcc, 0xff11_2233), 0xff11_2233);
	}

	#[test]
	fn test_blend_half_mixes() {
		let out = blend_pixel(0x80ff_0000, 0xff00_0000);
		let r = out >> 16 & 0xff;
		assert!((100..=160).contains(&r), "r = {r}");
		assert_eq!(out >> 24, 0xff);
	}

	#[test]
	fn test_background_byte_order() {
		assert_eq!(background_argb([0x01, 0x02, 0x03, 0x04]), 0x0403_0201);
	}
}
