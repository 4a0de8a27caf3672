//! WebP container support: RIFF chunk mux/demux, animation assembly and
//! playback, and one-call still-image encode/decode wrappers around the
//! `webp_codec` bitstream codecs.
//!
//! # Examples
//!
//! ```
//! use webp_codec::{EncoderConfig, Picture};
//!
//! let picture = Picture::from_rgb(&[10, 20, 30, 40, 50, 60], 2, 1).unwrap();
//! let file = webp_mux::encode(&picture, &EncoderConfig::lossless(3)).unwrap();
//! assert_eq!(&file[..4], b"RIFF");
//!
//! let decoded = webp_mux::decode(&file).unwrap();
//! assert_eq!(decoded.width(), 2);
//! ```

pub mod anim;
pub mod chunk;
pub mod demux;
mod error;
pub mod mux;
mod simple;

pub use anim::{AnimationEncoder, AnimationPlayer};
pub use chunk::ChunkId;
pub use demux::{Demuxer, FrameInfo, ImageFormat, WebPFeatures};
pub use error::{DemuxError, MuxError};
pub use mux::{Frame, ImageData, WebPMux};
pub use simple::{decode, decode_with_options, encode, encode_into, encode_with_progress};

#[cfg(test)]
mod tests {
	use super::*;
	use webp_codec::config::{AnimationParams, EncoderConfig};
	use webp_codec::picture::ArgbBuffer;

	fn solid(color: u32, width: usize, height: usize) -> ArgbBuffer {
		ArgbBuffer::from_pixels(vec![color; width * height], width, height)
	}

	// test-log surfaces the frame cache's debug trace on failure.
	#[test_log::test]
	fn test_two_frame_animation_forced_keyframes() {
		// Red then blue 4x4 frames, kmin=0 / kmax=1: both frames must be
		// keyframes and the final canvas must be solid blue.
		let params = AnimationParams {
			kmin: 0,
			kmax: 1,
			loop_count: 0,
			..AnimationParams::default()
		};
		let mut encoder =
			AnimationEncoder::new(4, 4, EncoderConfig::lossless(3), params).unwrap();
		encoder.add_frame(&solid(0xffff_0000, 4, 4), 100).unwrap();
		encoder.add_frame(&solid(0xff00_00ff, 4, 4), 100).unwrap();
		let file = encoder.finalize().unwrap();

		let demuxer = Demuxer::new(&file).unwrap();
		assert!(demuxer.features().has_animation);
		assert_eq!(demuxer.num_frames(), 2);
		assert_eq!(demuxer.loop_count(), 0);
		assert!(!demuxer.frame(0).unwrap().blend);
		assert!(!demuxer.frame(1).unwrap().blend);

		let mut player = AnimationPlayer::new(&demuxer).unwrap();
		let (d0, canvas) = player.next_frame().unwrap().unwrap();
		assert_eq!(d0, 100);
		assert!(canvas.pixels().iter().all(|&px| px == 0xffff_0000));
		let (_, canvas) = player.next_frame().unwrap().unwrap();
		assert!(canvas.pixels().iter().all(|&px| px == 0xff00_00ff));
		assert!(player.next_frame().unwrap().is_none());
	}

	#[test]
	fn test_sub_rectangle_updates() {
		// A long animation where only a small square moves: most frames
		// should be stored as sub-rectangles.
		let params = AnimationParams {
			kmin: 2,
			kmax: 10,
			..AnimationParams::default()
		};
		let mut encoder =
			AnimationEncoder::new(16, 16, EncoderConfig::lossless(2), params).unwrap();
		for i in 0..6usize {
			let mut canvas = solid(0xffff_ffff, 16, 16);
			let x = i * 2;
			for y in 0..4 {
				for dx in 0..4 {
					canvas.row_mut(4 + y)[x + dx] = 0xff00_0000;
				}
			}
			encoder.add_frame(&canvas, 50).unwrap();
		}
		let file = encoder.finalize().unwrap();
		let demuxer = Demuxer::new(&file).unwrap();
		assert_eq!(demuxer.num_frames(), 6);
		let sub_frames = (0..6)
			.filter(|&i| {
				let f = demuxer.frame(i).unwrap();
				(f.width as usize) < 16 || (f.height as usize) < 16
			})
			.count();
		assert!(sub_frames >= 4, "only {sub_frames} sub-frames");

		// Playback reproduces the last canvas exactly (lossless frames).
		let mut player = AnimationPlayer::new(&demuxer).unwrap();
		let mut last = None;
		while let Some((_, canvas)) = player.next_frame().unwrap() {
			last = Some(canvas.clone());
		}
		let last = last.unwrap();
		assert_eq!(last.row(4)[10], 0xff00_0000);
		assert_eq!(last.row(0)[0], 0xffff_ffff);
	}

	#[test]
	fn test_identical_frames_merge() {
		let params = AnimationParams::default();
		let mut encoder =
			AnimationEncoder::new(4, 4, EncoderConfig::lossless(2), params).unwrap();
		let canvas = solid(0xff12_3456, 4, 4);
		encoder.add_frame(&canvas, 40).unwrap();
		encoder.add_frame(&canvas, 60).unwrap();
		let file = encoder.finalize().unwrap();
		let demuxer = Demuxer::new(&file).unwrap();
		assert_eq!(demuxer.num_frames(), 1);
		assert_eq!(demuxer.frame(0).unwrap().duration, 100);
	}

	#[test]
	fn test_loop_count_round_trip() {
		let params = AnimationParams {
			kmin: 0,
			kmax: 2,
			loop_count: 7,
			..AnimationParams::default()
		};
		let mut encoder =
			AnimationEncoder::new(2, 2, EncoderConfig::lossless(1), params).unwrap();
		encoder.add_frame(&solid(0xff00_ff00, 2, 2), 10).unwrap();
		let file = encoder.finalize().unwrap();
		let demuxer = Demuxer::new(&file).unwrap();
		assert_eq!(demuxer.loop_count(), 7);
	}
}
