//! Candidate-frame ring buffer with keyframe selection.
//!
//! Each queued frame may carry two encodings: the sub-rectangle update
//! and the full keyframe variant. Within a window of at most
//! `kmax - kmin` pending frames the cheapest keyframe candidate (by size
//! penalty against its sub-frame form) is selected; reaching `kmax`
//! frames since the last keyframe forces the selection, so consecutive
//! keyframes are never farther apart than `kmax` and never closer than
//! `kmin`.

use std::collections::VecDeque;

use crate::mux::Frame;

// A frame with its two candidate encodings.
#[derive(Debug)]
struct CachedFrame {
	sub: Option<Frame>,
	key: Option<Frame>,
}

impl CachedFrame {
	fn key_penalty(&self) -> i64 {
		let size = |f: &Option<Frame>| {
			f.as_ref().map_or(0i64, |f| {
				f.image_len() as i64 + f.alpha.as_ref().map_or(0, |a| a.len() as i64)
			})
		};
		size(&self.key) - size(&self.sub)
	}
}

impl Frame {
	fn image_len(&self) -> usize {
		match &self.image {
			crate::mux::ImageData::Lossy(d) | crate::mux::ImageData::Lossless(d) => d.len(),
		}
	}
}

/// Ring of pending frames plus the already-selected output sequence.
#[derive(Debug)]
pub struct FrameCache {
	pending: VecDeque<CachedFrame>,
	output: Vec<Frame>,
	kmin: u32,
	kmax: u32,
	count_since_key: u32,
	flush_count: usize,
	best_delta: i64,
	keyframe: Option<usize>,
}

impl FrameCache {
	/// New cache with the given keyframe-distance window.
	pub fn new(kmin: u32, kmax: u32) -> Self {
		debug_assert!(kmin < kmax);
		Self {
			pending: VecDeque::new(),
			output: Vec::new(),
			kmin,
			kmax,
			count_since_key: 0,
			flush_count: 0,
			best_delta: i64::MAX,
			keyframe: None,
		}
	}

	/// Whether the caller should also produce a keyframe candidate for
	/// the next frame.
	pub fn should_try_keyframe(&self) -> bool {
		self.count_since_key >= self.kmin
	}

	/// Queues one frame. Exactly one of `sub`/`key` may be `None`.
	pub fn add_frame(&mut self, sub: Option<Frame>, key: Option<Frame>) {
		debug_assert!(sub.is_some() || key.is_some());
		let forced_key = sub.is_none();
		let has_key = key.is_some();
		self.pending.push_back(CachedFrame { sub, key });
		let count = self.pending.len();

		if forced_key {
			self.keyframe = Some(count - 1);
			self.flush_count = count;
		} else {
			self.count_since_key += 1;
			if !has_key {
				self.flush_count = count;
			} else {
				let delta = self.pending[count - 1].key_penalty();
				if delta <= self.best_delta {
					self.keyframe = Some(count - 1);
					self.best_delta = delta;
					// Everything before the new keyframe candidate can go
					// out as sub-frames.
					self.flush_count = count - 1;
				}
				if self.count_since_key == self.kmax {
					self.flush_count = count;
				}
			}
		}
		self.flush();
	}

	// Moves decided frames into the output sequence.
	fn flush(&mut self) {
		while self.flush_count > 0 {
			let mut frame = self.pending.pop_front().unwrap();
			let use_key = self.keyframe == Some(0);
			let chosen = if use_key {
				self.keyframe = None;
				self.best_delta = i64::MAX;
				// Distance counting restarts at the frame actually chosen
				// as keyframe; everything still queued sits after it.
				self.count_since_key = self.pending.len() as u32;
				let mut f = frame.key.take().unwrap();
				f.blend = false;
				f
			} else {
				frame.sub.take().or(frame.key.take()).unwrap()
			};
			self.output.push(chosen);
			self.flush_count -= 1;
			if let Some(k) = self.keyframe {
				self.keyframe = Some(k - 1);
			}
		}
	}

	/// Extends the duration of the most recently queued frame. Used when
	/// a frame is pixel-identical to the previous canvas.
	pub fn extend_last_duration(&mut self, extra: u32) -> bool {
		if let Some(last) = self.pending.back_mut() {
			if let Some(f) = last.sub.as_mut() {
				f.duration += extra;
			}
			if let Some(f) = last.key.as_mut() {
				f.duration += extra;
			}
			true
		} else if let Some(last) = self.output.last_mut() {
			last.duration += extra;
			true
		} else {
			false
		}
	}

	/// Flushes everything and returns the final frame sequence.
	pub fn finish(mut self) -> Vec<Frame> {
		self.flush_count = self.pending.len();
		self.flush();
		self.output
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mux::{Frame, ImageData};

	fn frame(size: usize) -> Frame {
		Frame {
			x: 0,
			y: 0,
			width: 4,
			height: 4,
			duration: 100,
			dispose_to_background: false,
			blend: true,
			image: ImageData::Lossless(vec![0; size]),
			alpha: None,
		}
	}

	#[test]
	fn test_forced_keyframes_at_kmax_one() {
		let mut cache = FrameCache::new(0, 1);
		assert!(cache.should_try_keyframe());
		cache.add_frame(None, Some(frame(10)));
		cache.add_frame(Some(frame(4)), Some(frame(12)));
		let frames = cache.finish();
		assert_eq!(frames.len(), 2);
		// kmax = 1 forces every frame to be a keyframe.
		assert!(!frames[0].blend);
		assert!(!frames[1].blend);
	}

	#[test]
	fn test_sub_frames_between_keyframes() {
		let mut cache = FrameCache::new(3, 10);
		cache.add_frame(None, Some(frame(10)));
		for _ in 0..3 {
			assert!(!cache.should_try_keyframe());
			cache.add_frame(Some(frame(4)), None);
		}
		assert!(cache.should_try_keyframe());
		let frames = cache.finish();
		assert_eq!(frames.len(), 4);
		assert!(frames[1..].iter().all(|f| f.blend));
	}

	#[test]
	fn test_keyframe_distance_bounded_by_kmax() {
		let kmin = 1;
		let kmax = 4;
		let mut cache = FrameCache::new(kmin, kmax);
		cache.add_frame(None, Some(frame(10)));
		for i in 0..20u32 {
			if cache.should_try_keyframe() {
				// Key candidates stay expensive so only forcing picks them.
				cache.add_frame(Some(frame(4 + i as usize % 3)), Some(frame(50)));
			} else {
				cache.add_frame(Some(frame(4)), None);
			}
		}
		let frames = cache.finish();
		let key_positions: Vec<usize> = frames
			.iter()
			.enumerate()
			.filter(|(_, f)| !f.blend)
			.map(|(i, _)| i)
			.collect();
		assert!(!key_positions.is_empty());
		for pair in key_positions.windows(2) {
			let dist = (pair[1] - pair[0]) as u32;
			assert!(dist >= kmin && dist <= kmax, "distance {dist}");
		}
	}

	#[test]
	fn test_cheap_keyframe_preferred() {
		let mut cache = FrameCache::new(0, 5);
		cache.add_frame(None, Some(frame(10)));
		// A keyframe candidate cheaper than its sub-frame form gets
		// selected even before kmax forces it.
		cache.add_frame(Some(frame(50)), Some(frame(5)));
		let frames = cache.finish();
		assert!(!frames[1].blend);
	}

	#[test]
	fn test_extend_last_duration() {
		let mut cache = FrameCache::new(0, 2);
		cache.add_frame(None, Some(frame(10)));
		assert!(cache.extend_last_duration(40));
		let frames = cache.finish();
		assert_eq!(frames[0].duration, 140);
	}
}
