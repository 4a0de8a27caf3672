//! Animation assembly.
//!
//! Each incoming canvas is compared against the previous one; only the
//! even-aligned bounding box of changed pixels is encoded as the
//! sub-frame candidate. When the frame cache asks for it, a full-canvas
//! keyframe candidate is encoded as well, and the cache picks the cheaper
//! variant under the keyframe-distance constraints.

use log::debug;

use webp_codec::config::{AnimationParams, EncoderConfig};
use webp_codec::picture::ArgbBuffer;

use crate::anim::cache::FrameCache;
use crate::error::MuxError;
use crate::mux::{Frame, WebPMux};
use crate::simple::encode_view;

/// Rectangle of changed pixels, snapped to even offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRect {
	/// Left edge (even).
	pub x: usize,
	/// Top edge (even).
	pub y: usize,
	/// Rectangle width.
	pub width: usize,
	/// Rectangle height.
	pub height: usize,
}

/// Finds the bounding box of pixels differing between two canvases.
/// Returns `None` when the canvases are identical.
pub fn change_rect(prev: &ArgbBuffer, next: &ArgbBuffer) -> Option<ChangeRect> {
	let width = prev.width();
	let height = prev.height();
	let mut min_x = width;
	let mut min_y = height;
	let mut max_x = 0usize;
	let mut max_y = 0usize;
	for y in 0..height {
		let a = prev.row(y);
		let b = next.row(y);
		for x in 0..width {
			if a[x] != b[x] {
				min_x = min_x.min(x);
				min_y = min_y.min(y);
				max_x = max_x.max(x);
				max_y = max_y.max(y);
			}
		}
	}
	if min_x > max_x {
		return None;
	}
	// Frame offsets are stored halved, so snap to even coordinates.
	let x = min_x & !1;
	let y = min_y & !1;
	Some(ChangeRect {
		x,
		y,
		width: max_x - x + 1,
		height: max_y - y + 1,
	})
}

/// Incremental animation encoder.
#[derive(Debug)]
pub struct AnimationEncoder {
	width: u32,
	height: u32,
	config: EncoderConfig,
	params: AnimationParams,
	cache: FrameCache,
	prev_canvas: Option<ArgbBuffer>,
}

impl AnimationEncoder {
	/// New encoder for the given canvas size.
	pub fn new(
		width: u32,
		height: u32,
		config: EncoderConfig,
		params: AnimationParams,
	) -> Result<Self, MuxError> {
		config.validate().map_err(MuxError::Encoding)?;
		params.validate().map_err(MuxError::Encoding)?;
		Ok(Self {
			width,
			height,
			config,
			cache: FrameCache::new(params.kmin, params.kmax),
			params,
			prev_canvas: None,
		})
	}

	/// Appends one canvas with its display duration in milliseconds.
	pub fn add_frame(&mut self, canvas: &ArgbBuffer, duration: u32) -> Result<(), MuxError> {
		if canvas.width() != self.width as usize || canvas.height() != self.height as usize {
			return Err(MuxError::BadConfiguration(
				"frame size differs from canvas".to_string(),
			));
		}

		let Some(prev) = &self.prev_canvas else {
			// The first frame is always a keyframe.
			let key = self.encode_rect(canvas, 0, 0, canvas.width(), canvas.height(), duration)?;
			self.cache.add_frame(None, Some(key));
			self.prev_canvas = Some(canvas.clone());
			return Ok(());
		};

		let rect = match change_rect(prev, canvas) {
			Some(rect) => rect,
			None => {
				// Nothing changed; stretch the previous frame instead of
				// emitting an empty one.
				debug!("identical frame folded into previous duration");
				self.cache.extend_last_duration(duration);
				return Ok(());
			}
		};

		let sub = {
			let mut frame =
				self.encode_rect(canvas, rect.x, rect.y, rect.width, rect.height, duration)?;
			frame.blend = true;
			frame
		};
		let key = if self.cache.should_try_keyframe() {
			Some(self.encode_rect(canvas, 0, 0, canvas.width(), canvas.height(), duration)?)
		} else {
			None
		};
		self.cache.add_frame(Some(sub), key);
		self.prev_canvas = Some(canvas.clone());
		Ok(())
	}

	fn encode_rect(
		&self,
		canvas: &ArgbBuffer,
		x: usize,
		y: usize,
		width: usize,
		height: usize,
		duration: u32,
	) -> Result<Frame, MuxError> {
		let view = canvas.view(x, y, width, height);
		let (image, alpha) = encode_view(&view, &self.config)?;
		Ok(Frame {
			x: x as u32,
			y: y as u32,
			width: width as u32,
			height: height as u32,
			duration,
			dispose_to_background: false,
			blend: false,
			image,
			alpha,
		})
	}

	/// Flushes the cache and assembles the final file.
	pub fn finalize(self) -> Result<Vec<u8>, MuxError> {
		let frames = self.cache.finish();
		debug!("animation: {} frame(s) assembled", frames.len());
		let mut mux = WebPMux::new(self.width, self.height);
		mux.set_animation(self.params);
		for frame in frames {
			mux.push_frame(frame);
		}
		mux.assemble()
	}
}
