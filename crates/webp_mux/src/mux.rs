//! Chunk-level assembly of WebP files.
//!
//! ## Writing rules
//!
//! - a single image without alpha, metadata or animation uses the simple
//!   layout `RIFF + WEBP + VP8 /VP8L`;
//! - everything else starts with a `VP8X` chunk (flags, canvas size),
//!   `ICCP` precedes the image data, `EXIF`/`XMP ` follow it;
//! - an animation replaces the direct image chunks with `ANIM` followed
//!   by one `ANMF` per frame, each embedding its own image chunks.

use webp_codec::AnimationParams;

use crate::chunk::{ChunkId, MAX_CHUNK_PAYLOAD, chunk_size_on_disk, write_chunk, write_u24};
use crate::error::MuxError;

/// Upper bound on the whole file: the RIFF size field plus 8, minus the
/// final slack the format reserves.
const MAX_FILE_SIZE: u64 = u32::MAX as u64 - 2 + 8;

/// A raw still-image bitstream.
#[derive(Debug, Clone)]
pub enum ImageData {
	/// A VP8 key-frame payload.
	Lossy(Vec<u8>),
	/// A VP8L payload.
	Lossless(Vec<u8>),
}

impl ImageData {
	fn chunk_id(&self) -> ChunkId {
		match self {
			Self::Lossy(_) => ChunkId::VP8,
			Self::Lossless(_) => ChunkId::VP8L,
		}
	}

	fn payload(&self) -> &[u8] {
		match self {
			Self::Lossy(data) | Self::Lossless(data) => data,
		}
	}
}

/// One animation frame queued for assembly.
#[derive(Debug, Clone)]
pub struct Frame {
	/// Canvas x offset in pixels; must be even.
	pub x: u32,
	/// Canvas y offset in pixels; must be even.
	pub y: u32,
	/// Frame width in pixels.
	pub width: u32,
	/// Frame height in pixels.
	pub height: u32,
	/// Display duration in milliseconds.
	pub duration: u32,
	/// Clear the frame rectangle to the background color afterwards.
	pub dispose_to_background: bool,
	/// Alpha-blend onto the previous canvas instead of overwriting.
	pub blend: bool,
	/// The frame's bitstream.
	pub image: ImageData,
	/// Optional alpha plane payload (lossy frames only).
	pub alpha: Option<Vec<u8>>,
}

/// Assembler for a complete WebP file.
#[derive(Debug, Default)]
pub struct WebPMux {
	canvas_width: u32,
	canvas_height: u32,
	image: Option<ImageData>,
	alpha: Option<Vec<u8>>,
	has_alpha_pixels: bool,
	iccp: Option<Vec<u8>>,
	exif: Option<Vec<u8>>,
	xmp: Option<Vec<u8>>,
	animation: Option<AnimationParams>,
	frames: Vec<Frame>,
}

impl WebPMux {
	/// New assembler for the given canvas.
	pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
		Self {
			canvas_width,
			canvas_height,
			..Self::default()
		}
	}

	/// Sets the still image. Illegal together with animation frames.
	pub fn set_image(&mut self, image: ImageData) -> &mut Self {
		self.image = Some(image);
		self
	}

	/// Attaches an alpha plane payload to the still image.
	pub fn set_alpha(&mut self, alpha: Vec<u8>) -> &mut Self {
		self.alpha = Some(alpha);
		self
	}

	/// Marks the image as carrying transparency (sets the VP8X flag even
	/// when the alpha lives inside a lossless bitstream).
	pub fn set_has_alpha(&mut self, has_alpha: bool) -> &mut Self {
		self.has_alpha_pixels = has_alpha;
		self
	}

	/// Sets the ICC profile chunk.
	pub fn set_icc_profile(&mut self, data: Vec<u8>) -> &mut Self {
		self.iccp = Some(data);
		self
	}

	/// Sets the EXIF metadata chunk.
	pub fn set_exif(&mut self, data: Vec<u8>) -> &mut Self {
		self.exif = Some(data);
		self
	}

	/// Sets the XMP metadata chunk.
	pub fn set_xmp(&mut self, data: Vec<u8>) -> &mut Self {
		self.xmp = Some(data);
		self
	}

	/// Switches the file to animation mode.
	pub fn set_animation(&mut self, params: AnimationParams) -> &mut Self {
		self.animation = Some(params);
		self
	}

	/// Appends an animation frame.
	pub fn push_frame(&mut self, frame: Frame) -> &mut Self {
		self.frames.push(frame);
		self
	}

	fn validate(&self) -> Result<(), MuxError> {
		if self.image.is_some() && !self.frames.is_empty() {
			return Err(MuxError::BadConfiguration(
				"still image and animation frames are mutually exclusive".to_string(),
			));
		}
		if self.animation.is_some() != !self.frames.is_empty() {
			return Err(MuxError::BadConfiguration(
				"animation parameters and frames must come together".to_string(),
			));
		}
		if self.image.is_none() && self.frames.is_empty() {
			return Err(MuxError::BadConfiguration("no image data".to_string()));
		}
		if self.alpha.is_some()
			&& !matches!(self.image, Some(ImageData::Lossy(_)))
		{
			return Err(MuxError::BadConfiguration(
				"an alpha chunk requires a lossy image".to_string(),
			));
		}
		for frame in &self.frames {
			if frame.x % 2 != 0 || frame.y % 2 != 0 {
				return Err(MuxError::BadConfiguration(
					"frame offsets must be even".to_string(),
				));
			}
			if frame.x + frame.width > self.canvas_width
				|| frame.y + frame.height > self.canvas_height
			{
				return Err(MuxError::BadConfiguration(
					"frame leaves the canvas".to_string(),
				));
			}
			if frame.width == 0 || frame.height == 0 {
				return Err(MuxError::BadConfiguration("empty frame".to_string()));
			}
			if frame.duration >= 1 << 24 {
				return Err(MuxError::BadConfiguration(
					"frame duration exceeds 24 bits".to_string(),
				));
			}
		}
		Ok(())
	}

	fn needs_vp8x(&self) -> bool {
		self.animation.is_some()
			|| self.alpha.is_some()
			|| self.has_alpha_pixels
			|| self.iccp.is_some()
			|| self.exif.is_some()
			|| self.xmp.is_some()
	}

	/// Assembles the complete file.
	pub fn assemble(&self) -> Result<Vec<u8>, MuxError> {
		self.validate()?;

		let mut body = Vec::new();
		if self.needs_vp8x() {
			let mut flags = 0u8;
			if self.iccp.is_some() {
				flags |= 0x20;
			}
			if self.alpha.is_some() || self.has_alpha_pixels {
				flags |= 0x10;
			}
			if self.exif.is_some() {
				flags |= 0x08;
			}
			if self.xmp.is_some() {
				flags |= 0x04;
			}
			if self.animation.is_some() {
				flags |= 0x02;
			}
			let mut vp8x = vec![flags, 0, 0, 0];
			write_u24(&mut vp8x, self.canvas_width - 1);
			write_u24(&mut vp8x, self.canvas_height - 1);
			write_chunk(&mut body, ChunkId::VP8X, &vp8x);

			if let Some(iccp) = &self.iccp {
				write_chunk(&mut body, ChunkId::ICCP, iccp);
			}

			if let Some(params) = &self.animation {
				let mut anim = Vec::with_capacity(6);
				anim.extend_from_slice(&params.background_color);
				anim.extend_from_slice(&params.loop_count.to_le_bytes());
				write_chunk(&mut body, ChunkId::ANIM, &anim);
				for frame in &self.frames {
					write_chunk(&mut body, ChunkId::ANMF, &anmf_payload(frame));
				}
			} else {
				let image = self.image.as_ref().unwrap();
				if let Some(alpha) = &self.alpha {
					write_chunk(&mut body, ChunkId::ALPH, alpha);
				}
				write_chunk(&mut body, image.chunk_id(), image.payload());
			}

			if let Some(exif) = &self.exif {
				write_chunk(&mut body, ChunkId::EXIF, exif);
			}
			if let Some(xmp) = &self.xmp {
				write_chunk(&mut body, ChunkId::XMP, xmp);
			}
		} else {
			let image = self.image.as_ref().unwrap();
			write_chunk(&mut body, image.chunk_id(), image.payload());
		}

		let total = 12 + body.len() as u64;
		if total > MAX_FILE_SIZE {
			return Err(MuxError::FileTooBig { size: total });
		}

		let mut out = Vec::with_capacity(total as usize);
		out.extend_from_slice(b"RIFF");
		out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
		out.extend_from_slice(b"WEBP");
		out.extend_from_slice(&body);
		Ok(out)
	}
}

// The 16-byte ANMF header followed by the frame's image chunks.
fn anmf_payload(frame: &Frame) -> Vec<u8> {
	let mut payload = Vec::new();
	write_u24(&mut payload, frame.x / 2);
	write_u24(&mut payload, frame.y / 2);
	write_u24(&mut payload, frame.width - 1);
	write_u24(&mut payload, frame.height - 1);
	write_u24(&mut payload, frame.duration);
	let mut flags = 0u8;
	if frame.dispose_to_background {
		flags |= 0x01;
	}
	if frame.blend {
		flags |= 0x02;
	}
	payload.push(flags);
	if let Some(alpha) = &frame.alpha {
		write_chunk(&mut payload, ChunkId::ALPH, alpha);
	}
	write_chunk(&mut payload, frame.image.chunk_id(), frame.image.payload());
	debug_assert!(chunk_size_on_disk(payload.len()) <= MAX_CHUNK_PAYLOAD);
	payload
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dummy_lossless() -> ImageData {
		ImageData::Lossless(vec![0x2f, 0, 0, 0, 0])
	}

	#[test]
	fn test_simple_layout() {
		let mut mux = WebPMux::new(4, 4);
		mux.set_image(dummy_lossless());
		let file = mux.assemble().unwrap();
		assert_eq!(&file[..4], b"RIFF");
		assert_eq!(&file[8..12], b"WEBP");
		assert_eq!(&file[12..16], b"VP8L");
		let riff_size = u32::from_le_bytes(file[4..8].try_into().unwrap());
		assert_eq!(riff_size as usize, file.len() - 8);
	}

	#[test]
	fn test_metadata_forces_vp8x() {
		let mut mux = WebPMux::new(4, 4);
		mux.set_image(dummy_lossless());
		mux.set_xmp(vec![1, 2, 3]);
		let file = mux.assemble().unwrap();
		assert_eq!(&file[12..16], b"VP8X");
		// XMP flag set.
		assert_eq!(file[20] & 0x04, 0x04);
		// Canvas is stored minus one.
		assert_eq!(file[24], 3);
	}

	#[test]
	fn test_image_and_frames_conflict() {
		let mut mux = WebPMux::new(4, 4);
		mux.set_image(dummy_lossless());
		mux.set_animation(AnimationParams::default());
		mux.push_frame(Frame {
			x: 0,
			y: 0,
			width: 4,
			height: 4,
			duration: 100,
			dispose_to_background: false,
			blend: false,
			image: dummy_lossless(),
			alpha: None,
		});
		assert!(matches!(
			mux.assemble(),
			Err(MuxError::BadConfiguration(_))
		));
	}

	#[test]
	fn test_odd_frame_offset_rejected() {
		let mut mux = WebPMux::new(8, 8);
		mux.set_animation(AnimationParams::default());
		mux.push_frame(Frame {
			x: 1,
			y: 0,
			width: 4,
			height: 4,
			duration: 100,
			dispose_to_background: false,
			blend: false,
			image: dummy_lossless(),
			alpha: None,
		});
		assert!(mux.assemble().is_err());
	}

	#[test]
	fn test_animation_layout() {
		let mut mux = WebPMux::new(4, 4);
		let mut params = AnimationParams::default();
		params.loop_count = 3;
		mux.set_animation(params);
		for _ in 0..2 {
			mux.push_frame(Frame {
				x: 0,
				y: 0,
				width: 4,
				height: 4,
				duration: 100,
				dispose_to_background: false,
				blend: true,
				image: dummy_lossless(),
				alpha: None,
			});
		}
		let file = mux.assemble().unwrap();
		assert_eq!(&file[12..16], b"VP8X");
		// Animation flag.
		assert_eq!(file[20] & 0x02, 0x02);
		// ANIM chunk follows VP8X (10-byte payload => 18 bytes).
		assert_eq!(&file[30..34], b"ANIM");
	}
}
