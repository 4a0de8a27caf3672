//! Chunk-level parsing of WebP files.
//!
//! The parser is a small state machine `NeedRiff -> NeedVp8x? ->
//! PerChunk`: the RIFF prologue first, then either a bare image chunk
//! (simple layout) or a `VP8X` header followed by the chunk sequence,
//! with position ordering validated as chunks accumulate. Truncated input
//! surfaces as [`DemuxError::NotEnoughData`]; everything parsed so far is
//! kept, so feeding a longer buffer simply succeeds.

use std::ops::Range;

use log::warn;

use webp_codec::{vp8, vp8l};

use crate::chunk::{ChunkId, RIFF_HEADER_SIZE, read_chunk_header, read_u24};
use crate::error::DemuxError;

/// Still-image flavor of a file or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
	/// VP8 key frame.
	Lossy,
	/// VP8L stream.
	Lossless,
}

/// Top-level facts about a parsed file.
#[derive(Debug, Clone, Copy)]
pub struct WebPFeatures {
	/// Canvas width in pixels.
	pub width: u32,
	/// Canvas height in pixels.
	pub height: u32,
	/// Transparency anywhere in the file.
	pub has_alpha: bool,
	/// The file is an animation.
	pub has_animation: bool,
	/// Format of the still image, `None` for animations.
	pub format: Option<ImageFormat>,
}

/// One parsed animation frame.
#[derive(Debug, Clone)]
pub struct FrameInfo {
	/// Canvas x offset.
	pub x: u32,
	/// Canvas y offset.
	pub y: u32,
	/// Frame width.
	pub width: u32,
	/// Frame height.
	pub height: u32,
	/// Duration in milliseconds.
	pub duration: u32,
	/// Dispose-to-background flag.
	pub dispose_to_background: bool,
	/// Blend-with-previous flag.
	pub blend: bool,
	/// Format of the frame's bitstream.
	pub format: ImageFormat,
	/// Byte range of the frame's image payload.
	pub image: Range<usize>,
	/// Byte range of the frame's alpha payload, if present.
	pub alpha: Option<Range<usize>>,
}

/// Parsed WebP container.
#[derive(Debug)]
pub struct Demuxer<'a> {
	data: &'a [u8],
	features: WebPFeatures,
	image: Option<(ImageFormat, Range<usize>)>,
	alpha: Option<Range<usize>>,
	iccp: Option<Range<usize>>,
	exif: Option<Range<usize>>,
	xmp: Option<Range<usize>>,
	frames: Vec<FrameInfo>,
	loop_count: u16,
	background_color: [u8; 4],
}

impl<'a> Demuxer<'a> {
	/// Parses a complete WebP file.
	pub fn new(data: &'a [u8]) -> Result<Self, DemuxError> {
		if data.len() < RIFF_HEADER_SIZE {
			return Err(DemuxError::NotEnoughData {
				needed: RIFF_HEADER_SIZE - data.len(),
			});
		}
		if &data[0..4] != b"RIFF" {
			return Err(DemuxError::BitstreamError("missing RIFF signature"));
		}
		if &data[8..12] != b"WEBP" {
			return Err(DemuxError::BitstreamError("missing WEBP signature"));
		}
		let riff_size = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
		let end = (8 + riff_size).min(data.len());
		if 8 + riff_size > data.len() {
			return Err(DemuxError::NotEnoughData {
				needed: 8 + riff_size - data.len(),
			});
		}

		let mut demuxer = Self {
			data,
			features: WebPFeatures {
				width: 0,
				height: 0,
				has_alpha: false,
				has_animation: false,
				format: None,
			},
			image: None,
			alpha: None,
			iccp: None,
			exif: None,
			xmp: None,
			frames: Vec::new(),
			loop_count: 0,
			background_color: [0; 4],
		};
		demuxer.parse_chunks(RIFF_HEADER_SIZE, end)?;
		Ok(demuxer)
	}

	fn parse_chunks(&mut self, start: usize, end: usize) -> Result<(), DemuxError> {
		let (first, first_size, _) = read_chunk_header(self.data, start)?;
		match first {
			ChunkId::VP8 | ChunkId::VP8L => {
				// Simple layout: exactly one image chunk.
				let payload = self.payload_range(start, first_size, end)?;
				self.record_still_image(first, payload)?;
				Ok(())
			}
			ChunkId::VP8X => self.parse_extended(start, end),
			_ => Err(DemuxError::BitstreamError("unexpected leading chunk")),
		}
	}

	fn payload_range(
		&self,
		chunk_start: usize,
		size: u32,
		end: usize,
	) -> Result<Range<usize>, DemuxError> {
		let data_start = chunk_start + 8;
		let data_end = data_start + size as usize;
		if data_end > end {
			return Err(DemuxError::NotEnoughData {
				needed: data_end - end,
			});
		}
		Ok(data_start..data_end)
	}

	fn record_still_image(
		&mut self,
		id: ChunkId,
		payload: Range<usize>,
	) -> Result<(), DemuxError> {
		let bytes = &self.data[payload.clone()];
		match id {
			ChunkId::VP8 => {
				let (w, h) = vp8::peek_dimensions(bytes)?;
				if self.features.width == 0 {
					self.features.width = w;
					self.features.height = h;
				}
				self.features.format = Some(ImageFormat::Lossy);
				self.image = Some((ImageFormat::Lossy, payload));
			}
			ChunkId::VP8L => {
				let (w, h, alpha) = vp8l::peek_header(bytes)?;
				if self.features.width == 0 {
					self.features.width = w;
					self.features.height = h;
				}
				self.features.has_alpha |= alpha;
				self.features.format = Some(ImageFormat::Lossless);
				self.image = Some((ImageFormat::Lossless, payload));
			}
			_ => unreachable!(),
		}
		Ok(())
	}

	fn parse_extended(&mut self, start: usize, end: usize) -> Result<(), DemuxError> {
		let (_, size, padded) = read_chunk_header(self.data, start)?;
		if size < 10 {
			return Err(DemuxError::BitstreamError("short VP8X chunk"));
		}
		let payload = self.payload_range(start, size, end)?;
		let p = payload.start;
		let flags = self.data[p];
		self.features.has_alpha = flags & 0x10 != 0;
		self.features.has_animation = flags & 0x02 != 0;
		self.features.width = read_u24(self.data, p + 4)? + 1;
		self.features.height = read_u24(self.data, p + 7)? + 1;

		let mut pos = start + 8 + padded as usize;
		let mut seen_anim = false;
		let mut seen_image_data = false;

		while pos + 8 <= end {
			let (id, size, padded) = read_chunk_header(self.data, pos)?;
			let payload = self.payload_range(pos, size, end)?;
			match id {
				ChunkId::ICCP => {
					if seen_image_data {
						return Err(DemuxError::BitstreamError(
							"color profile after image data",
						));
					}
					self.iccp = Some(payload);
				}
				ChunkId::ANIM => {
					if size < 6 {
						return Err(DemuxError::BitstreamError("short ANIM chunk"));
					}
					self.background_color =
						self.data[payload.start..payload.start + 4].try_into().unwrap();
					self.loop_count = u16::from_le_bytes(
						self.data[payload.start + 4..payload.start + 6].try_into().unwrap(),
					);
					seen_anim = true;
				}
				ChunkId::ANMF => {
					if !seen_anim {
						return Err(DemuxError::BitstreamError("frame before ANIM chunk"));
					}
					let frame = self.parse_frame(payload)?;
					self.frames.push(frame);
					seen_image_data = true;
				}
				ChunkId::ALPH => {
					if seen_anim {
						return Err(DemuxError::BitstreamError(
							"loose alpha inside an animation",
						));
					}
					self.alpha = Some(payload);
				}
				ChunkId::VP8 | ChunkId::VP8L => {
					if seen_anim {
						return Err(DemuxError::BitstreamError(
							"bare image chunk inside an animation",
						));
					}
					if self.image.is_some() {
						return Err(DemuxError::BitstreamError("multiple image chunks"));
					}
					self.record_still_image(id, payload)?;
					seen_image_data = true;
				}
				ChunkId::EXIF => self.exif = Some(payload),
				ChunkId::XMP => self.xmp = Some(payload),
				ChunkId::VP8X => {
					return Err(DemuxError::BitstreamError("duplicate VP8X chunk"));
				}
				ChunkId::Unknown(fourcc) => {
					warn!("skipping unknown chunk {:?}", fourcc);
				}
			}
			pos += 8 + padded as usize;
		}

		if self.features.has_animation {
			if !seen_anim || self.frames.is_empty() {
				return Err(DemuxError::BitstreamError("animation chunks missing"));
			}
		} else if self.image.is_none() {
			return Err(DemuxError::BitstreamError("image chunk missing"));
		}
		Ok(())
	}

	fn parse_frame(&self, payload: Range<usize>) -> Result<FrameInfo, DemuxError> {
		if payload.len() < 16 {
			return Err(DemuxError::BitstreamError("short ANMF chunk"));
		}
		let p = payload.start;
		let x = read_u24(self.data, p)? * 2;
		let y = read_u24(self.data, p + 3)? * 2;
		let width = read_u24(self.data, p + 6)? + 1;
		let height = read_u24(self.data, p + 9)? + 1;
		let duration = read_u24(self.data, p + 12)?;
		let flags = self.data[p + 15];
		if x + width > self.features.width || y + height > self.features.height {
			return Err(DemuxError::BitstreamError("frame outside canvas"));
		}

		// Image chunks nested inside the frame payload.
		let mut pos = p + 16;
		let mut alpha = None;
		let mut image = None;
		while pos + 8 <= payload.end {
			let (id, size, padded) = read_chunk_header(self.data, pos)?;
			let sub = self.payload_range(pos, size, payload.end)?;
			match id {
				ChunkId::ALPH => alpha = Some(sub),
				ChunkId::VP8 => {
					image = Some((ImageFormat::Lossy, sub));
					break;
				}
				ChunkId::VP8L => {
					image = Some((ImageFormat::Lossless, sub));
					break;
				}
				_ => return Err(DemuxError::BitstreamError("unexpected chunk in frame")),
			}
			pos += 8 + padded as usize;
		}
		let (format, image) =
			image.ok_or(DemuxError::BitstreamError("frame without image data"))?;

		Ok(FrameInfo {
			x,
			y,
			width,
			height,
			duration,
			dispose_to_background: flags & 0x01 != 0,
			blend: flags & 0x02 != 0,
			format,
			image,
			alpha,
		})
	}

	/// Top-level file facts.
	pub fn features(&self) -> &WebPFeatures {
		&self.features
	}

	/// Number of animation frames (zero for still images).
	pub fn num_frames(&self) -> usize {
		self.frames.len()
	}

	/// Animation loop count (0 = forever).
	pub fn loop_count(&self) -> u16 {
		self.loop_count
	}

	/// Animation background color bytes as stored.
	pub fn background_color(&self) -> [u8; 4] {
		self.background_color
	}

	/// The i-th animation frame.
	pub fn frame(&self, index: usize) -> Option<&FrameInfo> {
		self.frames.get(index)
	}

	/// Payload bytes of a parsed range.
	pub fn bytes(&self, range: &Range<usize>) -> &'a [u8] {
		&self.data[range.clone()]
	}

	/// The still image payload, if this is not an animation.
	pub fn image(&self) -> Option<(ImageFormat, &'a [u8])> {
		self.image
			.as_ref()
			.map(|(format, range)| (*format, &self.data[range.clone()]))
	}

	/// The still image's alpha payload.
	pub fn alpha(&self) -> Option<&'a [u8]> {
		self.alpha.as_ref().map(|r| &self.data[r.clone()])
	}

	/// The ICC profile payload.
	pub fn icc_profile(&self) -> Option<&'a [u8]> {
		self.iccp.as_ref().map(|r| &self.data[r.clone()])
	}

	/// The EXIF payload.
	pub fn exif(&self) -> Option<&'a [u8]> {
		self.exif.as_ref().map(|r| &self.data[r.clone()])
	}

	/// The XMP payload.
	pub fn xmp(&self) -> Option<&'a [u8]> {
		self.xmp.as_ref().map(|r| &self.data[r.clone()])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mux::{ImageData, WebPMux};
	use webp_codec::EncoderConfig;
	use webp_codec::picture::ArgbBuffer;

	fn small_lossless() -> Vec<u8> {
		let buf = ArgbBuffer::from_pixels(vec![0xffff_0000; 4], 2, 2);
		webp_codec::vp8l::encode(&buf.view_full(), &EncoderConfig::lossless(2)).unwrap()
	}

	#[test]
	fn test_simple_file_round_trip() {
		let mut mux = WebPMux::new(2, 2);
		mux.set_image(ImageData::Lossless(small_lossless()));
		let file = mux.assemble().unwrap();

		let demuxer = Demuxer::new(&file).unwrap();
		let features = demuxer.features();
		assert_eq!((features.width, features.height), (2, 2));
		assert_eq!(features.format, Some(ImageFormat::Lossless));
		assert!(!features.has_animation);
		assert_eq!(demuxer.num_frames(), 0);
	}

	#[test]
	fn test_truncated_file() {
		let mut mux = WebPMux::new(2, 2);
		mux.set_image(ImageData::Lossless(small_lossless()));
		let file = mux.assemble().unwrap();

		// The first 16 bytes of a valid file: enough for the prologue,
		// not for the image chunk.
		let err = Demuxer::new(&file[..16]).unwrap_err();
		assert!(matches!(err, DemuxError::NotEnoughData { .. }));

		let err = Demuxer::new(&file[..4]).unwrap_err();
		assert!(matches!(err, DemuxError::NotEnoughData { .. }));
	}

	#[test]
	fn test_bad_signature() {
		let mut mux = WebPMux::new(2, 2);
		mux.set_image(ImageData::Lossless(small_lossless()));
		let mut file = mux.assemble().unwrap();
		file[0] = b'X';
		assert!(matches!(
			Demuxer::new(&file),
			Err(DemuxError::BitstreamError(_))
		));
	}

	#[test]
	fn test_metadata_round_trip() {
		let mut mux = WebPMux::new(2, 2);
		mux.set_image(ImageData::Lossless(small_lossless()));
		mux.set_icc_profile(vec![1, 2, 3, 4]);
		mux.set_exif(vec![5, 6]);
		mux.set_xmp(vec![7]);
		let file = mux.assemble().unwrap();

		let demuxer = Demuxer::new(&file).unwrap();
		assert_eq!(demuxer.icc_profile(), Some(&[1, 2, 3, 4][..]));
		assert_eq!(demuxer.exif(), Some(&[5, 6][..]));
		assert_eq!(demuxer.xmp(), Some(&[7][..]));
	}
}
