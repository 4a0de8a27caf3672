//! One-call encode and decode of still images.
//!
//! These glue the codecs to the container: pick the pipeline from the
//! config, compress the alpha plane on a worker thread while the main
//! thread runs the luma/chroma encoder, and wrap or unwrap the RIFF
//! layout.

use webp_codec::config::{DecoderOptions, EncoderConfig};
use webp_codec::picture::{ArgbBuffer, ArgbView, Picture, PixelData, ProgressHook, Writer};
use webp_codec::yuv::{argb_to_yuva, yuva_to_argb};
use webp_codec::{alpha, vp8, vp8l};

use crate::demux::{Demuxer, ImageFormat};
use crate::error::{DemuxError, MuxError};
use crate::mux::{ImageData, WebPMux};

/// Encodes a picture into a complete WebP file.
pub fn encode(picture: &Picture, config: &EncoderConfig) -> Result<Vec<u8>, MuxError> {
	encode_with_progress(picture, config, &mut None)
}

/// Encodes with an optional progress hook (invoked at macroblock-row
/// boundaries on the lossy path).
pub fn encode_with_progress(
	picture: &Picture,
	config: &EncoderConfig,
	progress: &mut Option<&mut ProgressHook<'_>>,
) -> Result<Vec<u8>, MuxError> {
	config.validate().map_err(MuxError::Encoding)?;
	let mut mux = WebPMux::new(picture.width(), picture.height());

	if config.lossless {
		let owned;
		let buf = match picture.data() {
			PixelData::Argb(buf) => buf,
			PixelData::Yuva(planes) => {
				owned = yuva_to_argb(planes, true);
				&owned
			}
		};
		let stream = vp8l::encode(&buf.view_full(), config)?;
		mux.set_image(ImageData::Lossless(stream));
		mux.set_has_alpha(buf.has_transparency());
	} else {
		let owned;
		let planes = match picture.data() {
			PixelData::Yuva(planes) => planes,
			PixelData::Argb(buf) => {
				owned = argb_to_yuva(buf, buf.has_transparency());
				&owned
			}
		};
		// The alpha plane compresses on a side thread while the main
		// thread runs the VP8 encoder; both borrow the planes read-only.
		let (stream, alpha_chunk) = std::thread::scope(|scope| {
			let alpha_worker = planes
				.a
				.as_ref()
				.map(|plane| scope.spawn(move || alpha::encode_alpha(plane, config)));
			let stream = vp8::encode(planes, config, progress);
			let alpha_chunk = alpha_worker
				.map(|handle| handle.join().expect("alpha worker panicked"));
			(stream, alpha_chunk)
		});
		mux.set_image(ImageData::Lossy(stream?));
		if let Some(chunk) = alpha_chunk {
			mux.set_alpha(chunk?);
			mux.set_has_alpha(true);
		}
	}

	mux.assemble()
}

/// Encodes and streams the file through a [`Writer`] in chunks smaller
/// than 64 KiB.
pub fn encode_into(
	writer: &mut dyn Writer,
	picture: &Picture,
	config: &EncoderConfig,
) -> Result<(), MuxError> {
	let file = encode(picture, config)?;
	let mut written = 0;
	for chunk in file.chunks(48 << 10) {
		if !writer.write(chunk) {
			return Err(MuxError::BadWrite { written });
		}
		written += chunk.len();
	}
	Ok(())
}

/// Decodes a WebP file into an ARGB picture. Animations yield their
/// first frame.
pub fn decode(data: &[u8]) -> Result<Picture, DemuxError> {
	decode_with_options(data, &DecoderOptions::default())
}

/// Decodes with explicit decoder options.
pub fn decode_with_options(data: &[u8], options: &DecoderOptions) -> Result<Picture, DemuxError> {
	let demuxer = Demuxer::new(data)?;
	let buf = if demuxer.features().has_animation {
		let mut player = crate::anim::AnimationPlayer::new(&demuxer)?;
		let frame = player
			.next_frame()?
			.ok_or(DemuxError::BitstreamError("animation without frames"))?;
		frame.1.clone()
	} else {
		let (format, payload) = demuxer
			.image()
			.ok_or(DemuxError::BitstreamError("image chunk missing"))?;
		decode_image_payload(format, payload, demuxer.alpha(), options)?
	};
	Picture::from_argb(buf).map_err(|_| DemuxError::BitstreamError("bad decoded dimensions"))
}

// Decodes one image payload (plus optional alpha chunk) to packed ARGB.
pub(crate) fn decode_image_payload(
	format: ImageFormat,
	payload: &[u8],
	alpha_payload: Option<&[u8]>,
	options: &DecoderOptions,
) -> Result<ArgbBuffer, DemuxError> {
	match format {
		ImageFormat::Lossless => {
			let image = vp8l::decode(payload)?;
			Ok(ArgbBuffer::from_pixels(
				image.pixels,
				image.width as usize,
				image.height as usize,
			))
		}
		ImageFormat::Lossy => {
			let mut planes = vp8::decode(payload, options)?;
			if let Some(alpha_payload) = alpha_payload {
				let width = planes.y.width();
				let height = planes.y.height();
				let a = alpha::decode_alpha(alpha_payload, width, height)?;
				let mut plane = webp_codec::Plane::new(width, height);
				for y in 0..height {
					plane.row_mut(y).copy_from_slice(&a[y * width..(y + 1) * width]);
				}
				planes.a = Some(plane);
			}
			Ok(yuva_to_argb(&planes, !options.no_fancy_upsampling))
		}
	}
}

// Encodes one rectangle of pixels for the animation path.
pub(crate) fn encode_view(
	view: &ArgbView<'_>,
	config: &EncoderConfig,
) -> Result<(ImageData, Option<Vec<u8>>), MuxError> {
	if config.lossless {
		Ok((ImageData::Lossless(vp8l::encode(view, config)?), None))
	} else {
		let buf = ArgbBuffer::from_pixels(view.to_pixels(), view.width(), view.height());
		let has_alpha = buf.has_transparency();
		let planes = argb_to_yuva(&buf, has_alpha);
		let stream = vp8::encode(&planes, config, &mut None)?;
		let alpha_chunk = match planes.a.as_ref() {
			Some(plane) => Some(alpha::encode_alpha(plane, config)?),
			None => None,
		};
		Ok((ImageData::Lossy(stream), alpha_chunk))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn gradient_picture(width: u32, height: u32) -> Picture {
		let pixels: Vec<u32> = (0..width * height)
			.map(|i| {
				let x = i % width;
				let y = i / width;
				0xff00_0000 | (x * 9 & 0xff) << 16 | ((x + y) * 5 & 0xff) << 8 | (y * 7 & 0xff)
			})
			.collect();
		Picture::from_argb(ArgbBuffer::from_pixels(
			pixels,
			width as usize,
			height as usize,
		))
		.unwrap()
	}

	#[test]
	fn test_lossless_file_round_trip() {
		let picture = gradient_picture(13, 9);
		let config = EncoderConfig::lossless(4);
		let file = encode(&picture, &config).unwrap();
		let decoded = decode(&file).unwrap();
		assert_eq!(
			decoded.argb().unwrap().pixels(),
			picture.argb().unwrap().pixels()
		);
	}

	#[test]
	fn test_lossy_file_round_trip() {
		let picture = gradient_picture(32, 24);
		let config = EncoderConfig::default();
		let file = encode(&picture, &config).unwrap();
		let decoded = decode(&file).unwrap();
		assert_eq!(decoded.width(), 32);
		assert_eq!(decoded.height(), 24);
	}

	#[test]
	fn test_lossy_with_alpha() {
		let mut pixels = vec![0xff80_4020u32; 16 * 16];
		for (i, px) in pixels.iter_mut().enumerate() {
			if i % 3 == 0 {
				*px &= 0x00ff_ffff; // fully transparent
			}
		}
		let picture =
			Picture::from_argb(ArgbBuffer::from_pixels(pixels, 16, 16)).unwrap();
		let file = encode(&picture, &EncoderConfig::default()).unwrap();

		let demuxer = Demuxer::new(&file).unwrap();
		assert!(demuxer.features().has_alpha);
		assert!(demuxer.alpha().is_some());

		let decoded = decode(&file).unwrap();
		// The alpha plane is compressed losslessly, so it survives
		// exactly.
		for (a, b) in decoded
			.argb()
			.unwrap()
			.pixels()
			.iter()
			.zip(picture.argb().unwrap().pixels())
		{
			assert_eq!(a >> 24, b >> 24);
		}
	}

	#[test]
	fn test_writer_failure_reported() {
		struct FailingWriter;
		impl Writer for FailingWriter {
			fn write(&mut self, _data: &[u8]) -> bool {
				false
			}
		}
		let picture = gradient_picture(4, 4);
		let err = encode_into(&mut FailingWriter, &picture, &EncoderConfig::lossless(1));
		assert!(matches!(err, Err(MuxError::BadWrite { written: 0 })));
	}
}
