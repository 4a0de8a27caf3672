//! Uncompressed image storage.
//!
//! A [`Picture`] holds exactly one of two representations:
//!
//! - **YUVA planes**: a full-resolution luma plane, two half-resolution
//!   chroma planes and an optional full-resolution alpha plane, each with
//!   its own stride;
//! - **ARGB buffer**: packed 32-bit pixels, alpha in the top byte.
//!
//! The two forms never alias each other; converting between them goes
//! through the explicit routines in [`crate::yuv`]. Cropping is expressed
//! with the non-owning [`ArgbView`] so the animation encoder can hand
//! sub-rectangles to the codecs without copying the canvas.

use crate::config::MAX_DIMENSION;
use crate::error::EncodingError;

/// A single 8-bit plane addressed as `data[y * stride + x]`.
#[derive(Debug, Clone)]
pub struct Plane {
	width: usize,
	height: usize,
	stride: usize,
	data: Vec<u8>,
}

impl Plane {
	/// Allocates a zeroed plane with `stride == width`.
	pub fn new(width: usize, height: usize) -> Self {
		Self {
			width,
			height,
			stride: width,
			data: vec![0; width * height],
		}
	}

	/// Plane width in samples.
	pub fn width(&self) -> usize {
		self.width
	}

	/// Plane height in samples.
	pub fn height(&self) -> usize {
		self.height
	}

	/// Distance in bytes between the starts of two consecutive rows.
	pub fn stride(&self) -> usize {
		self.stride
	}

	/// Returns row `y`, bounds-checked once per row.
	pub fn row(&self, y: usize) -> &[u8] {
		let start = y * self.stride;
		&self.data[start..start + self.width]
	}

	/// Mutable access to row `y`.
	pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
		let start = y * self.stride;
		&mut self.data[start..start + self.width]
	}

	/// Sample at `(x, y)`.
	pub fn at(&self, x: usize, y: usize) -> u8 {
		self.data[y * self.stride + x]
	}

	/// Raw backing storage.
	pub fn data(&self) -> &[u8] {
		&self.data
	}

	/// Mutable raw backing storage.
	pub fn data_mut(&mut self) -> &mut [u8] {
		&mut self.data
	}

	/// Fills the whole plane with `value`.
	pub fn fill(&mut self, value: u8) {
		self.data.fill(value);
	}
}

/// Luma/chroma/alpha plane set in 4:2:0 subsampling.
#[derive(Debug, Clone)]
pub struct YuvaPlanes {
	/// Full-resolution luma.
	pub y: Plane,
	/// Half-resolution chroma U.
	pub u: Plane,
	/// Half-resolution chroma V.
	pub v: Plane,
	/// Optional full-resolution alpha.
	pub a: Option<Plane>,
}

impl YuvaPlanes {
	/// Allocates planes for a `width x height` picture.
	pub fn new(width: usize, height: usize, with_alpha: bool) -> Self {
		let uv_w = width.div_ceil(2);
		let uv_h = height.div_ceil(2);
		Self {
			y: Plane::new(width, height),
			u: Plane::new(uv_w, uv_h),
			v: Plane::new(uv_w, uv_h),
			a: with_alpha.then(|| Plane::new(width, height)),
		}
	}
}

/// Packed-ARGB pixel buffer, one `u32` per pixel (`0xAARRGGBB`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgbBuffer {
	width: usize,
	height: usize,
	data: Vec<u32>,
}

impl ArgbBuffer {
	/// Allocates a zeroed (fully transparent black) buffer.
	pub fn new(width: usize, height: usize) -> Self {
		Self {
			width,
			height,
			data: vec![0; width * height],
		}
	}

	/// Wraps an existing pixel vector. Panics if the length disagrees with
	/// the dimensions.
	pub fn from_pixels(data: Vec<u32>, width: usize, height: usize) -> Self {
		assert_eq!(data.len(), width * height);
		Self {
			width,
			height,
			data,
		}
	}

	/// Buffer width in pixels.
	pub fn width(&self) -> usize {
		self.width
	}

	/// Buffer height in pixels.
	pub fn height(&self) -> usize {
		self.height
	}

	/// Row `y` as a pixel slice.
	pub fn row(&self, y: usize) -> &[u32] {
		&self.data[y * self.width..(y + 1) * self.width]
	}

	/// Mutable row `y`.
	pub fn row_mut(&mut self, y: usize) -> &mut [u32] {
		&mut self.data[y * self.width..(y + 1) * self.width]
	}

	/// All pixels, row-major.
	pub fn pixels(&self) -> &[u32] {
		&self.data
	}

	/// All pixels, mutable.
	pub fn pixels_mut(&mut self) -> &mut [u32] {
		&mut self.data
	}

	/// Non-owning view of the whole buffer.
	pub fn view_full(&self) -> ArgbView<'_> {
		ArgbView {
			buf: self,
			x: 0,
			y: 0,
			width: self.width,
			height: self.height,
		}
	}

	/// Non-owning view of a sub-rectangle. Panics when the rectangle leaves
	/// the buffer.
	pub fn view(&self, x: usize, y: usize, width: usize, height: usize) -> ArgbView<'_> {
		assert!(x + width <= self.width && y + height <= self.height);
		ArgbView {
			buf: self,
			x,
			y,
			width,
			height,
		}
	}

	/// True if any pixel has an alpha value other than 255.
	pub fn has_transparency(&self) -> bool {
		self.data.iter().any(|&px| px >> 24 != 0xff)
	}
}

/// Borrowed rectangular window into an [`ArgbBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct ArgbView<'a> {
	buf: &'a ArgbBuffer,
	x: usize,
	y: usize,
	width: usize,
	height: usize,
}

impl<'a> ArgbView<'a> {
	/// View width in pixels.
	pub fn width(&self) -> usize {
		self.width
	}

	/// View height in pixels.
	pub fn height(&self) -> usize {
		self.height
	}

	/// Row `y` of the view (already offset into the parent buffer).
	pub fn row(&self, y: usize) -> &'a [u32] {
		let row = self.buf.row(self.y + y);
		&row[self.x..self.x + self.width]
	}

	/// Copies the view into a contiguous pixel vector.
	pub fn to_pixels(&self) -> Vec<u32> {
		let mut out = Vec::with_capacity(self.width * self.height);
		for y in 0..self.height {
			out.extend_from_slice(self.row(y));
		}
		out
	}
}

/// Pixel storage of a [`Picture`]; the two forms are mutually exclusive.
#[derive(Debug, Clone)]
pub enum PixelData {
	/// Planar YUV 4:2:0 with optional alpha.
	Yuva(YuvaPlanes),
	/// Packed 32-bit ARGB.
	Argb(ArgbBuffer),
}

/// The uncompressed image consumed by the encoders and produced by the
/// decoders.
#[derive(Debug, Clone)]
pub struct Picture {
	width: u32,
	height: u32,
	data: PixelData,
}

impl Picture {
	/// Creates an ARGB picture from packed pixels.
	pub fn from_argb(buf: ArgbBuffer) -> Result<Self, EncodingError> {
		let (width, height) = (buf.width() as u32, buf.height() as u32);
		check_dimensions(width, height)?;
		Ok(Self {
			width,
			height,
			data: PixelData::Argb(buf),
		})
	}

	/// Creates an ARGB picture from interleaved RGBA bytes.
	pub fn from_rgba(rgba: &[u8], width: u32, height: u32) -> Result<Self, EncodingError> {
		check_dimensions(width, height)?;
		assert_eq!(rgba.len(), width as usize * height as usize * 4);
		let data = rgba
			.chunks_exact(4)
			.map(|px| {
				(u32::from(px[3]) << 24)
					| (u32::from(px[0]) << 16)
					| (u32::from(px[1]) << 8)
					| u32::from(px[2])
			})
			.collect();
		Ok(Self {
			width,
			height,
			data: PixelData::Argb(ArgbBuffer::from_pixels(
				data,
				width as usize,
				height as usize,
			)),
		})
	}

	/// Creates an opaque ARGB picture from interleaved RGB bytes.
	pub fn from_rgb(rgb: &[u8], width: u32, height: u32) -> Result<Self, EncodingError> {
		check_dimensions(width, height)?;
		assert_eq!(rgb.len(), width as usize * height as usize * 3);
		let data = rgb
			.chunks_exact(3)
			.map(|px| {
				0xff00_0000 | (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2])
			})
			.collect();
		Ok(Self {
			width,
			height,
			data: PixelData::Argb(ArgbBuffer::from_pixels(
				data,
				width as usize,
				height as usize,
			)),
		})
	}

	/// Creates a YUVA picture from pre-converted planes.
	pub fn from_yuva(planes: YuvaPlanes) -> Result<Self, EncodingError> {
		let (width, height) = (planes.y.width() as u32, planes.y.height() as u32);
		check_dimensions(width, height)?;
		Ok(Self {
			width,
			height,
			data: PixelData::Yuva(planes),
		})
	}

	/// Picture width in pixels.
	pub fn width(&self) -> u32 {
		self.width
	}

	/// Picture height in pixels.
	pub fn height(&self) -> u32 {
		self.height
	}

	/// The pixel storage.
	pub fn data(&self) -> &PixelData {
		&self.data
	}

	/// Mutable pixel storage.
	pub fn data_mut(&mut self) -> &mut PixelData {
		&mut self.data
	}

	/// The ARGB buffer, if the picture is in packed form.
	pub fn argb(&self) -> Option<&ArgbBuffer> {
		match &self.data {
			PixelData::Argb(buf) => Some(buf),
			PixelData::Yuva(_) => None,
		}
	}

	/// The plane set, if the picture is in planar form.
	pub fn yuva(&self) -> Option<&YuvaPlanes> {
		match &self.data {
			PixelData::Yuva(planes) => Some(planes),
			PixelData::Argb(_) => None,
		}
	}

	/// True when the storage carries an alpha channel with at least one
	/// non-opaque value.
	pub fn has_alpha(&self) -> bool {
		match &self.data {
			PixelData::Yuva(planes) => planes.a.is_some(),
			PixelData::Argb(buf) => buf.has_transparency(),
		}
	}

	/// Converts interleaved RGBA output rows from the packed form.
	pub fn write_rgba(&self, out: &mut [u8]) {
		let buf = self.argb().expect("write_rgba needs the ARGB form");
		for (dst, &px) in out.chunks_exact_mut(4).zip(buf.pixels()) {
			dst[0] = (px >> 16) as u8;
			dst[1] = (px >> 8) as u8;
			dst[2] = px as u8;
			dst[3] = (px >> 24) as u8;
		}
	}
}

fn check_dimensions(width: u32, height: u32) -> Result<(), EncodingError> {
	if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
		return Err(EncodingError::BadDimension {
			width,
			height,
			max: MAX_DIMENSION,
		});
	}
	Ok(())
}

/// Output sink for encoded bytes.
///
/// The encoders call [`Writer::write`] with chunks smaller than 64 KiB; a
/// `false` return is treated as a fatal write error and surfaces as
/// [`EncodingError::BadWrite`]. The callee must not retain the buffer.
pub trait Writer {
	/// Consumes one chunk of output. Returns `false` on failure.
	fn write(&mut self, data: &[u8]) -> bool;
}

impl Writer for Vec<u8> {
	fn write(&mut self, data: &[u8]) -> bool {
		self.extend_from_slice(data);
		true
	}
}

/// Progress callback invoked at macroblock-row boundaries with a 0..=100
/// percentage. Returning `false` aborts the encode with
/// [`EncodingError::UserAbort`].
pub type ProgressHook<'a> = dyn FnMut(u32) -> bool + 'a;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rgba_round_trip() {
		let rgba: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
		let pic = Picture::from_rgba(&rgba, 4, 4).unwrap();
		let mut out = vec![0; rgba.len()];
		pic.write_rgba(&mut out);
		assert_eq!(rgba, out);
	}

	#[test]
	fn test_dimension_limits() {
		assert!(matches!(
			Picture::from_rgb(&[0; 3], 1, 0).unwrap_err(),
			EncodingError::BadDimension { .. }
		));
		let too_wide = MAX_DIMENSION + 1;
		let data = vec![0u8; too_wide as usize * 3];
		assert!(Picture::from_rgb(&data, too_wide, 1).is_err());
	}

	#[test]
	fn test_view_rows() {
		let mut buf = ArgbBuffer::new(4, 4);
		for y in 0..4 {
			for x in 0..4 {
				buf.row_mut(y)[x] = (y * 4 + x) as u32;
			}
		}
		let view = buf.view(1, 1, 2, 2);
		assert_eq!(view.row(0), &[5, 6]);
		assert_eq!(view.row(1), &[9, 10]);
		assert_eq!(view.to_pixels(), vec![5, 6, 9, 10]);
	}

	#[test]
	fn test_chroma_plane_rounding() {
		let planes = YuvaPlanes::new(5, 3, false);
		assert_eq!(planes.u.width(), 3);
		assert_eq!(planes.u.height(), 2);
		assert_eq!(planes.y.stride(), 5);
	}
}
