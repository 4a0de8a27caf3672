//! RIFF chunk primitives.
//!
//! Chunk format: `tag (4 ASCII bytes) | size (u32 LE) | payload | pad`,
//! with a single zero pad byte when the payload length is odd. The file
//! itself opens with `"RIFF" | file-size-minus-8 | "WEBP"`.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::DemuxError;

/// Size of a chunk tag plus its size field.
pub const CHUNK_HEADER_SIZE: usize = 8;
/// Size of the `RIFF....WEBP` file prologue.
pub const RIFF_HEADER_SIZE: usize = 12;
/// Largest payload that keeps `size + header + pad` inside a `u32`.
pub const MAX_CHUNK_PAYLOAD: u64 = u32::MAX as u64 - CHUNK_HEADER_SIZE as u64 - 1;

/// The chunk kinds a WebP file can carry.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkId {
	/// Lossy image data.
	VP8,
	/// Lossless image data.
	VP8L,
	/// Extended-format header.
	VP8X,
	/// Alpha plane of a lossy image.
	ALPH,
	/// Animation parameters.
	ANIM,
	/// One animation frame.
	ANMF,
	/// ICC color profile.
	ICCP,
	/// EXIF metadata.
	EXIF,
	/// XMP metadata.
	XMP,
	/// Anything this library does not interpret.
	Unknown([u8; 4]),
}

impl ChunkId {
	/// Maps a fourcc to a chunk kind.
	pub fn from_fourcc(fourcc: [u8; 4]) -> Self {
		match &fourcc {
			b"VP8 " => Self::VP8,
			b"VP8L" => Self::VP8L,
			b"VP8X" => Self::VP8X,
			b"ALPH" => Self::ALPH,
			b"ANIM" => Self::ANIM,
			b"ANMF" => Self::ANMF,
			b"ICCP" => Self::ICCP,
			b"EXIF" => Self::EXIF,
			b"XMP " => Self::XMP,
			_ => Self::Unknown(fourcc),
		}
	}

	/// The chunk's fourcc bytes.
	pub fn to_fourcc(self) -> [u8; 4] {
		match self {
			Self::VP8 => *b"VP8 ",
			Self::VP8L => *b"VP8L",
			Self::VP8X => *b"VP8X",
			Self::ALPH => *b"ALPH",
			Self::ANIM => *b"ANIM",
			Self::ANMF => *b"ANMF",
			Self::ICCP => *b"ICCP",
			Self::EXIF => *b"EXIF",
			Self::XMP => *b"XMP ",
			Self::Unknown(fourcc) => fourcc,
		}
	}
}

/// Appends one chunk (tag, LE size, payload, pad byte) to `out`.
pub fn write_chunk(out: &mut Vec<u8>, id: ChunkId, payload: &[u8]) {
	out.extend_from_slice(&id.to_fourcc());
	out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	out.extend_from_slice(payload);
	if payload.len() % 2 == 1 {
		out.push(0);
	}
}

/// Total on-disk size of a chunk with the given payload length.
pub fn chunk_size_on_disk(payload_len: usize) -> u64 {
	CHUNK_HEADER_SIZE as u64 + payload_len as u64 + (payload_len as u64 & 1)
}

/// Reads one chunk header from `data` at `pos`. Returns the id, the
/// payload size and the padded size.
pub fn read_chunk_header(data: &[u8], pos: usize) -> Result<(ChunkId, u32, u32), DemuxError> {
	if pos + CHUNK_HEADER_SIZE > data.len() {
		return Err(DemuxError::NotEnoughData {
			needed: pos + CHUNK_HEADER_SIZE - data.len(),
		});
	}
	let mut r = &data[pos..];
	let mut fourcc = [0u8; 4];
	std::io::Read::read_exact(&mut r, &mut fourcc)?;
	let size = r.read_u32::<LittleEndian>()?;
	Ok((
		ChunkId::from_fourcc(fourcc),
		size,
		size.saturating_add(size & 1),
	))
}

/// Reads a 24-bit little-endian field.
pub fn read_u24(data: &[u8], pos: usize) -> Result<u32, DemuxError> {
	if pos + 3 > data.len() {
		return Err(DemuxError::NotEnoughData {
			needed: pos + 3 - data.len(),
		});
	}
	Ok(u32::from(data[pos]) | u32::from(data[pos + 1]) << 8 | u32::from(data[pos + 2]) << 16)
}

/// Appends a 24-bit little-endian field.
pub fn write_u24(out: &mut Vec<u8>, value: u32) {
	debug_assert!(value < 1 << 24);
	out.extend_from_slice(&[value as u8, (value >> 8) as u8, (value >> 16) as u8]);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fourcc_round_trip() {
		for id in [
			ChunkId::VP8,
			ChunkId::VP8L,
			ChunkId::VP8X,
			ChunkId::ALPH,
			ChunkId::ANIM,
			ChunkId::ANMF,
			ChunkId::ICCP,
			ChunkId::EXIF,
			ChunkId::XMP,
		] {
			assert_eq!(ChunkId::from_fourcc(id.to_fourcc()), id);
		}
		assert!(matches!(
			ChunkId::from_fourcc(*b"ABCD"),
			ChunkId::Unknown(_)
		));
	}

	#[test]
	fn test_write_chunk_pads_odd_payload() {
		let mut out = Vec::new();
		write_chunk(&mut out, ChunkId::XMP, &[1, 2, 3]);
		assert_eq!(out.len(), 12);
		assert_eq!(&out[..4], b"XMP ");
		assert_eq!(out[4], 3);
		assert_eq!(out[11], 0);
		assert_eq!(chunk_size_on_disk(3), 12);
	}

	#[test]
	fn test_read_chunk_header() {
		let mut out = Vec::new();
		write_chunk(&mut out, ChunkId::VP8L, &[9; 5]);
		let (id, size, padded) = read_chunk_header(&out, 0).unwrap();
		assert_eq!(id, ChunkId::VP8L);
		assert_eq!(size, 5);
		assert_eq!(padded, 6);
	}

	#[test]
	fn test_u24_round_trip() {
		let mut out = Vec::new();
		write_u24(&mut out, 0x00ab_cdef);
		assert_eq!(read_u24(&out, 0).unwrap(), 0x00ab_cdef);
	}
}
