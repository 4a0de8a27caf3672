//! Error types for the encoder and decoder.

use thiserror::Error;

/// Errors that can occur while encoding a picture.
#[derive(Debug, Error)]
pub enum EncodingError {
	/// Illegal parameter combination or out-of-range value, rejected before
	/// any work begins.
	#[error("Bad configuration: {0}")]
	BadConfiguration(String),

	/// Width or height is zero or exceeds the 14-bit limit of the bitstream.
	#[error("Bad dimension: {width}x{height} (each side must be in 1..={max})")]
	BadDimension {
		/// Requested width in pixels
		width: u32,
		/// Requested height in pixels
		height: u32,
		/// Largest encodable side length
		max: u32,
	},

	/// An internal buffer would exceed the allowed allocation budget.
	#[error("Out of memory: allocation of {requested} bytes refused")]
	OutOfMemory {
		/// Size of the refused allocation
		requested: usize,
	},

	/// The header/mode partition exceeds its 512 KiB budget. Reducing the
	/// segment count or raising `partition_limit` helps.
	#[error("Partition zero overflow: {size} bytes exceeds {limit}")]
	Partition0Overflow {
		/// Actual partition size
		size: usize,
		/// Hard limit in bytes
		limit: usize,
	},

	/// A token partition exceeds the 16 MiB chunk budget.
	#[error("Token partition overflow: {size} bytes exceeds {limit}")]
	PartitionOverflow {
		/// Actual partition size
		size: usize,
		/// Hard limit in bytes
		limit: usize,
	},

	/// The output writer callback reported failure.
	#[error("Write failed after {written} bytes")]
	BadWrite {
		/// Bytes successfully handed to the writer before the failure
		written: usize,
	},

	/// The assembled file would exceed the RIFF size field (4 GiB - 2).
	#[error("File too big: {size} bytes")]
	FileTooBig {
		/// Projected file size
		size: u64,
	},

	/// The progress hook asked for cancellation.
	#[error("Aborted by user")]
	UserAbort,
}

/// Errors that can occur while decoding a bitstream.
#[derive(Debug, Error)]
pub enum DecodingError {
	/// Malformed bits: a state the bitstream grammar does not allow.
	#[error("Corrupt bitstream: {0}")]
	BitstreamError(&'static str),

	/// The stream is valid but uses a feature this decoder cannot render.
	#[error("Unsupported feature: {0}")]
	UnsupportedFeature(&'static str),

	/// Input ended in the middle of a frame.
	#[error("Not enough data: needed {needed} more bytes")]
	NotEnoughData {
		/// Lower bound on the number of missing bytes
		needed: usize,
	},

	/// The declared dimensions are outside the valid range.
	#[error("Bad dimension: {width}x{height}")]
	BadDimension {
		/// Declared width
		width: u32,
		/// Declared height
		height: u32,
	},

	/// Decoding would allocate more than the configured memory limit.
	#[error("Memory limit exceeded: {requested} bytes requested, {limit} allowed")]
	MemoryLimitExceeded {
		/// Bytes the decoder wanted to allocate
		requested: usize,
		/// Configured ceiling
		limit: usize,
	},
}
