//! Error types of the container layer.

use thiserror::Error;
use webp_codec::{DecodingError, EncodingError};

/// Errors that can occur while assembling a WebP file.
#[derive(Debug, Error)]
pub enum MuxError {
	/// Illegal chunk combination or out-of-range field.
	#[error("Bad mux configuration: {0}")]
	BadConfiguration(String),

	/// The assembled file would exceed the RIFF size field.
	#[error("File too big: {size} bytes")]
	FileTooBig {
		/// Projected file size.
		size: u64,
	},

	/// A codec error while producing an embedded bitstream.
	#[error(transparent)]
	Encoding(#[from] EncodingError),

	/// The output writer callback reported failure.
	#[error("Write failed after {written} bytes")]
	BadWrite {
		/// Bytes successfully delivered before the failure.
		written: usize,
	},
}

/// Errors that can occur while parsing a WebP file.
#[derive(Debug, Error)]
pub enum DemuxError {
	/// Input ended before the structure was complete.
	#[error("Not enough data: needed {needed} more bytes")]
	NotEnoughData {
		/// Lower bound on the missing byte count.
		needed: usize,
	},

	/// A malformed chunk structure.
	#[error("Corrupt container: {0}")]
	BitstreamError(&'static str),

	/// Valid but unsupported container feature.
	#[error("Unsupported feature: {0}")]
	UnsupportedFeature(&'static str),

	/// A codec error inside an embedded bitstream.
	#[error(transparent)]
	Decoding(#[from] DecodingError),

	/// An I/O error from the underlying reader.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}
