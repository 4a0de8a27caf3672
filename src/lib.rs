//! `webp-rs` is a pure-Rust implementation of the WebP image format:
//! the VP8 lossy codec, the VP8L lossless codec, the alpha-plane codec
//! and the RIFF container with animation and metadata support.
//!
//! The implementation lives in two member crates re-exported here:
//! [`webp_codec`] for the bitstreams and [`webp_mux`] for the container.
//!
//! # Examples
//!
//! ```
//! use webp_rs::prelude::*;
//!
//! let picture = Picture::from_rgb(&[200, 100, 50], 1, 1).unwrap();
//! let file = webp_rs::encode(&picture, &EncoderConfig::lossless(4)).unwrap();
//! let back = webp_rs::decode(&file).unwrap();
//! assert_eq!(back.width(), 1);
//! ```

pub use webp_codec;
pub use webp_mux;

pub use webp_mux::{decode, decode_with_options, encode, encode_into, encode_with_progress};

/// `use webp_rs::prelude::*;` to import the commonly used items.
pub mod prelude {
	#[doc(inline)]
	pub use webp_codec::prelude::*;

	#[doc(inline)]
	pub use webp_mux::{
		AnimationEncoder, AnimationPlayer, Demuxer, DemuxError, Frame, ImageData, ImageFormat,
		MuxError, WebPFeatures, WebPMux,
	};
}
