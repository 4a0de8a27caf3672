//! Core WebP codecs: the VP8 lossy pipeline, the VP8L lossless pipeline
//! and the alpha-plane codec, together with the picture types and color
//! conversion they share.
//!
//! This crate handles raw bitstreams only; the RIFF container, animation
//! and metadata live in `webp_mux`.
//!
//! # Examples
//!
//! ```
//! use webp_codec::config::EncoderConfig;
//! use webp_codec::picture::Picture;
//! use webp_codec::vp8l;
//!
//! let picture = Picture::from_rgba(&[255, 0, 0, 255], 1, 1).unwrap();
//! let config = EncoderConfig::lossless(4);
//! let stream = vp8l::encode(&picture.argb().unwrap().view_full(), &config).unwrap();
//! let decoded = vp8l::decode(&stream).unwrap();
//! assert_eq!(decoded.pixels, picture.argb().unwrap().pixels());
//! ```

pub mod alpha;
pub mod config;
pub mod dsp;
pub mod error;
pub mod picture;
pub mod prelude;
pub mod rescale;
pub mod vp8;
pub mod vp8l;
pub mod yuv;

pub use config::{AnimationParams, DecoderOptions, EncoderConfig, Preset};
pub use error::{DecodingError, EncodingError};
pub use picture::{ArgbBuffer, Picture, PixelData, Plane, Writer, YuvaPlanes};
