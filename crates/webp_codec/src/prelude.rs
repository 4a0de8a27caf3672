//! Prelude with the commonly used codec types.
//!
//! # Examples
//!
//! ```
//! use webp_codec::prelude::*;
//!
//! let config = EncoderConfig::with_preset(Preset::Photo, 80.0);
//! assert!(config.validate().is_ok());
//! ```

#[doc(inline)]
pub use crate::config::{
	AlphaFilter, AnimationParams, DecoderOptions, EncoderConfig, FilterType, Preset,
};

#[doc(inline)]
pub use crate::error::{DecodingError, EncodingError};

#[doc(inline)]
pub use crate::picture::{ArgbBuffer, ArgbView, Picture, PixelData, Plane, Writer, YuvaPlanes};

#[doc(inline)]
pub use crate::vp8;

#[doc(inline)]
pub use crate::vp8l;
