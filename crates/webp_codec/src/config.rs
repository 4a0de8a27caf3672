//! Encoder, decoder and animation parameter structs.
//!
//! All knobs are validated up front: [`EncoderConfig::validate`] runs before
//! the first macroblock is touched and rejects illegal combinations with
//! [`EncodingError::BadConfiguration`], so the coding passes never have to
//! re-check ranges.

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Largest width or height the bitstream can express (14-bit field).
pub const MAX_DIMENSION: u32 = 16383;

/// Filter flavor used by the in-loop deblocking stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
	/// Two-tap filter on the outer edge only.
	Simple,
	/// Full filter with high-edge-variance handling.
	Normal,
}

/// Predictive filter applied to the alpha plane before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlphaFilter {
	/// Store the plane as-is.
	None,
	/// Predict each byte from its left neighbor.
	Horizontal,
	/// Predict each byte from the byte above.
	Vertical,
	/// Predict `left + top - top_left`.
	Gradient,
	/// Try all four and keep the one with the smallest estimated entropy.
	Best,
}

/// Tuning presets seeding a config for a class of input material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
	/// General-purpose default.
	Default,
	/// Digital picture, indoor shot.
	Picture,
	/// Outdoor photograph with natural lighting.
	Photo,
	/// Hand or line drawing with high-contrast details.
	Drawing,
	/// Small-sized colorful image.
	Icon,
	/// Text-like content.
	Text,
}

/// Parameters controlling one encode call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
	/// Quality factor, 0.0 (smallest) to 100.0 (best).
	pub quality: f32,
	/// Quality/speed trade-off, 0 (fast) to 6 (slower, smaller).
	pub method: u8,
	/// Use the lossless pipeline instead of VP8.
	pub lossless: bool,
	/// In lossless mode, preserve RGB values under fully transparent pixels.
	pub exact: bool,
	/// If non-zero, aim at this output size in bytes (activates the
	/// bisection over quality, bounded by `pass`).
	pub target_size: u32,
	/// If non-zero, aim at this minimal distortion instead of a size.
	pub target_psnr: f32,
	/// Number of quality segments, 1..=4.
	pub segments: u8,
	/// Spatial noise shaping strength, 0..=100.
	pub sns_strength: u8,
	/// Loop-filter strength, 0 (off) to 100.
	pub filter_strength: u8,
	/// Loop-filter sharpness, 0..=7.
	pub filter_sharpness: u8,
	/// Which deblocking filter to signal.
	pub filter_type: FilterType,
	/// Quality of the compressed alpha plane, 0..=100.
	pub alpha_quality: u8,
	/// Predictive filtering of the alpha plane.
	pub alpha_filter: AlphaFilter,
	/// Compress the alpha plane losslessly (raw bytes when false).
	pub alpha_compression: bool,
	/// Number of analysis/entropy passes, 1..=10.
	pub pass: u8,
	/// log2 of the number of token partitions, 0..=3.
	pub partitions: u8,
	/// Tolerance for partition #0 pressure, 0 (strict) to 100 (lenient).
	pub partition_limit: u8,
}

impl Default for EncoderConfig {
	fn default() -> Self {
		Self {
			quality: 75.0,
			method: 4,
			lossless: false,
			exact: false,
			target_size: 0,
			target_psnr: 0.0,
			segments: 4,
			sns_strength: 50,
			filter_strength: 60,
			filter_sharpness: 0,
			filter_type: FilterType::Normal,
			alpha_quality: 100,
			alpha_filter: AlphaFilter::Best,
			alpha_compression: true,
			pass: 1,
			partitions: 0,
			partition_limit: 0,
		}
	}
}

impl EncoderConfig {
	/// Builds a config from a preset and a quality factor.
	pub fn with_preset(preset: Preset, quality: f32) -> Self {
		let mut config = Self {
			quality,
			..Self::default()
		};
		match preset {
			Preset::Default => {}
			Preset::Picture => {
				config.sns_strength = 80;
				config.filter_sharpness = 4;
				config.filter_strength = 35;
			}
			Preset::Photo => {
				config.sns_strength = 80;
				config.filter_sharpness = 3;
				config.filter_strength = 30;
			}
			Preset::Drawing => {
				config.sns_strength = 25;
				config.filter_sharpness = 6;
				config.filter_strength = 10;
			}
			Preset::Icon => {
				config.sns_strength = 0;
				config.filter_strength = 0;
			}
			Preset::Text => {
				config.sns_strength = 0;
				config.filter_strength = 0;
				config.segments = 2;
			}
		}
		config
	}

	/// Shortcut for a lossless configuration at the given effort level.
	pub fn lossless(method: u8) -> Self {
		Self {
			lossless: true,
			method,
			..Self::default()
		}
	}

	/// Checks every field range. Called by the encoders on entry.
	pub fn validate(&self) -> Result<(), EncodingError> {
		fn reject(what: &str) -> Result<(), EncodingError> {
			Err(EncodingError::BadConfiguration(what.to_string()))
		}

		if !(0.0..=100.0).contains(&self.quality) {
			return reject("quality must be in 0..=100");
		}
		if self.method > 6 {
			return reject("method must be in 0..=6");
		}
		if !(1..=4).contains(&self.segments) {
			return reject("segments must be in 1..=4");
		}
		if self.sns_strength > 100 {
			return reject("sns_strength must be in 0..=100");
		}
		if self.filter_strength > 100 {
			return reject("filter_strength must be in 0..=100");
		}
		if self.filter_sharpness > 7 {
			return reject("filter_sharpness must be in 0..=7");
		}
		if self.alpha_quality > 100 {
			return reject("alpha_quality must be in 0..=100");
		}
		if !(1..=10).contains(&self.pass) {
			return reject("pass must be in 1..=10");
		}
		if self.partitions > 3 {
			return reject("partitions must be in 0..=3");
		}
		if self.partition_limit > 100 {
			return reject("partition_limit must be in 0..=100");
		}
		if self.target_psnr < 0.0 {
			return reject("target_psnr must be non-negative");
		}
		Ok(())
	}
}

/// Parameters for assembling an animation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationParams {
	/// Minimum number of frames between consecutive keyframes.
	pub kmin: u32,
	/// Maximum number of frames between consecutive keyframes.
	pub kmax: u32,
	/// Number of times to play the animation; 0 means forever.
	pub loop_count: u16,
	/// Canvas background color, bytes B, G, R, A as stored in the ANIM chunk.
	pub background_color: [u8; 4],
}

impl Default for AnimationParams {
	fn default() -> Self {
		Self {
			kmin: 3,
			kmax: 30,
			loop_count: 0,
			background_color: [0xff; 4],
		}
	}
}

impl AnimationParams {
	/// Checks the keyframe-interval invariant `kmin < kmax`.
	pub fn validate(&self) -> Result<(), EncodingError> {
		if self.kmin >= self.kmax {
			return Err(EncodingError::BadConfiguration(format!(
				"kmin ({}) must be smaller than kmax ({})",
				self.kmin, self.kmax
			)));
		}
		Ok(())
	}
}

/// Options honored by the decoders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderOptions {
	/// Skip the fancy chroma upsampler and use pointwise doubling.
	pub no_fancy_upsampling: bool,
	/// Skip the in-loop deblocking filter entirely.
	pub no_filter: bool,
	/// Run the in-loop filter on a worker thread.
	pub use_threads: bool,
	/// Upper bound on the total bytes the decoder may allocate.
	pub memory_limit: usize,
}

impl Default for DecoderOptions {
	fn default() -> Self {
		Self {
			no_fancy_upsampling: false,
			no_filter: false,
			use_threads: false,
			memory_limit: usize::MAX,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config_is_valid() {
		assert!(EncoderConfig::default().validate().is_ok());
	}

	#[test]
	fn test_presets_are_valid() {
		for preset in [
			Preset::Default,
			Preset::Picture,
			Preset::Photo,
			Preset::Drawing,
			Preset::Icon,
			Preset::Text,
		] {
			assert!(EncoderConfig::with_preset(preset, 75.0).validate().is_ok());
		}
	}

	#[test]
	fn test_out_of_range_rejected() {
		let mut config = EncoderConfig::default();
		config.quality = 101.0;
		assert!(matches!(
			config.validate(),
			Err(EncodingError::BadConfiguration(_))
		));

		let mut config = EncoderConfig::default();
		config.segments = 0;
		assert!(config.validate().is_err());

		let mut config = EncoderConfig::default();
		config.pass = 11;
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_animation_params_interval() {
		let params = AnimationParams {
			kmin: 5,
			kmax: 5,
			..AnimationParams::default()
		};
		assert!(params.validate().is_err());
		assert!(AnimationParams::default().validate().is_ok());
	}
}
