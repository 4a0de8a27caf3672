//! Still-image WebP encoder CLI
//!
//! Converts PNG/JPEG input (anything the `image` crate reads) into a
//! WebP file using either the lossy or the lossless pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Lossy at quality 75
//! cargo run --example cwebp -- -q 75 input.png -o output.webp
//!
//! # Lossless, maximum effort
//! cargo run --example cwebp -- --lossless -m 6 input.png -o output.webp
//!
//! # Aim at a byte budget
//! cargo run --example cwebp -- --size 20000 input.png -o output.webp
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use webp_rs::prelude::*;

#[derive(Parser)]
#[command(name = "cwebp")]
#[command(about = "Encode an image file into WebP", long_about = None)]
struct Cli {
	/// Input image (PNG, JPEG, ...)
	#[arg(value_name = "INPUT")]
	input: PathBuf,

	/// Output WebP path
	#[arg(short, long, value_name = "OUTPUT")]
	output: PathBuf,

	/// Quality factor (0-100)
	#[arg(short, long, default_value_t = 75.0)]
	quality: f32,

	/// Compression method (0=fast .. 6=slowest)
	#[arg(short, long, default_value_t = 4)]
	method: u8,

	/// Use the lossless pipeline
	#[arg(long)]
	lossless: bool,

	/// Preserve RGB values under fully transparent pixels
	#[arg(long)]
	exact: bool,

	/// Target size in bytes (activates quality search)
	#[arg(long, default_value_t = 0)]
	size: u32,

	/// Target PSNR in dB (activates quality search)
	#[arg(long, default_value_t = 0.0)]
	psnr: f32,

	/// Number of quality segments (1-4)
	#[arg(long, default_value_t = 4)]
	segments: u8,

	/// Spatial noise shaping strength (0-100)
	#[arg(long, default_value_t = 50)]
	sns: u8,

	/// Deblocking filter strength (0-100)
	#[arg(short, long, default_value_t = 60)]
	filter: u8,

	/// Quality of the compressed alpha plane (0-100)
	#[arg(long, default_value_t = 100)]
	alpha_q: u8,

	/// Number of entropy passes (1-10)
	#[arg(long, default_value_t = 1)]
	pass: u8,

	/// Crop the input: x,y,width,height
	#[arg(long, value_delimiter = ',', num_args = 4)]
	crop: Option<Vec<u32>>,

	/// Resize the input: width,height
	#[arg(long, value_delimiter = ',', num_args = 2)]
	resize: Option<Vec<u32>>,
}

fn main() -> Result<()> {
	env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
	let cli = Cli::parse();

	let input = image::open(&cli.input)
		.with_context(|| format!("failed to read {}", cli.input.display()))?
		.to_rgba8();
	let (width, height) = input.dimensions();
	info!("input: {}x{} pixels", width, height);

	let mut picture = Picture::from_rgba(input.as_raw(), width, height)
		.map_err(|e| anyhow::anyhow!("{e}"))?;

	if let Some(crop) = &cli.crop {
		let [x, y, w, h] = [crop[0], crop[1], crop[2], crop[3]];
		let buf = picture.argb().context("expected packed pixels")?;
		let view = buf.view(x as usize, y as usize, w as usize, h as usize);
		let cropped = ArgbBuffer::from_pixels(view.to_pixels(), w as usize, h as usize);
		picture = Picture::from_argb(cropped).map_err(|e| anyhow::anyhow!("{e}"))?;
	}
	if let Some(resize) = &cli.resize {
		let buf = picture.argb().context("expected packed pixels")?;
		let scaled =
			webp_codec::rescale::rescale_argb(buf, resize[0] as usize, resize[1] as usize);
		picture = Picture::from_argb(scaled).map_err(|e| anyhow::anyhow!("{e}"))?;
	}

	let config = EncoderConfig {
		quality: cli.quality,
		method: cli.method,
		lossless: cli.lossless,
		exact: cli.exact,
		target_size: cli.size,
		target_psnr: cli.psnr,
		segments: cli.segments,
		sns_strength: cli.sns,
		filter_strength: cli.filter,
		alpha_quality: cli.alpha_q,
		pass: cli.pass,
		..EncoderConfig::default()
	};

	let file = webp_rs::encode(&picture, &config).map_err(|e| anyhow::anyhow!("{e}"))?;
	std::fs::write(&cli.output, &file)
		.with_context(|| format!("failed to write {}", cli.output.display()))?;
	info!("wrote {} bytes to {}", file.len(), cli.output.display());
	Ok(())
}
