//! WebP decoder CLI
//!
//! Decodes a WebP file (still image or the first animation frame) and
//! writes it as PNG.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example dwebp -- input.webp -o output.png
//! cargo run --example dwebp -- input.webp -o output.png --no-filter --mt
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use webp_rs::prelude::*;

#[derive(Parser)]
#[command(name = "dwebp")]
#[command(about = "Decode a WebP file into PNG", long_about = None)]
struct Cli {
	/// Input WebP file
	#[arg(value_name = "INPUT")]
	input: PathBuf,

	/// Output PNG path
	#[arg(short, long, value_name = "OUTPUT")]
	output: PathBuf,

	/// Skip the in-loop deblocking filter
	#[arg(long)]
	no_filter: bool,

	/// Use pointwise chroma upsampling instead of the bilinear filter
	#[arg(long)]
	no_fancy: bool,

	/// Run the loop filter on a worker thread
	#[arg(long)]
	mt: bool,
}

fn main() -> Result<()> {
	env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
	let cli = Cli::parse();

	let data = std::fs::read(&cli.input)
		.with_context(|| format!("failed to read {}", cli.input.display()))?;

	let options = DecoderOptions {
		no_filter: cli.no_filter,
		no_fancy_upsampling: cli.no_fancy,
		use_threads: cli.mt,
		..DecoderOptions::default()
	};
	let picture =
		webp_rs::decode_with_options(&data, &options).map_err(|e| anyhow::anyhow!("{e}"))?;

	let mut rgba = vec![0u8; picture.width() as usize * picture.height() as usize * 4];
	picture.write_rgba(&mut rgba);
	let out = image::RgbaImage::from_raw(picture.width(), picture.height(), rgba)
		.context("building output image")?;
	out.save(&cli.output)
		.with_context(|| format!("failed to write {}", cli.output.display()))?;
	info!(
		"decoded {}x{} pixels to {}",
		picture.width(),
		picture.height(),
		cli.output.display()
	);
	Ok(())
}
