//! Container inspector
//!
//! Walks the RIFF chunk structure of a WebP file and prints what it
//! finds: features, chunk layout, animation frames.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example webpinfo -- file.webp
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use webp_rs::prelude::*;

#[derive(Parser)]
#[command(name = "webpinfo")]
#[command(about = "Print the chunk structure of a WebP file", long_about = None)]
struct Cli {
	/// Input WebP file
	#[arg(value_name = "INPUT")]
	input: PathBuf,
}

fn main() -> Result<()> {
	env_logger::init_from_env(env_logger::Env::default().default_filter_or("warn"));
	let cli = Cli::parse();
	let data = std::fs::read(&cli.input)
		.with_context(|| format!("failed to read {}", cli.input.display()))?;

	let demuxer = Demuxer::new(&data).map_err(|e| anyhow::anyhow!("{e}"))?;
	let features = demuxer.features();
	println!("File: {} ({} bytes)", cli.input.display(), data.len());
	println!("Canvas: {}x{}", features.width, features.height);
	println!(
		"Format: {}",
		match (features.has_animation, features.format) {
			(true, _) => "animation",
			(false, Some(ImageFormat::Lossy)) => "lossy (VP8)",
			(false, Some(ImageFormat::Lossless)) => "lossless (VP8L)",
			(false, None) => "unknown",
		}
	);
	println!("Alpha: {}", if features.has_alpha { "yes" } else { "no" });
	if let Some(iccp) = demuxer.icc_profile() {
		println!("ICC profile: {} bytes", iccp.len());
	}
	if let Some(exif) = demuxer.exif() {
		println!("EXIF: {} bytes", exif.len());
	}
	if let Some(xmp) = demuxer.xmp() {
		println!("XMP: {} bytes", xmp.len());
	}

	if features.has_animation {
		println!(
			"Loop count: {}",
			match demuxer.loop_count() {
				0 => "forever".to_string(),
				n => n.to_string(),
			}
		);
		println!("Frames: {}", demuxer.num_frames());
		for i in 0..demuxer.num_frames() {
			let f = demuxer.frame(i).unwrap();
			println!(
				"  #{i}: {}x{} at ({}, {}), {} ms, {}, {}{}",
				f.width,
				f.height,
				f.x,
				f.y,
				f.duration,
				if f.blend { "blend" } else { "overwrite" },
				if f.dispose_to_background {
					"dispose "
				} else {
					""
				},
				match f.format {
					ImageFormat::Lossy => "VP8",
					ImageFormat::Lossless => "VP8L",
				}
			);
		}
	}
	Ok(())
}
