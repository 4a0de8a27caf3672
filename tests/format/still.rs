//! Still-image scenarios.

use webp_rs::prelude::*;

fn psnr_rgb(a: &[u32], b: &[u32]) -> f64 {
	let mut sum = 0.0;
	for (&x, &y) in a.iter().zip(b) {
		for shift in [0, 8, 16] {
			let d = (x >> shift & 0xff) as f64 - (y >> shift & 0xff) as f64;
			sum += d * d;
		}
	}
	let mse = sum / (a.len() * 3) as f64;
	if mse == 0.0 { 99.0 } else { 10.0 * (255.0 * 255.0 / mse).log10() }
}

#[test]
fn single_red_pixel_lossless_is_thirty_bytes() {
	let picture = Picture::from_rgba(&[255, 0, 0, 255], 1, 1).unwrap();
	let file = webp_rs::encode(&picture, &EncoderConfig::lossless(4)).unwrap();
	assert_eq!(file.len(), 30, "file: {file:02x?}");
	assert_eq!(&file[..4], b"RIFF");
	assert_eq!(&file[12..16], b"VP8L");
	assert_eq!(file[16], 0x0a); // payload size
	assert_eq!(file[20], 0x2f); // lossless signature

	let decoded = webp_rs::decode(&file).unwrap();
	assert_eq!(decoded.argb().unwrap().pixels(), &[0xffff_0000]);
}

#[test]
fn tiny_gradient_lossy_meets_quality_and_size() {
	let gray = [0u8, 85, 170, 255];
	let rgba: Vec<u8> = gray.iter().flat_map(|&g| [g, g, g, 255]).collect();
	let picture = Picture::from_rgba(&rgba, 2, 2).unwrap();

	let mut config = EncoderConfig::default();
	config.quality = 75.0;
	let file = webp_rs::encode(&picture, &config).unwrap();
	assert!(file.len() <= 200, "{} bytes", file.len());

	let decoded = webp_rs::decode(&file).unwrap();
	let got = psnr_rgb(
		decoded.argb().unwrap().pixels(),
		picture.argb().unwrap().pixels(),
	);
	assert!(got >= 28.0, "psnr {got:.2}");
}

#[test]
fn four_color_palette_round_trip() {
	let colors = [0xffff_0000u32, 0xff00_ff00, 0xff00_00ff, 0xffff_ff00];
	let pixels: Vec<u32> = (0..256).map(|i| colors[(i + i / 16) % 4]).collect();
	let buf = ArgbBuffer::from_pixels(pixels.clone(), 16, 16);
	let picture = Picture::from_argb(buf).unwrap();

	let file = webp_rs::encode(&picture, &EncoderConfig::lossless(4)).unwrap();
	// Four colors bundle four pixels per stored byte, so the stream stays
	// far below one byte per pixel.
	assert!(file.len() < 200, "{} bytes", file.len());

	let decoded = webp_rs::decode(&file).unwrap();
	assert_eq!(decoded.argb().unwrap().pixels(), &pixels[..]);
}

#[test]
fn exact_mode_preserves_invisible_rgb() {
	let pixels = vec![0x00aa_bbcc, 0xffff_0000, 0x0011_2233, 0xff00_ff00];
	let picture =
		Picture::from_argb(ArgbBuffer::from_pixels(pixels.clone(), 2, 2)).unwrap();

	let mut config = EncoderConfig::lossless(5);
	config.exact = true;
	let file = webp_rs::encode(&picture, &config).unwrap();
	let decoded = webp_rs::decode(&file).unwrap();
	assert_eq!(decoded.argb().unwrap().pixels(), &pixels[..]);
}

#[test]
fn cleanup_mode_keeps_visible_pixels_and_alpha() {
	// Alpha checkerboard: transparent RGB values may be rewritten, but
	// visible pixels and the alpha channel itself survive bit-exactly.
	let pixels: Vec<u32> = (0..64)
		.map(|i| {
			if (i % 8 + i / 8) % 2 == 0 {
				0x0012_3456
			} else {
				0xff80_8080
			}
		})
		.collect();
	let picture =
		Picture::from_argb(ArgbBuffer::from_pixels(pixels.clone(), 8, 8)).unwrap();

	let config = EncoderConfig::lossless(4); // exact = false
	let file = webp_rs::encode(&picture, &config).unwrap();
	let decoded = webp_rs::decode(&file).unwrap();
	for (got, want) in decoded.argb().unwrap().pixels().iter().zip(&pixels) {
		assert_eq!(got >> 24, want >> 24);
		if want >> 24 != 0 {
			assert_eq!(got, want);
		}
	}
}

#[test]
fn lossy_quality_ladder_is_monotone_in_size() {
	let pixels: Vec<u32> = (0..48 * 48)
		.map(|i| {
			let x = (i % 48) as u32;
			let y = (i / 48) as u32;
			0xff00_0000 | ((x * 5) & 0xff) << 16 | ((x ^ y) & 0xff) << 8 | ((y * 3) & 0xff)
		})
		.collect();
	let picture = Picture::from_argb(ArgbBuffer::from_pixels(pixels, 48, 48)).unwrap();

	let mut sizes = Vec::new();
	for quality in [10.0, 50.0, 95.0] {
		let mut config = EncoderConfig::default();
		config.quality = quality;
		sizes.push(webp_rs::encode(&picture, &config).unwrap().len());
	}
	assert!(sizes[0] <= sizes[1] && sizes[1] <= sizes[2], "{sizes:?}");
}

#[test]
fn target_size_search_lands_under_budget() {
	let pixels: Vec<u32> = (0..64 * 64)
		.map(|i| {
			let mut v = i as u32;
			v = v.wrapping_mul(2_654_435_761);
			0xff00_0000 | (v & 0x00ff_ffff)
		})
		.collect();
	let picture = Picture::from_argb(ArgbBuffer::from_pixels(pixels, 64, 64)).unwrap();

	let mut config = EncoderConfig::default();
	config.target_size = 2500;
	config.pass = 6;
	let file = webp_rs::encode(&picture, &config).unwrap();
	assert!(file.len() <= 3000, "{} bytes", file.len());
}
