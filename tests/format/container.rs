//! Container-level scenarios.

use webp_rs::prelude::*;

fn sample_file() -> Vec<u8> {
	let picture = Picture::from_rgb(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12], 2, 2).unwrap();
	webp_rs::encode(&picture, &EncoderConfig::lossless(3)).unwrap()
}

#[test]
fn truncated_prefix_reports_not_enough_data() {
	let file = sample_file();
	for len in [0, 4, 11, 16] {
		let err = Demuxer::new(&file[..len.min(file.len())]).unwrap_err();
		assert!(
			matches!(err, DemuxError::NotEnoughData { .. }),
			"prefix {len}: {err:?}"
		);
	}
}

#[test]
fn riff_size_matches_file() {
	let file = sample_file();
	let declared = u32::from_le_bytes(file[4..8].try_into().unwrap()) as usize;
	assert_eq!(declared + 8, file.len());
}

#[test]
fn features_without_full_decode() {
	let file = sample_file();
	let demuxer = Demuxer::new(&file).unwrap();
	let features = demuxer.features();
	assert_eq!((features.width, features.height), (2, 2));
	assert_eq!(features.format, Some(ImageFormat::Lossless));
	assert!(!features.has_alpha);
	assert!(!features.has_animation);
}

#[test]
fn metadata_survives_the_container() {
	let picture = Picture::from_rgb(&[9; 12], 2, 2).unwrap();
	let stream = webp_rs::webp_codec::vp8l::encode(
		&picture.argb().unwrap().view_full(),
		&EncoderConfig::lossless(2),
	)
	.unwrap();

	let mut mux = WebPMux::new(2, 2);
	mux.set_image(ImageData::Lossless(stream));
	mux.set_icc_profile(b"fake icc payload".to_vec());
	mux.set_exif(vec![0x4d, 0x4d, 0, 42]);
	mux.set_xmp(b"<x/>".to_vec());
	let file = mux.assemble().unwrap();

	let demuxer = Demuxer::new(&file).unwrap();
	assert_eq!(demuxer.icc_profile(), Some(&b"fake icc payload"[..]));
	assert_eq!(demuxer.exif(), Some(&[0x4d, 0x4d, 0, 42][..]));
	assert_eq!(demuxer.xmp(), Some(&b"<x/>"[..]));
	// The image still decodes with metadata present.
	assert!(webp_rs::decode(&file).is_ok());
}

#[test]
fn corrupt_signature_is_rejected() {
	let mut file = sample_file();
	file[8] = b'X'; // WEBP -> XEBP
	assert!(matches!(
		Demuxer::new(&file),
		Err(DemuxError::BitstreamError(_))
	));
}
