//! Animation assembly and playback scenarios.

use webp_rs::prelude::*;

fn solid(color: u32, side: usize) -> ArgbBuffer {
	ArgbBuffer::from_pixels(vec![color; side * side], side, side)
}

#[test]
fn red_blue_pair_with_tight_keyframe_window() {
	let params = AnimationParams {
		kmin: 0,
		kmax: 1,
		loop_count: 0,
		..AnimationParams::default()
	};
	let mut encoder = AnimationEncoder::new(4, 4, EncoderConfig::lossless(4), params).unwrap();
	encoder.add_frame(&solid(0xffff_0000, 4), 100).unwrap();
	encoder.add_frame(&solid(0xff00_00ff, 4), 100).unwrap();
	let file = encoder.finalize().unwrap();

	// Layout: VP8X, then ANIM, then one ANMF per frame.
	assert_eq!(&file[12..16], b"VP8X");
	let demuxer = Demuxer::new(&file).unwrap();
	assert_eq!(demuxer.num_frames(), 2);
	assert_eq!(demuxer.loop_count(), 0);
	for i in 0..2 {
		let frame = demuxer.frame(i).unwrap();
		assert_eq!((frame.width, frame.height), (4, 4));
		assert_eq!(frame.duration, 100);
		assert!(!frame.blend, "frame {i} must be a keyframe");
	}

	let mut player = AnimationPlayer::new(&demuxer).unwrap();
	player.next_frame().unwrap().unwrap();
	let (_, canvas) = player.next_frame().unwrap().unwrap();
	assert!(canvas.pixels().iter().all(|&px| px == 0xff00_00ff));
}

#[test]
fn keyframe_distances_stay_inside_window() {
	let kmin = 2;
	let kmax = 6;
	let params = AnimationParams {
		kmin,
		kmax,
		..AnimationParams::default()
	};
	let mut encoder = AnimationEncoder::new(8, 8, EncoderConfig::lossless(2), params).unwrap();
	for i in 0..24u32 {
		let mut canvas = solid(0xffff_ffff, 8);
		canvas.row_mut((i % 8) as usize)[(i % 8) as usize] = 0xff00_0000 | i;
		encoder.add_frame(&canvas, 33).unwrap();
	}
	let file = encoder.finalize().unwrap();
	let demuxer = Demuxer::new(&file).unwrap();

	let keys: Vec<usize> = (0..demuxer.num_frames())
		.filter(|&i| !demuxer.frame(i).unwrap().blend)
		.collect();
	assert_eq!(keys[0], 0);
	for pair in keys.windows(2) {
		let dist = (pair[1] - pair[0]) as u32;
		assert!(dist >= kmin, "keyframes {dist} apart, kmin {kmin}");
		assert!(dist <= kmax, "keyframes {dist} apart, kmax {kmax}");
	}
}

#[test]
fn lossy_animation_plays_back() {
	let params = AnimationParams {
		kmin: 1,
		kmax: 4,
		..AnimationParams::default()
	};
	let mut config = EncoderConfig::default();
	config.quality = 90.0;
	let mut encoder = AnimationEncoder::new(32, 32, config, params).unwrap();
	for step in 0..3u32 {
		let shade = 60 + step * 60;
		encoder
			.add_frame(&solid(0xff00_0000 | shade << 16 | shade << 8 | shade, 32), 50)
			.unwrap();
	}
	let file = encoder.finalize().unwrap();

	let demuxer = Demuxer::new(&file).unwrap();
	let mut player = AnimationPlayer::new(&demuxer).unwrap();
	let mut frames = 0;
	let mut last_avg = 0u32;
	while let Some((duration, canvas)) = player.next_frame().unwrap() {
		assert_eq!(duration, 50);
		let sum: u64 = canvas.pixels().iter().map(|&px| u64::from(px >> 16 & 0xff)).sum();
		last_avg = (sum / canvas.pixels().len() as u64) as u32;
		frames += 1;
	}
	assert_eq!(frames, 3);
	// The last frame is roughly the brightest shade.
	assert!(last_avg.abs_diff(180) <= 12, "avg {last_avg}");
}

#[test]
fn zero_duration_frames_count_toward_keyframe_distance() {
	let params = AnimationParams {
		kmin: 1,
		kmax: 3,
		..AnimationParams::default()
	};
	let mut encoder = AnimationEncoder::new(4, 4, EncoderConfig::lossless(2), params).unwrap();
	for i in 0..7u32 {
		encoder.add_frame(&solid(0xff00_0000 | i * 17, 4), 0).unwrap();
	}
	let file = encoder.finalize().unwrap();
	let demuxer = Demuxer::new(&file).unwrap();
	let keys: Vec<usize> = (0..demuxer.num_frames())
		.filter(|&i| !demuxer.frame(i).unwrap().blend)
		.collect();
	for pair in keys.windows(2) {
		assert!((pair[1] - pair[0]) as u32 <= 3);
	}
}
