//! Fixed tables of the lossy bitstream: scan order, coefficient bands,
//! quantizer lookups, mode trees and their baseline probabilities.

/// Zigzag order mapping coefficient position to raster index in a 4x4
/// block.
pub const ZIGZAG: [usize; 16] = [0, 1, 4, 8, 5, 2, 3, 6, 9, 12, 13, 10, 7, 11, 14, 15];

/// Probability band of each coefficient position.
pub const COEFF_BANDS: [usize; 16] = [0, 1, 2, 3, 6, 4, 5, 6, 6, 6, 6, 6, 6, 6, 6, 7];

/// Number of coefficient block types: luma-after-Y2, Y2, chroma, luma4.
pub const NUM_TYPES: usize = 4;
/// Number of probability bands.
pub const NUM_BANDS: usize = 8;
/// Number of left/top non-zero contexts.
pub const NUM_CTX: usize = 3;
/// Probabilities per (type, band, context) node.
pub const NUM_PROBAS: usize = 11;

/// DC quantizer steps indexed by the 7-bit quantizer index.
pub const DC_TABLE: [u16; 128] = [
	4, 5, 6, 7, 8, 9, 10, 10, 11, 12, 13, 14, 15, 16, 17, 17, 18, 19, 20, 20, 21, 21, 22, 22,
	23, 23, 24, 25, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 37, 38, 39, 40, 41, 42,
	43, 44, 45, 46, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, 64,
	65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75, 76, 76, 77, 78, 79, 80, 81, 82, 83, 84, 85, 86,
	87, 88, 89, 91, 93, 95, 96, 98, 100, 101, 102, 104, 106, 108, 110, 112, 114, 116, 118, 122,
	124, 126, 128, 130, 132, 134, 136, 138, 140, 143, 145, 148, 151, 154, 157,
];

/// AC quantizer steps indexed by the 7-bit quantizer index.
pub const AC_TABLE: [u16; 128] = [
	4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
	28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50,
	51, 52, 53, 54, 55, 56, 57, 58, 60, 62, 64, 66, 68, 70, 72, 74, 76, 78, 80, 82, 84, 86, 88,
	90, 92, 94, 96, 98, 100, 102, 104, 106, 108, 110, 112, 114, 116, 119, 122, 125, 128, 131,
	134, 137, 140, 143, 146, 149, 152, 155, 158, 161, 164, 167, 170, 173, 177, 181, 185, 189,
	193, 197, 201, 205, 209, 213, 217, 221, 225, 229, 234, 239, 245, 249, 254, 259, 264, 269,
	274, 279, 284,
];

/// Probabilities of the extra bits of value categories 3..=6.
pub const CAT3: [u8; 3] = [173, 148, 140];
/// Category 4 extra-bit probabilities.
pub const CAT4: [u8; 4] = [176, 155, 140, 135];
/// Category 5 extra-bit probabilities.
pub const CAT5: [u8; 5] = [180, 157, 141, 134, 130];
/// Category 6 extra-bit probabilities.
pub const CAT6: [u8; 11] = [254, 254, 243, 230, 196, 177, 153, 140, 133, 130, 129];
/// Category 1 extra-bit probability.
pub const CAT1: [u8; 1] = [159];
/// Category 2 extra-bit probabilities.
pub const CAT2: [u8; 2] = [165, 145];

// Intra luma 16x16 modes.
/// DC prediction.
pub const DC_PRED: i8 = 0;
/// Vertical prediction.
pub const V_PRED: i8 = 1;
/// Horizontal prediction.
pub const H_PRED: i8 = 2;
/// TrueMotion prediction.
pub const TM_PRED: i8 = 3;
/// Per-4x4-block prediction (mode grid follows).
pub const B_PRED: i8 = 4;

/// Number of 4x4 luma prediction modes.
pub const NUM_BMODES: usize = 10;

/// Key-frame luma mode tree.
pub const KF_YMODE_TREE: [i8; 8] = [-B_PRED, 2, 4, 6, -DC_PRED, -V_PRED, -H_PRED, -TM_PRED];
/// Key-frame luma mode probabilities.
pub const KF_YMODE_PROB: [u8; 4] = [145, 156, 163, 128];

/// Chroma mode tree.
pub const UV_MODE_TREE: [i8; 6] = [-DC_PRED, 2, -V_PRED, 4, -H_PRED, -TM_PRED];
/// Key-frame chroma mode probabilities.
pub const KF_UV_MODE_PROB: [u8; 3] = [142, 114, 183];

/// 4x4 luma mode tree (DC, TM, VE, HE, LD, RD, VR, VL, HD, HU).
pub const BMODE_TREE: [i8; 18] = [
	0, 2, // B_DC_PRED = 0
	-1, 4, // B_TM_PRED
	-2, 6, // B_VE_PRED
	8, 12, -3, 10, // B_HE_PRED
	-5, -6, // B_RD_PRED, B_VR_PRED
	-4, 14, // B_LD_PRED
	-7, 16, // B_VL_PRED
	-8, -9, // B_HD_PRED, B_HU_PRED
];

/// Segment-id tree (two bits, up to four segments).
pub const SEGMENT_TREE: [i8; 6] = [2, 4, -0, -1, -2, -3];

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_zigzag_is_permutation() {
		let mut seen = [false; 16];
		for &z in &ZIGZAG {
			assert!(!seen[z]);
			seen[z] = true;
		}
	}

	#[test]
	fn test_quant_tables_monotonic() {
		for w in DC_TABLE.windows(2) {
			assert!(w[0] <= w[1]);
		}
		for w in AC_TABLE.windows(2) {
			assert!(w[0] <= w[1]);
		}
		assert_eq!(DC_TABLE[127], 157);
		assert_eq!(AC_TABLE[127], 284);
	}
}
