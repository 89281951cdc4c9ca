use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use scoreboard_common::geometry::BoundingBox;
use std::fmt;

pub const TILE_WIDTH: u32 = 50;
pub const TILE_HEIGHT: u32 = 70;

/// A sampled segment counts as lit when its mean falls below this.
const LIT_CUTOFF: f64 = 200.0;
/// Binarization cutoff applied to the raw tile before inversion.
const INVERT_THRESHOLD: u8 = 127;
/// Pixels above this survive the ink autocrop.
const INK_THRESHOLD: u8 = 10;

/// Sample rectangles in the canonical tile, `(row0, row1, col0, col1)`,
/// in segment order a..g.
const SEGMENT_WINDOWS: [(u32, u32, u32, u32); 7] = [
    (0, 20, 20, 30),  // a: top
    (20, 30, 30, 50), // b: upper right
    (40, 50, 30, 50), // c: lower right
    (50, 70, 20, 30), // d: bottom
    (40, 50, 0, 20),  // e: lower left
    (20, 30, 0, 20),  // f: upper left
    (30, 40, 20, 30), // g: middle
];

type Pattern = [bool; 7];

const fn p(bits: [u8; 7]) -> Pattern {
    [
        bits[0] == 1,
        bits[1] == 1,
        bits[2] == 1,
        bits[3] == 1,
        bits[4] == 1,
        bits[5] == 1,
        bits[6] == 1,
    ]
}

const LOOKUP: [(Pattern, DigitValue); 13] = [
    (p([1, 1, 1, 1, 1, 1, 0]), DigitValue::Digit(0)),
    (p([0, 1, 1, 0, 0, 0, 0]), DigitValue::Digit(1)),
    (p([1, 1, 0, 1, 1, 0, 1]), DigitValue::Digit(2)),
    (p([1, 1, 1, 1, 0, 0, 1]), DigitValue::Digit(3)),
    (p([0, 1, 1, 0, 0, 1, 1]), DigitValue::Digit(4)),
    (p([1, 0, 1, 1, 0, 1, 1]), DigitValue::Digit(5)),
    (p([1, 0, 1, 1, 1, 1, 1]), DigitValue::Digit(6)),
    // 6 on displays that leave the top bar dark
    (p([0, 0, 1, 1, 1, 1, 1]), DigitValue::Digit(6)),
    (p([1, 1, 1, 0, 0, 0, 0]), DigitValue::Digit(7)),
    (p([1, 1, 1, 1, 1, 1, 1]), DigitValue::Digit(8)),
    (p([1, 1, 1, 0, 0, 1, 1]), DigitValue::Digit(9)),
    // 9 with the bottom bar lit
    (p([1, 1, 1, 1, 0, 1, 1]), DigitValue::Digit(9)),
    (p([0, 0, 0, 0, 0, 0, 0]), DigitValue::Blank),
];

/// Value held by one digit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitValue {
    /// All segments dark.
    #[default]
    Blank,
    Digit(u8),
}

impl fmt::Display for DigitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigitValue::Blank => Ok(()),
            DigitValue::Digit(d) => write!(f, "{d}"),
        }
    }
}

/// Seven-segment decoder with last-known-good fallback.
pub struct SegmentDecoder;

impl SegmentDecoder {
    /// Decode a canonical 50x70 tile. Patterns missing from the table keep
    /// `previous`, so a single noisy frame never produces a bogus digit.
    pub fn decode(tile: &GrayImage, previous: DigitValue) -> DigitValue {
        let pattern = if tile.dimensions() == (TILE_WIDTH, TILE_HEIGHT) {
            segment_pattern(tile)
        } else {
            segment_pattern(&imageops::resize(tile, TILE_WIDTH, TILE_HEIGHT, FilterType::Nearest))
        };
        lookup(&pattern).unwrap_or(previous)
    }

    /// Crop `bbox` out of a binarized frame, normalize and decode it.
    pub fn decode_region(image: &GrayImage, bbox: &BoundingBox, previous: DigitValue) -> DigitValue {
        let (w, h) = image.dimensions();
        let b = bbox.clamp(w, h);
        let raw = imageops::crop_imm(image, b.x0 as u32, b.y0 as u32, b.width(), b.height()).to_image();
        Self::decode(&normalize_tile(&raw), previous)
    }
}

pub fn lookup(pattern: &[bool; 7]) -> Option<DigitValue> {
    LOOKUP
        .iter()
        .find(|(known, _)| known == pattern)
        .map(|(_, value)| *value)
}

/// Lit state of segments a..g in a canonical tile.
pub fn segment_pattern(tile: &GrayImage) -> [bool; 7] {
    SEGMENT_WINDOWS.map(|(r0, r1, c0, c1)| {
        let mut sum = 0u64;
        for y in r0..r1 {
            for x in c0..c1 {
                sum += tile.get_pixel(x, y).0[0] as u64;
            }
        }
        let count = ((r1 - r0) * (c1 - c0)) as f64;
        (sum as f64 / count) < LIT_CUTOFF
    })
}

/// Invert-threshold a raw tile, crop it to its ink and resample it onto
/// the canonical grid so the fixed segment windows line up regardless of
/// where the digit sits inside its box.
///
/// A tile without ink becomes a background-only stub that decodes blank.
pub fn normalize_tile(raw: &GrayImage) -> GrayImage {
    let inverted = threshold(raw, INVERT_THRESHOLD, ThresholdType::BinaryInverted);

    let cropped = match ink_bounds(&inverted) {
        Some((x0, y0, x1, y1)) => imageops::crop_imm(&inverted, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image(),
        None => GrayImage::from_pixel(1, 1, Luma([255])),
    };
    imageops::resize(&cropped, TILE_WIDTH, TILE_HEIGHT, FilterType::Nearest)
}

fn ink_bounds(image: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in image.enumerate_pixels() {
        if p.0[0] <= INK_THRESHOLD {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds
}
