use image::GrayImage;
use scoreboard_common::geometry::BoundingBox;

use crate::segment::{DigitValue, SegmentDecoder};

/// One tracked digit slot. Owned by its [`DigitGroup`](crate::group::DigitGroup).
#[derive(Debug, Clone, PartialEq)]
pub struct DigitRegion {
    pub bbox: BoundingBox,
    pub value: DigitValue,
    pub enabled: bool,
}

impl DigitRegion {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            value: DigitValue::Blank,
            enabled: true,
        }
    }

    /// Decode this slot from the binarized frame, keeping the last good
    /// value on an unrecognized pattern.
    pub fn decode(&mut self, binary: &GrayImage) -> DigitValue {
        if self.enabled {
            self.value = SegmentDecoder::decode_region(binary, &self.bbox, self.value);
        }
        self.value
    }

    /// Replace the box only with a strictly larger one. Returns whether the
    /// box changed.
    pub fn grow_to(&mut self, candidate: BoundingBox) -> bool {
        if candidate.area() > self.bbox.area() {
            self.bbox = candidate;
            true
        } else {
            false
        }
    }
}
