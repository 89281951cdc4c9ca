use chrono::Local;
use image::RgbImage;
use scoreboard_common::config::GroupConfig;
use scoreboard_common::frame::{DecodedValues, FrameBuffer};
use scoreboard_common::params::ProcessingParameters;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::annotate::annotate;
use crate::group::DigitGroup;
use crate::morphology::MorphologyStage;
use crate::normalize::GeometryNormalizer;

/// Raw capture and processed-with-overlay frames of one tick.
#[derive(Debug, Clone)]
pub struct PreviewFrames {
    pub raw: Arc<RgbImage>,
    pub processed: Arc<RgbImage>,
}

#[derive(Debug, Clone)]
pub struct TickOutput {
    pub values: DecodedValues,
    pub previews: PreviewFrames,
}

/// Normalizer → morphology → per-group decode → annotated preview.
///
/// Owns the digit groups and their tracking state; lives on the capture
/// thread.
pub struct FrameProcessor {
    groups: Vec<DigitGroup>,
}

impl FrameProcessor {
    pub fn new(configs: &[GroupConfig]) -> Self {
        Self {
            groups: configs.iter().map(DigitGroup::from_config).collect(),
        }
    }

    /// Drop every group (and its tracked regions) and rebuild from `configs`.
    pub fn replace_groups(&mut self, configs: &[GroupConfig]) {
        self.groups = configs.iter().map(DigitGroup::from_config).collect();
    }

    pub fn groups(&self) -> &[DigitGroup] {
        &self.groups
    }

    pub fn process(&mut self, frame: &FrameBuffer, params: &ProcessingParameters) -> TickOutput {
        let raw = frame.to_rgb_image();
        let value = GeometryNormalizer::apply(&raw, params);
        let binary = MorphologyStage::apply(&value, params);

        let mut decoded = BTreeMap::new();
        for group in &mut self.groups {
            group.update(&binary, params);
            decoded.insert(group.name.clone(), group.value());
        }

        let processed = annotate(&binary, &self.groups);
        TickOutput {
            values: DecodedValues::new(decoded, Local::now()),
            previews: PreviewFrames {
                raw: Arc::new(raw),
                processed: Arc::new(processed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::tile_with;
    use image::{GrayImage, Rgb};
    use scoreboard_common::config::GroupMode;
    use scoreboard_common::geometry::BoundingBox;

    fn flat_params() -> ProcessingParameters {
        ProcessingParameters {
            skew_x: 0.0,
            erosion: 0,
            ..ProcessingParameters::default()
        }
    }

    /// Camera-like frame: bright segments on a dark face, the face placed
    /// at `(ox, oy)` on a panel of brightness `panel`.
    fn frame_with_digits(digits: &[[bool; 7]], ox: u32, oy: u32, gap: u32, panel: u8) -> FrameBuffer {
        let mut image = RgbImage::from_pixel(320, 160, Rgb([panel, panel, panel]));
        for (i, lit) in digits.iter().enumerate() {
            let tile: GrayImage = tile_with(*lit);
            let x_off = ox + i as u32 * (50 + gap);
            for (x, y, p) in tile.enumerate_pixels() {
                let v = 255 - p.0[0];
                image.put_pixel(x + x_off, y + oy, Rgb([v, v / 2, 0]));
            }
        }
        FrameBuffer::from_rgb(image, 0, 0)
    }

    const EIGHT: [bool; 7] = [true; 7];
    const ONE: [bool; 7] = [false, true, true, false, false, false, false];
    const BLANK: [bool; 7] = [false; 7];

    #[test]
    fn fixed_groups_decode_end_to_end() {
        let frame = frame_with_digits(&[EIGHT, ONE, BLANK], 20, 40, 10, 230);
        let mut processor = FrameProcessor::new(&[
            GroupConfig { name: "a".into(), mode: GroupMode::Fixed, rect: BoundingBox::new(20, 40, 70, 110) },
            GroupConfig { name: "b".into(), mode: GroupMode::Fixed, rect: BoundingBox::new(80, 40, 130, 110) },
            GroupConfig { name: "c".into(), mode: GroupMode::Fixed, rect: BoundingBox::new(140, 40, 190, 110) },
        ]);
        let out = processor.process(&frame, &flat_params());
        assert_eq!(out.values.get("a"), Some("8"));
        assert_eq!(out.values.get("b"), Some("1"));
        assert_eq!(out.values.get("c"), Some(""));
        assert_eq!(out.previews.raw.dimensions(), (320, 160));
        assert_eq!(out.previews.processed.dimensions(), (320, 160));
    }

    #[test]
    fn negative_crop_keeps_box_coordinates_on_content() {
        let frame = frame_with_digits(&[EIGHT], 0, 0, 0, 230);
        let params = ProcessingParameters { crop_left: -10, crop_top: -5, ..flat_params() };
        let mut processor = FrameProcessor::new(&[GroupConfig {
            name: "a".into(),
            mode: GroupMode::Fixed,
            rect: BoundingBox::new(10, 5, 60, 75),
        }]);
        assert_eq!(processor.process(&frame, &params).values.get("a"), Some("8"));
    }

    #[test]
    fn auto_group_reads_multi_digit_counter() {
        let frame = frame_with_digits(&[EIGHT, EIGHT], 100, 40, 12, 20);
        let mut processor = FrameProcessor::new(&[GroupConfig {
            name: "clock".into(),
            mode: GroupMode::Auto,
            rect: BoundingBox::new(90, 30, 240, 120),
        }]);
        let params = flat_params();
        let first = processor.process(&frame, &params);
        assert_eq!(first.values.get("clock"), Some("88"));
        assert_eq!(processor.groups()[0].regions.len(), 2);

        // stable input must not spawn duplicate regions
        let second = processor.process(&frame, &params);
        assert_eq!(second.values.get("clock"), Some("88"));
        assert_eq!(processor.groups()[0].regions.len(), 2);
    }

    #[test]
    fn replace_groups_swaps_the_whole_set() {
        let mut processor = FrameProcessor::new(&[GroupConfig {
            name: "old".into(),
            mode: GroupMode::Fixed,
            rect: BoundingBox::new(0, 0, 10, 10),
        }]);
        processor.replace_groups(&[GroupConfig {
            name: "new".into(),
            mode: GroupMode::Auto,
            rect: BoundingBox::new(0, 0, 100, 100),
        }]);
        assert_eq!(processor.groups().len(), 1);
        assert_eq!(processor.groups()[0].name, "new");
    }
}
