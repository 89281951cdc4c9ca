use image::{imageops, GrayImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use scoreboard_common::config::{GroupConfig, GroupMode};
use scoreboard_common::geometry::BoundingBox;
use scoreboard_common::params::ProcessingParameters;
use tracing::debug;

use crate::region::DigitRegion;

/// An outer contour reduced to what tracking needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourCandidate {
    pub bbox: BoundingBox,
    pub centroid: (f32, f32),
}

impl ContourCandidate {
    fn from_contour(contour: &Contour<i32>, dx: i32, dy: i32) -> Option<Self> {
        let first = contour.points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        let (mut sx, mut sy) = (0f64, 0f64);
        for pt in &contour.points {
            x0 = x0.min(pt.x);
            y0 = y0.min(pt.y);
            x1 = x1.max(pt.x);
            y1 = y1.max(pt.y);
            sx += pt.x as f64;
            sy += pt.y as f64;
        }
        let n = contour.points.len() as f64;
        Some(Self {
            bbox: BoundingBox::new(x0, y0, x1 + 1, y1 + 1).offset(dx, dy),
            centroid: ((sx / n) as f32 + dx as f32, (sy / n) as f32 + dy as f32),
        })
    }
}

/// A named scoreboard field made of one or more digit slots.
#[derive(Debug, Clone)]
pub struct DigitGroup {
    pub name: String,
    pub mode: GroupMode,
    pub regions: Vec<DigitRegion>,
    /// Search area for [`GroupMode::Auto`].
    pub search: Option<BoundingBox>,
}

impl DigitGroup {
    pub fn from_config(config: &GroupConfig) -> Self {
        match config.mode {
            GroupMode::Fixed => Self {
                name: config.name.clone(),
                mode: GroupMode::Fixed,
                regions: vec![DigitRegion::new(config.rect)],
                search: None,
            },
            GroupMode::Auto => Self {
                name: config.name.clone(),
                mode: GroupMode::Auto,
                regions: Vec::new(),
                search: Some(config.rect),
            },
        }
    }

    /// Run one tick: discover regions (auto mode) and decode every slot.
    pub fn update(&mut self, binary: &GrayImage, params: &ProcessingParameters) {
        if let Some(search) = self.search {
            let candidates = extract_candidates(binary, &search);
            self.track(candidates, params);
        }
        for region in &mut self.regions {
            region.decode(binary);
        }
    }

    /// Fold contour candidates into the tracked regions.
    ///
    /// A candidate whose centroid falls in a tracked box may only enlarge
    /// it; any other candidate starts a new region. Neither may push two
    /// regions past `max_region_overlap`.
    pub fn track(
        &mut self,
        candidates: impl IntoIterator<Item = ContourCandidate>,
        params: &ProcessingParameters,
    ) {
        let min_area = params.min_contour_area as u64;
        for candidate in candidates {
            if candidate.bbox.area() <= min_area {
                continue;
            }
            let (cx, cy) = candidate.centroid;
            match self.regions.iter().position(|r| r.bbox.contains(cx, cy)) {
                Some(idx) => {
                    if candidate.bbox.area() > self.regions[idx].bbox.area()
                        && !self.overlaps_other(Some(idx), &candidate.bbox, params.max_region_overlap)
                    {
                        self.regions[idx].grow_to(candidate.bbox);
                    }
                }
                None => {
                    if self.overlaps_other(None, &candidate.bbox, params.max_region_overlap) {
                        debug!(group = %self.name, bbox = ?candidate.bbox, "rejecting overlapping digit region");
                        continue;
                    }
                    debug!(group = %self.name, bbox = ?candidate.bbox, "tracking new digit region");
                    self.regions.push(DigitRegion::new(candidate.bbox));
                }
            }
        }
    }

    fn overlaps_other(&self, skip: Option<usize>, bbox: &BoundingBox, max_overlap: f64) -> bool {
        self.regions
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, r)| r.bbox.overlap_ratio(bbox) > max_overlap)
    }

    /// Decoded digits, left to right.
    pub fn value(&mut self) -> String {
        self.regions.sort_by_key(|r| r.bbox.x0);
        self.regions
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.value.to_string())
            .collect()
    }

    /// Forget auto-detected regions; fixed groups keep their single slot
    /// but lose its value.
    pub fn reset(&mut self) {
        match self.mode {
            GroupMode::Auto => self.regions.clear(),
            GroupMode::Fixed => {
                for region in &mut self.regions {
                    region.value = Default::default();
                }
            }
        }
    }
}

/// Outer contours (no parent) of the foreground inside `search`, in frame
/// coordinates.
pub fn extract_candidates(binary: &GrayImage, search: &BoundingBox) -> Vec<ContourCandidate> {
    let (w, h) = binary.dimensions();
    let area = search.clamp(w, h);
    if area.is_empty() {
        return Vec::new();
    }
    let sub = imageops::crop_imm(binary, area.x0 as u32, area.y0 as u32, area.width(), area.height()).to_image();
    find_contours::<i32>(&sub)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| ContourCandidate::from_contour(c, area.x0, area.y0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::DigitValue;
    use image::Luma;

    fn auto_group(rect: BoundingBox) -> DigitGroup {
        DigitGroup::from_config(&GroupConfig {
            name: "clock".into(),
            mode: GroupMode::Auto,
            rect,
        })
    }

    fn candidate(bbox: BoundingBox) -> ContourCandidate {
        ContourCandidate {
            bbox,
            centroid: bbox.center(),
        }
    }

    fn params() -> ProcessingParameters {
        ProcessingParameters::default()
    }

    #[test]
    fn region_area_never_shrinks_across_ticks() {
        let mut group = auto_group(BoundingBox::new(0, 0, 400, 200));
        let small = BoundingBox::new(20, 20, 50, 60); // 1200
        let large = BoundingBox::new(18, 18, 54, 64); // 1656
        let same_area = BoundingBox::new(19, 19, 55, 65); // 1656

        for bbox in [small, large, same_area] {
            group.track([candidate(bbox)], &params());
        }
        assert_eq!(group.regions.len(), 1);
        assert_eq!(group.regions[0].bbox, large);

        group.track([candidate(small)], &params());
        assert_eq!(group.regions[0].bbox, large);
    }

    #[test]
    fn speckle_below_min_area_is_ignored() {
        let mut group = auto_group(BoundingBox::new(0, 0, 400, 200));
        group.track([candidate(BoundingBox::new(0, 0, 20, 35))], &params()); // 700
        assert!(group.regions.is_empty());
    }

    #[test]
    fn overlapping_newcomer_is_rejected() {
        let mut group = auto_group(BoundingBox::new(0, 0, 400, 200));
        group.track([candidate(BoundingBox::new(0, 0, 40, 60))], &params());
        // centroid outside the first box, but more than 20% overlap
        group.track([candidate(BoundingBox::new(20, 0, 90, 60))], &params());
        assert_eq!(group.regions.len(), 1);
        group.track([candidate(BoundingBox::new(45, 0, 85, 60))], &params());
        assert_eq!(group.regions.len(), 2);
    }

    #[test]
    fn value_concatenates_left_to_right() {
        let mut group = auto_group(BoundingBox::new(0, 0, 400, 200));
        group.track(
            [
                candidate(BoundingBox::new(200, 0, 240, 60)),
                candidate(BoundingBox::new(100, 0, 140, 60)),
            ],
            &params(),
        );
        group.regions[0].value = DigitValue::Digit(5);
        group.regions[1].value = DigitValue::Digit(1);
        assert_eq!(group.value(), "15");
    }

    #[test]
    fn extracts_outer_blobs_in_frame_coordinates() {
        let mut binary = GrayImage::new(200, 120);
        for y in 30..90 {
            for x in 60..100 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        // hole inside the blob must not produce a second candidate
        for y in 50..60 {
            for x in 75..85 {
                binary.put_pixel(x, y, Luma([0]));
            }
        }
        let found = extract_candidates(&binary, &BoundingBox::new(50, 20, 150, 110));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bbox, BoundingBox::new(60, 30, 100, 90));
        let (cx, cy) = found[0].centroid;
        assert!(found[0].bbox.contains(cx, cy));
    }

    #[test]
    fn reset_clears_auto_regions() {
        let mut group = auto_group(BoundingBox::new(0, 0, 400, 200));
        group.track([candidate(BoundingBox::new(0, 0, 40, 60))], &params());
        group.reset();
        assert!(group.regions.is_empty());
    }

    #[test]
    fn fixed_group_has_one_region() {
        let group = DigitGroup::from_config(&GroupConfig {
            name: "home".into(),
            mode: GroupMode::Fixed,
            rect: BoundingBox::new(5, 5, 55, 75),
        });
        assert_eq!(group.regions.len(), 1);
        assert!(group.search.is_none());
    }
}
