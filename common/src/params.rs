use serde::{Deserialize, Serialize};

/// Per-frame processing knobs. Replaced as a whole on every update; the
/// capture loop never mutates a single field in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingParameters {
    /// Rotation about the frame center, degrees, counter-clockwise.
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_skew_x")]
    pub skew_x: f32,
    #[serde(default)]
    pub skew_y: f32,
    /// Global binary threshold applied to the HSV value channel.
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default = "default_erosion")]
    pub erosion: u32,
    #[serde(default)]
    pub dilation: u32,
    /// Positive values trim pixels from the left edge, negative values pad
    /// a white border of that width.
    #[serde(default)]
    pub crop_left: i32,
    #[serde(default)]
    pub crop_top: i32,
    #[serde(default)]
    pub autocrop: AutocropConfig,
    /// Contours with a smaller bounding-box area are treated as speckle.
    #[serde(default = "default_min_contour_area")]
    pub min_contour_area: u32,
    /// Largest tolerated intersection (relative to the smaller box) between
    /// two auto-detected digit regions.
    #[serde(default = "default_max_region_overlap")]
    pub max_region_overlap: f64,
}

impl Default for ProcessingParameters {
    fn default() -> Self {
        Self {
            rotation: 0.0,
            skew_x: default_skew_x(),
            skew_y: 0.0,
            threshold: default_threshold(),
            erosion: default_erosion(),
            dilation: 0,
            crop_left: 0,
            crop_top: 0,
            autocrop: AutocropConfig::default(),
            min_contour_area: default_min_contour_area(),
            max_region_overlap: default_max_region_overlap(),
        }
    }
}

/// Perspective rectification of the display face onto an upright rectangle.
///
/// Corners are named instead of listed so the mapping never depends on a
/// winding convention.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AutocropConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub quad: Option<Quad>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: [f32; 2],
    pub top_right: [f32; 2],
    pub bottom_right: [f32; 2],
    pub bottom_left: [f32; 2],
}

impl Quad {
    /// Size of the upright rectangle the quad is rectified onto: the longer
    /// of each pair of opposite edges.
    pub fn target_size(&self) -> (u32, u32) {
        let dist = |a: [f32; 2], b: [f32; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        let width = dist(self.top_left, self.top_right).max(dist(self.bottom_left, self.bottom_right));
        let height = dist(self.top_left, self.bottom_left).max(dist(self.top_right, self.bottom_right));
        (width.round().max(1.0) as u32, height.round().max(1.0) as u32)
    }
}

fn default_skew_x() -> f32 {
    5.0
}
fn default_threshold() -> u8 {
    127
}
fn default_erosion() -> u32 {
    2
}
fn default_min_contour_area() -> u32 {
    700
}
fn default_max_region_overlap() -> f64 {
    0.2
}
