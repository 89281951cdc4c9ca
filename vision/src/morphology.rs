use image::{GrayImage, Luma};
use imageproc::contrast::{self, ThresholdType};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use scoreboard_common::params::ProcessingParameters;

/// Threshold → erode → dilate. Produces a strictly 0/255 image.
pub struct MorphologyStage;

impl MorphologyStage {
    pub fn apply(value: &GrayImage, params: &ProcessingParameters) -> GrayImage {
        let mut binary = threshold(value, params.threshold);
        if params.erosion == 0 && params.dilation == 0 {
            return binary;
        }
        let element = element();
        for _ in 0..params.erosion {
            binary = grayscale_erode(&binary, &element);
        }
        for _ in 0..params.dilation {
            binary = grayscale_dilate(&binary, &element);
        }
        binary
    }
}

/// 2x2 structuring element anchored at its bottom-right cell, so each
/// output pixel looks at `x-1..=x`, `y-1..=y`. Neighbours outside the
/// image are ignored.
fn element() -> Mask {
    Mask::from_image(&GrayImage::from_pixel(2, 2, Luma([255])), 1, 1)
}

/// Fixed global binary threshold: strictly brighter than `thresh` becomes 255.
pub fn threshold(image: &GrayImage, thresh: u8) -> GrayImage {
    contrast::threshold(image, thresh, ThresholdType::Binary)
}

/// One pass of erosion with the 2x2 element.
pub fn erode(image: &GrayImage) -> GrayImage {
    grayscale_erode(image, &element())
}

/// One pass of dilation with the same element as [`erode`].
pub fn dilate(image: &GrayImage) -> GrayImage {
    grayscale_dilate(image, &element())
}
