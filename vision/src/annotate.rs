use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use scoreboard_common::geometry::BoundingBox;

use crate::group::DigitGroup;

const REGION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const SEARCH_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Processed frame in RGB with every digit box and search area outlined.
pub fn annotate(binary: &GrayImage, groups: &[DigitGroup]) -> RgbImage {
    let mut out = RgbImage::from_fn(binary.width(), binary.height(), |x, y| {
        let v = binary.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });
    for group in groups {
        if let Some(search) = &group.search {
            outline(&mut out, search, SEARCH_COLOR);
        }
        for region in &group.regions {
            outline(&mut out, &region.bbox, REGION_COLOR);
        }
    }
    out
}

fn outline(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    if bbox.is_empty() {
        return;
    }
    let rect = Rect::at(bbox.x0, bbox.y0).of_size(bbox.width(), bbox.height());
    draw_hollow_rect_mut(image, rect, color);
}
