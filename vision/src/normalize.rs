use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{
    rotate_about_center, warp, warp_into, Interpolation, Projection,
};
use scoreboard_common::params::{ProcessingParameters, Quad};
use tracing::warn;

const PAD_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const FILL: Luma<u8> = Luma([0]);

/// Crop/rectify/rotate/shear stage. Produces the HSV value channel of the
/// normalized frame; everything downstream works on that single channel.
pub struct GeometryNormalizer;

impl GeometryNormalizer {
    pub fn apply(frame: &RgbImage, params: &ProcessingParameters) -> GrayImage {
        let cropped = crop(frame, params.crop_left, params.crop_top);
        let mut value = value_channel(&cropped);

        if params.autocrop.enabled {
            match params.autocrop.quad.as_ref() {
                Some(quad) => match rectify(&value, quad) {
                    Some(rectified) => value = rectified,
                    None => warn!(?quad, "autocrop quad is degenerate, skipping rectification"),
                },
                None => warn!("autocrop enabled without a quad, skipping rectification"),
            }
        }

        if params.rotation != 0.0 {
            value = rotate(&value, params.rotation);
        }
        if params.skew_x != 0.0 || params.skew_y != 0.0 {
            value = shear(&value, params.skew_x, params.skew_y);
        }
        value
    }
}

/// Trim (`offset >= 0`) or white-pad (`offset < 0`) the left and top edges.
///
/// Padding keeps digit boxes at the same absolute coordinates when the
/// display sits at the very edge of the camera image. At least one column
/// and row always survive.
pub fn crop(frame: &RgbImage, left: i32, top: i32) -> RgbImage {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let left = left.min(w as i32 - 1) as i64;
    let top = top.min(h as i32 - 1) as i64;
    let new_w = (w as i64 - left) as u32;
    let new_h = (h as i64 - top) as u32;

    RgbImage::from_fn(new_w, new_h, |x, y| {
        let sx = x as i64 + left;
        let sy = y as i64 + top;
        if sx < 0 || sy < 0 {
            PAD_COLOR
        } else {
            *frame.get_pixel(sx as u32, sy as u32)
        }
    })
}

/// HSV value channel: the brightest of the three components.
pub fn value_channel(frame: &RgbImage) -> GrayImage {
    let (w, h) = frame.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let Rgb([r, g, b]) = *frame.get_pixel(x, y);
        Luma([r.max(g).max(b)])
    })
}

/// Perspective-warp `quad` onto an upright rectangle anchored at the origin.
/// Returns `None` when the four corners admit no projective mapping.
pub fn rectify(image: &GrayImage, quad: &Quad) -> Option<GrayImage> {
    let (tw, th) = quad.target_size();
    let from = [
        (quad.top_left[0], quad.top_left[1]),
        (quad.top_right[0], quad.top_right[1]),
        (quad.bottom_right[0], quad.bottom_right[1]),
        (quad.bottom_left[0], quad.bottom_left[1]),
    ];
    let to = [
        (0.0, 0.0),
        (tw as f32, 0.0),
        (tw as f32, th as f32),
        (0.0, th as f32),
    ];
    let projection = Projection::from_control_points(from, to)?;
    let mut out = GrayImage::new(tw, th);
    warp_into(image, &projection, Interpolation::Bilinear, FILL, &mut out);
    Some(out)
}

/// Rotate about the image center; positive degrees turn counter-clockwise.
pub fn rotate(image: &GrayImage, degrees: f32) -> GrayImage {
    // imageproc rotates clockwise for positive angles.
    rotate_about_center(image, -degrees.to_radians(), Interpolation::Bilinear, FILL)
}

/// Shear along both axes: `x' = x + tan(skew_x)·y`, `y' = tan(skew_y)·x + y`.
pub fn shear(image: &GrayImage, skew_x: f32, skew_y: f32) -> GrayImage {
    let tx = skew_x.to_radians().tan();
    let ty = skew_y.to_radians().tan();
    match Projection::from_matrix([1.0, tx, 0.0, ty, 1.0, 0.0, 0.0, 0.0, 1.0]) {
        Some(projection) => warp(image, &projection, Interpolation::Bilinear, FILL),
        None => {
            warn!(skew_x, skew_y, "shear matrix is singular, leaving frame unsheared");
            image.clone()
        }
    }
}
