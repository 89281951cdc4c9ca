use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle in processed-image space.
///
/// Corners are inclusive on the top-left and exclusive on the bottom-right,
/// so `x1 - x0` is the width. Construct through [`BoundingBox::new`] to get
/// ordered corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(xa: i32, ya: i32, xb: i32, yb: i32) -> Self {
        Self {
            x0: xa.min(xb),
            y0: ya.min(yb),
            x1: xa.max(xb),
            y1: ya.max(yb),
        }
    }

    pub fn width(&self) -> u32 {
        (self.x1 - self.x0).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y1 - self.y0).max(0) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Clamp the box into a `width` x `height` image. The result keeps
    /// `x0 <= x1` and `y0 <= y1` even when the box lies fully outside.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        let w = width as i32;
        let h = height as i32;
        let x0 = self.x0.clamp(0, w);
        let y0 = self.y0.clamp(0, h);
        Self {
            x0,
            y0,
            x1: self.x1.clamp(x0, w),
            y1: self.y1.clamp(y0, h),
        }
    }

    /// Shift the box by `(dx, dy)`.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x0 + self.x1) as f32 / 2.0,
            (self.y0 + self.y1) as f32 / 2.0,
        )
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 as f32 && x < self.x1 as f32 && y >= self.y0 as f32 && y < self.y1 as f32
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0) as u64;
        let h = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0) as u64;
        w * h
    }

    /// Intersection area relative to the smaller of the two boxes (0..=1).
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f64 {
        let smaller = self.area().min(other.area());
        if smaller == 0 {
            return 0.0;
        }
        self.intersection_area(other) as f64 / smaller as f64
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(c: [i32; 4]) -> Self {
        BoundingBox::new(c[0], c[1], c[2], c[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_orders_corners() {
        let b = BoundingBox::new(30, 40, 10, 5);
        assert_eq!(b, BoundingBox { x0: 10, y0: 5, x1: 30, y1: 40 });
        assert_eq!(b.width(), 20);
        assert_eq!(b.height(), 35);
    }

    #[test]
    fn clamp_keeps_ordering_outside_image() {
        let b = BoundingBox::new(120, 90, 200, 150).clamp(100, 80);
        assert!(b.x0 <= b.x1 && b.y0 <= b.y1);
        assert!(b.is_empty());

        let partial = BoundingBox::new(-5, -5, 20, 20).clamp(100, 80);
        assert_eq!(partial, BoundingBox::new(0, 0, 20, 20));
    }

    #[test]
    fn overlap_ratio_uses_smaller_box() {
        let big = BoundingBox::new(0, 0, 100, 100);
        let small = BoundingBox::new(90, 90, 110, 110);
        assert_eq!(big.intersection_area(&small), 100);
        assert!((big.overlap_ratio(&small) - 0.25).abs() < 1e-9);
        assert_eq!(big.overlap_ratio(&BoundingBox::new(200, 200, 210, 210)), 0.0);
    }

    #[test]
    fn center_and_containment() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 5, 30, 40);
        assert_eq!(b.center(), (25.0, 22.5));
        assert!(a.contains(5.0, 5.0));
        assert!(!a.contains(10.0, 5.0));
    }

    #[test]
    fn deserializes_from_corner_array() {
        let b: BoundingBox = serde_json::from_str("[50, 60, 10, 20]").unwrap();
        assert_eq!(b, BoundingBox::new(10, 20, 50, 60));
    }
}
