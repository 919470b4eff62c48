/// Axis-aligned box in frame pixel coordinates; `(x1, y1)` is the top-left
/// corner and `(x2, y2)` the bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width().max(0)) * i64::from(self.height().max(0))
    }

    /// Grow the box by `relief` pixels on every side.
    pub fn expanded(&self, relief: i32) -> Self {
        Self {
            x1: self.x1.saturating_sub(relief),
            y1: self.y1.saturating_sub(relief),
            x2: self.x2.saturating_add(relief),
            y2: self.y2.saturating_add(relief),
        }
    }

    /// Intersection with a `width x height` frame, or `None` when nothing
    /// of the box is visible.
    pub fn clamped(&self, width: u32, height: u32) -> Option<Self> {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        let clamped = Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        };
        (clamped.width() > 0 && clamped.height() > 0).then_some(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relief_grows_every_side() {
        let bbox = BoundingBox::new(10, 20, 30, 40).expanded(5);
        assert_eq!(bbox, BoundingBox::new(5, 15, 35, 45));
        assert_eq!(bbox.width(), 30);
    }

    #[test]
    fn clamping_to_frame() {
        let bbox = BoundingBox::new(-5, 10, 700, 50);
        assert_eq!(bbox.clamped(640, 360), Some(BoundingBox::new(0, 10, 640, 50)));
        assert_eq!(BoundingBox::new(700, 0, 800, 10).clamped(640, 360), None);
    }
}
