//! Minimal raster primitives on `image::RgbImage`.
//!
//! All coordinates are signed; anything falling outside the image is clipped
//! pixel by pixel.

use image::{Rgb, RgbImage};

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, color);
    }
}

/// Bresenham line between two points, inclusive.
pub fn line(image: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(image, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Axis-aligned rectangle outline `thickness` pixels wide, drawn inward from
/// the given corners.
///
/// Corners far outside the image are pulled in to just past its border, so
/// the work is bounded by the image size.
pub fn rect_outline(image: &mut RgbImage, top_left: (i64, i64), bottom_right: (i64, i64), thickness: u32, color: Rgb<u8>) {
    let margin = i64::from(thickness.max(1));
    let clamp_x = |x: i64| x.clamp(-margin, i64::from(image.width()) + margin);
    let clamp_y = |y: i64| y.clamp(-margin, i64::from(image.height()) + margin);
    let (x1, y1) = (clamp_x(top_left.0.min(bottom_right.0)), clamp_y(top_left.1.min(bottom_right.1)));
    let (x2, y2) = (clamp_x(top_left.0.max(bottom_right.0)), clamp_y(top_left.1.max(bottom_right.1)));
    for inset in 0..i64::from(thickness.max(1)) {
        let (l, t, r, b) = (x1 + inset, y1 + inset, x2 - inset, y2 - inset);
        if l > r || t > b {
            break;
        }
        line(image, (l, t), (r, t), color);
        line(image, (l, b), (r, b), color);
        line(image, (l, t), (l, b), color);
        line(image, (r, t), (r, b), color);
    }
}

/// Solid rectangle covering `[x1, x2) x [y1, y2)`.
pub fn fill_rect(image: &mut RgbImage, top_left: (i64, i64), bottom_right: (i64, i64), color: Rgb<u8>) {
    let x_start = top_left.0.max(0);
    let y_start = top_left.1.max(0);
    let x_end = bottom_right.0.min(i64::from(image.width()));
    let y_end = bottom_right.1.min(i64::from(image.height()));
    for y in y_start..y_end {
        for x in x_start..x_end {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn diagonal_line_hits_both_endpoints() {
        let mut image = RgbImage::new(5, 5);
        line(&mut image, (0, 0), (4, 4), WHITE);
        for i in 0..5 {
            assert_eq!(*image.get_pixel(i, i), WHITE);
        }
        assert_eq!(*image.get_pixel(1, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn out_of_bounds_segments_are_clipped() {
        let mut image = RgbImage::new(4, 4);
        line(&mut image, (-10, 2), (10, 2), WHITE);
        rect_outline(&mut image, (-5, -5), (50, 50), 2, WHITE);
        fill_rect(&mut image, (3, 3), (99, 99), WHITE);
        assert_eq!(*image.get_pixel(0, 2), WHITE);
        assert_eq!(*image.get_pixel(3, 3), WHITE);
    }

    #[test]
    fn outline_leaves_interior_untouched() {
        let mut image = RgbImage::new(10, 10);
        rect_outline(&mut image, (1, 1), (8, 8), 2, WHITE);
        assert_eq!(*image.get_pixel(1, 1), WHITE);
        assert_eq!(*image.get_pixel(2, 5), WHITE);
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn huge_outline_only_draws_the_visible_edges() {
        let mut image = RgbImage::new(16, 16);
        rect_outline(&mut image, (2, 3), (i64::from(i32::MAX), i64::from(i32::MAX)), 2, WHITE);
        assert_eq!(*image.get_pixel(2, 10), WHITE);
        assert_eq!(*image.get_pixel(3, 10), WHITE);
        assert_eq!(*image.get_pixel(10, 3), WHITE);
        assert_eq!(*image.get_pixel(15, 15), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    }
}
