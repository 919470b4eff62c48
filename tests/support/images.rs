use std::path::Path;

use image::{Rgb, RgbImage};

/// A dark frame with a bright square, the kind of snapshot a part is
/// taught from.
pub fn object_frame(size: u32, color: [u8; 3]) -> RgbImage {
    let mut frame = RgbImage::from_pixel(size, size, Rgb([20, 20, 24]));
    let (lo, hi) = (size / 4, size * 3 / 4);
    for y in lo..hi {
        for x in lo..hi {
            frame.put_pixel(x, y, Rgb(color));
        }
    }
    frame
}

/// A frame with a horizontal gradient and no object.
pub fn background_frame(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, _| {
        let v = (x * 255 / size.max(1)) as u8;
        Rgb([v, v / 2, 255 - v])
    })
}

pub fn write_png(path: &Path, image: &RgbImage) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create image dir");
    }
    image.save(path).expect("write png");
}
