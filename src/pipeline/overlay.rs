//! Presentation-only frame annotation. Never feeds back into
//! authorization decisions.

use crate::recognition::FaceRegion;
use image::{Rgb, RgbImage};

/// Known face
pub const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
/// Unknown face / invalid QR
pub const RED: Rgb<u8> = Rgb([220, 0, 0]);
/// Valid QR quadrilateral
pub const BLUE: Rgb<u8> = Rgb([0, 80, 255]);

const THICKNESS: u32 = 2;

/// Draw a face bounding box.
pub fn draw_region(img: &mut RgbImage, region: &FaceRegion, color: Rgb<u8>) {
    let right = region.right.min(img.width().saturating_sub(1));
    let bottom = region.bottom.min(img.height().saturating_sub(1));
    let left = region.left.min(right);
    let top = region.top.min(bottom);

    for t in 0..THICKNESS {
        for x in left..=right {
            put(img, x, top.saturating_add(t), color);
            put(img, x, bottom.saturating_sub(t), color);
        }
        for y in top..=bottom {
            put(img, left.saturating_add(t), y, color);
            put(img, right.saturating_sub(t), y, color);
        }
    }
}

/// Outline a detected QR quadrilateral.
pub fn draw_quad(img: &mut RgbImage, corners: &[(i32, i32); 4], color: Rgb<u8>) {
    for i in 0..4 {
        draw_line(img, corners[i], corners[(i + 1) % 4], color);
    }
}

fn draw_line(img: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Rgb<u8>) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs());
    if steps == 0 {
        put_signed(img, from.0, from.1, color);
        return;
    }

    for i in 0..=steps {
        let x = from.0 + dx * i / steps;
        let y = from.1 + dy * i / steps;
        put_signed(img, x, y, color);
        put_signed(img, x + 1, y, color);
        put_signed(img, x, y + 1, color);
    }
}

fn put(img: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, color);
    }
}

fn put_signed(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 {
        put(img, x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_region_marks_the_border() {
        let mut img = RgbImage::new(100, 100);
        let region = FaceRegion {
            top: 10,
            right: 60,
            bottom: 50,
            left: 20,
        };
        draw_region(&mut img, &region, GREEN);

        assert_eq!(*img.get_pixel(40, 10), GREEN);
        assert_eq!(*img.get_pixel(20, 30), GREEN);
        // interior untouched
        assert_eq!(*img.get_pixel(40, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn out_of_bounds_region_does_not_panic() {
        let mut img = RgbImage::new(32, 32);
        let region = FaceRegion {
            top: 10,
            right: 500,
            bottom: 400,
            left: 2,
        };
        draw_region(&mut img, &region, RED);
    }

    #[test]
    fn quad_with_negative_corners_does_not_panic() {
        let mut img = RgbImage::new(32, 32);
        let corners = [(-5, -5), (40, -2), (40, 40), (-3, 40)];
        draw_quad(&mut img, &corners, BLUE);
    }
}
