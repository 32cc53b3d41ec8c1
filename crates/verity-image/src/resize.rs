use crate::RgbImage;
use verity_base::{Rect, Vec2};

// Source coordinate and weight of the left/top tap for one destination index,
// using pixel-center alignment and edge clamping.
fn linear_tap(dst: usize, scale: f32, src_len: usize) -> (usize, usize, f32) {
    let f = (dst as f32 + 0.5) * scale - 0.5;
    let i = f.floor();
    let mut frac = f - i;
    let mut i0 = i as isize;
    if i0 < 0 {
        i0 = 0;
        frac = 0.0;
    }
    let last = src_len as isize - 1;
    if i0 >= last {
        i0 = last;
        frac = 0.0;
    }
    let i0 = i0 as usize;
    let i1 = (i0 + 1).min(src_len - 1);
    (i0, i1, frac)
}

/// Bilinear resize with half-pixel centers and replicated edges.
///
/// Matches OpenCV's `INTER_LINEAR` up to rounding of the fixed-point weights.
pub fn resize_bilinear(image: &RgbImage, size: Vec2<usize>) -> RgbImage {
    if image.size == size {
        return image.clone();
    }
    if image.size.x == 0 || image.size.y == 0 {
        return RgbImage::filled(size, [0, 0, 0]);
    }

    let scale_x = image.size.x as f32 / size.x as f32;
    let scale_y = image.size.y as f32 / size.y as f32;
    let xs: Vec<_> = (0..size.x)
        .map(|x| linear_tap(x, scale_x, image.size.x))
        .collect();

    let stride = image.size.x * 3;
    let mut data = Vec::with_capacity(size.x * size.y * 3);
    for y in 0..size.y {
        let (y0, y1, fy) = linear_tap(y, scale_y, image.size.y);
        let row0 = &image.data[y0 * stride..(y0 + 1) * stride];
        let row1 = &image.data[y1 * stride..(y1 + 1) * stride];
        for &(x0, x1, fx) in &xs {
            for c in 0..3 {
                let top = row0[x0 * 3 + c] as f32 * (1.0 - fx) + row0[x1 * 3 + c] as f32 * fx;
                let bottom = row1[x0 * 3 + c] as f32 * (1.0 - fx) + row1[x1 * 3 + c] as f32 * fx;
                let v = top * (1.0 - fy) + bottom * fy;
                data.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    RgbImage { size, data }
}

/// Sample `roi` (pixel coordinates, may extend past the borders) into a
/// `size` image with bilinear filtering. Samples outside the source are black.
pub fn crop_resize(image: &RgbImage, roi: Rect<f32>, size: Vec2<usize>) -> RgbImage {
    let (w, h) = (image.size.x as isize, image.size.y as isize);
    let fetch = |x: isize, y: isize, c: usize| -> f32 {
        if x < 0 || y < 0 || x >= w || y >= h {
            0.0
        } else {
            image.data[((y * w + x) as usize) * 3 + c] as f32
        }
    };

    let step_x = roi.size.x / size.x as f32;
    let step_y = roi.size.y / size.y as f32;
    let mut data = Vec::with_capacity(size.x * size.y * 3);
    for dy in 0..size.y {
        let sy = roi.origin.y + (dy as f32 + 0.5) * step_y - 0.5;
        let y0 = sy.floor();
        let fy = sy - y0;
        let y0 = y0 as isize;
        for dx in 0..size.x {
            let sx = roi.origin.x + (dx as f32 + 0.5) * step_x - 0.5;
            let x0 = sx.floor();
            let fx = sx - x0;
            let x0 = x0 as isize;
            for c in 0..3 {
                let top = fetch(x0, y0, c) * (1.0 - fx) + fetch(x0 + 1, y0, c) * fx;
                let bottom = fetch(x0, y0 + 1, c) * (1.0 - fx) + fetch(x0 + 1, y0 + 1, c) * fx;
                let v = top * (1.0 - fy) + bottom * fy;
                data.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    RgbImage { size, data }
}
