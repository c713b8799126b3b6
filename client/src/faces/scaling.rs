use super::face::DecodedImage;

/// Doubles width and height with the Scale2x (EPX) algorithm.
///
/// Each source pixel `P` becomes a 2x2 block. With `A` above, `B` right,
/// `C` left and `D` below, a corner copies the neighbour shared by its two
/// adjacent edges when those neighbours agree and the opposite ones do not;
/// otherwise it copies `P`. Neighbours outside the image repeat the edge.
pub fn scale2x(src: &DecodedImage) -> DecodedImage {
    let w = src.width();
    let h = src.height();
    let out_w = w * 2;
    let mut out = vec![0u8; out_w as usize * h as usize * 2 * 4];

    let mut put = |x: u32, y: u32, rgba: [u8; 4]| {
        let i = (y as usize * out_w as usize + x as usize) * 4;
        out[i..i + 4].copy_from_slice(&rgba);
    };

    for y in 0..h {
        for x in 0..w {
            let p = src.pixel(x, y);
            let a = src.pixel(x, y.saturating_sub(1));
            let b = src.pixel(x + 1, y);
            let c = src.pixel(x.saturating_sub(1), y);
            let d = src.pixel(x, y + 1);

            let e0 = if c == a && c != d && a != b { a } else { p };
            let e1 = if a == b && a != c && b != d { b } else { p };
            let e2 = if d == c && d != b && c != a { c } else { p };
            let e3 = if b == d && b != a && d != c { d } else { p };

            put(2 * x, 2 * y, e0);
            put(2 * x + 1, 2 * y, e1);
            put(2 * x, 2 * y + 1, e2);
            put(2 * x + 1, 2 * y + 1, e3);
        }
    }

    DecodedImage::from_rgba(out_w, h * 2, out).unwrap_or_else(|| src.clone())
}

/// Shrinks an image by `divisor` in both directions, averaging each block.
///
/// The result is at least one pixel wide and high; images smaller than the
/// divisor collapse to their average colour.
pub fn shrink(src: &DecodedImage, divisor: u32) -> DecodedImage {
    let divisor = divisor.max(1);
    let w = src.width();
    let h = src.height();
    let out_w = (w / divisor).max(1);
    let out_h = (h / divisor).max(1);
    let mut out = Vec::with_capacity(out_w as usize * out_h as usize * 4);

    for oy in 0..out_h {
        let y0 = oy * h / out_h;
        let y1 = ((oy + 1) * h / out_h).max(y0 + 1);
        for ox in 0..out_w {
            let x0 = ox * w / out_w;
            let x1 = ((ox + 1) * w / out_w).max(x0 + 1);

            let mut sum = [0u64; 4];
            for y in y0..y1 {
                for x in x0..x1 {
                    let px = src.pixel(x, y);
                    for (s, v) in sum.iter_mut().zip(px) {
                        *s += u64::from(v);
                    }
                }
            }
            let count = u64::from((x1 - x0) * (y1 - y0));
            out.extend(sum.iter().map(|s| (s / count) as u8));
        }
    }

    DecodedImage::from_rgba(out_w, out_h, out).unwrap_or_else(|| src.clone())
}
