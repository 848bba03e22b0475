use image::{Rgb, RgbImage};

/// Grid rows for a video of `width` x `height` rendered `columns` wide.
///
/// Glyph cells are about twice as tall as they are wide, so the row count is
/// halved: `floor(columns * height / width * 0.5)`, never less than 1.
pub fn grid_height(columns: u32, width: u32, height: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let rows = (columns as u64 * height as u64 / width as u64) / 2;
    rows.clamp(1, u32::MAX as u64) as u32
}

/// Resize `frame` to exactly `target_width` x `target_height` by area averaging.
///
/// Every output pixel is the mean of the source pixels under its footprint,
/// with partially covered source pixels weighted by the covered fraction.
pub fn downsample(frame: &RgbImage, target_width: u32, target_height: u32) -> RgbImage {
    let (src_w, src_h) = frame.dimensions();
    if target_width == 0 || target_height == 0 || src_w == 0 || src_h == 0 {
        return RgbImage::new(target_width, target_height);
    }
    if (src_w, src_h) == (target_width, target_height) {
        return frame.clone();
    }

    let xs = axis_weights(src_w, target_width);
    let ys = axis_weights(src_h, target_height);

    let mut out = RgbImage::new(target_width, target_height);
    for (oy, y_weights) in ys.iter().enumerate() {
        for (ox, x_weights) in xs.iter().enumerate() {
            let mut acc = [0.0f64; 3];
            let mut total = 0.0f64;
            for &(sy, wy) in y_weights {
                for &(sx, wx) in x_weights {
                    let w = wx * wy;
                    let px = frame.get_pixel(sx, sy);
                    acc[0] += px[0] as f64 * w;
                    acc[1] += px[1] as f64 * w;
                    acc[2] += px[2] as f64 * w;
                    total += w;
                }
            }
            let channel = |v: f64| (v / total).round().clamp(0.0, 255.0) as u8;
            out.put_pixel(
                ox as u32,
                oy as u32,
                Rgb([channel(acc[0]), channel(acc[1]), channel(acc[2])]),
            );
        }
    }
    out
}

/// For each destination index along one axis, the source indices it covers
/// and how much of each one.
fn axis_weights(src: u32, dst: u32) -> Vec<Vec<(u32, f64)>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|i| {
            let start = i as f64 * scale;
            let end = ((i + 1) as f64 * scale).min(src as f64);
            let first = (start.floor() as u32).min(src - 1);
            let last = (end.ceil() as u32).clamp(first + 1, src);
            let weights: Vec<(u32, f64)> = (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 1e-9).then_some((s, overlap))
                })
                .collect();
            if weights.is_empty() {
                vec![(first, 1.0)]
            } else {
                weights
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_height_for_full_hd() {
        assert_eq!(grid_height(150, 1920, 1080), 42);
        assert_eq!(grid_height(80, 1920, 1080), 22);
        assert_eq!(grid_height(80, 640, 480), 30);
    }

    #[test]
    fn grid_height_never_zero() {
        assert_eq!(grid_height(20, 4000, 100), 1);
        assert_eq!(grid_height(20, 0, 100), 1);
    }

    #[test]
    fn output_has_exact_target_size() {
        let frame = RgbImage::from_pixel(37, 23, Rgb([10, 20, 30]));
        let out = downsample(&frame, 11, 5);
        assert_eq!(out.dimensions(), (11, 5));
        assert!(out.pixels().all(|p| *p == Rgb([10, 20, 30])));
    }

    #[test]
    fn averages_whole_blocks() {
        // 4x2 source: left half black, right half white.
        let mut frame = RgbImage::new(4, 2);
        for y in 0..2 {
            for x in 2..4 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let out = downsample(&frame, 2, 1);
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(1, 0), Rgb([255, 255, 255]));

        let single = downsample(&frame, 1, 1);
        assert_eq!(*single.get_pixel(0, 0), Rgb([128, 128, 128]));
    }

    #[test]
    fn weights_partially_covered_pixels() {
        // 3 source columns into 2: each output covers 1.5 source pixels.
        let mut frame = RgbImage::new(3, 1);
        frame.put_pixel(0, 0, Rgb([0, 0, 0]));
        frame.put_pixel(1, 0, Rgb([90, 90, 90]));
        frame.put_pixel(2, 0, Rgb([180, 180, 180]));
        let out = downsample(&frame, 2, 1);
        // (0 * 1.0 + 90 * 0.5) / 1.5 = 30; (90 * 0.5 + 180 * 1.0) / 1.5 = 150
        assert_eq!(*out.get_pixel(0, 0), Rgb([30, 30, 30]));
        assert_eq!(*out.get_pixel(1, 0), Rgb([150, 150, 150]));
    }

    #[test]
    fn is_deterministic() {
        let frame = RgbImage::from_fn(64, 36, |x, y| Rgb([(x * 4) as u8, (y * 7) as u8, (x ^ y) as u8]));
        assert_eq!(downsample(&frame, 20, 7), downsample(&frame, 20, 7));
    }
}
