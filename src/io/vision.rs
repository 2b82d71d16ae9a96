//! Blob extraction from camera frames
//!
//! The segmentation algorithm is a collaborator behind the `BlobExtractor`
//! trait; the pipeline only consumes the candidate list. The built-in
//! `RedMaskExtractor` reproduces the field setup: a double-band HSV red
//! threshold over the frame, connected components, centroid-of-mass plus
//! pixel area per component.

use crate::domain::types::{BlobCandidate, Point};
use crate::io::capture::Frame;

/// Produces raw blob candidates for one frame. Implementations own the
/// color/contour algorithm entirely.
pub trait BlobExtractor: Send {
    fn extract_blobs(&self, frame: &Frame) -> Vec<BlobCandidate>;
}

/// HSV thresholds for the red double band, in OpenCV's scale
/// (hue 0..180, saturation/value 0..255). Red wraps around hue 0, so two
/// bands: [0, 10] and [170, 180].
#[derive(Debug, Clone, Copy)]
pub struct RedMaskExtractor {
    pub low_hue_max: u8,
    pub high_hue_min: u8,
    pub min_saturation: u8,
    pub min_value: u8,
}

impl Default for RedMaskExtractor {
    fn default() -> Self {
        Self { low_hue_max: 10, high_hue_min: 170, min_saturation: 100, min_value: 100 }
    }
}

/// RGB to HSV with hue in 0..180 and saturation/value in 0..255.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue_deg = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta).rem_euclid(6.0))
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    ((hue_deg / 2.0).round() as u8, (saturation * 255.0).round() as u8, (max * 255.0).round() as u8)
}

impl RedMaskExtractor {
    #[inline]
    fn is_red(&self, r: u8, g: u8, b: u8) -> bool {
        let (h, s, v) = rgb_to_hsv(r, g, b);
        (h <= self.low_hue_max || h >= self.high_hue_min)
            && s >= self.min_saturation
            && v >= self.min_value
    }
}

impl BlobExtractor for RedMaskExtractor {
    fn extract_blobs(&self, frame: &Frame) -> Vec<BlobCandidate> {
        let (width, height) = frame.dimensions();
        let (w, h) = (width as usize, height as usize);

        // Binary mask pass
        let mut mask = vec![false; w * h];
        for (x, y, pixel) in frame.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            if self.is_red(r, g, b) {
                mask[y as usize * w + x as usize] = true;
            }
        }

        // 4-connected component labeling by flood fill
        let mut visited = vec![false; w * h];
        let mut blobs = Vec::new();
        let mut stack = Vec::new();

        for start in 0..w * h {
            if !mask[start] || visited[start] {
                continue;
            }

            let mut count = 0u64;
            let mut sum_x = 0.0;
            let mut sum_y = 0.0;

            visited[start] = true;
            stack.push(start);
            while let Some(idx) = stack.pop() {
                let (x, y) = (idx % w, idx / w);
                count += 1;
                sum_x += x as f64;
                sum_y += y as f64;

                let mut visit = |nx: usize, ny: usize| {
                    let n = ny * w + nx;
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                };
                if x > 0 {
                    visit(x - 1, y);
                }
                if x + 1 < w {
                    visit(x + 1, y);
                }
                if y > 0 {
                    visit(x, y - 1);
                }
                if y + 1 < h {
                    visit(x, y + 1);
                }
            }

            blobs.push(BlobCandidate {
                center: Point::new(sum_x / count as f64, sum_y / count as f64),
                area: count as f64,
            });
        }

        blobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with_square(x0: u32, y0: u32, side: u32) -> Frame {
        let mut frame = RgbImage::new(100, 100);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                frame.put_pixel(x, y, Rgb([255, 20, 20]));
            }
        }
        frame
    }

    #[test]
    fn test_rgb_to_hsv_pure_red() {
        let (h, s, v) = rgb_to_hsv(255, 0, 0);
        assert_eq!(h, 0);
        assert_eq!(s, 255);
        assert_eq!(v, 255);
    }

    #[test]
    fn test_rgb_to_hsv_dark_pixel_not_red() {
        let extractor = RedMaskExtractor::default();
        // Hue is red but value is below the band
        assert!(!extractor.is_red(60, 5, 5));
        assert!(extractor.is_red(255, 20, 20));
    }

    #[test]
    fn test_blank_frame_has_no_blobs() {
        let extractor = RedMaskExtractor::default();
        let frame = RgbImage::new(100, 100);
        assert!(extractor.extract_blobs(&frame).is_empty());
    }

    #[test]
    fn test_single_square_blob() {
        let extractor = RedMaskExtractor::default();
        let frame = frame_with_square(40, 50, 5);

        let blobs = extractor.extract_blobs(&frame);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 25.0);
        assert_eq!(blobs[0].center, Point::new(42.0, 52.0));
    }

    #[test]
    fn test_separate_regions_are_separate_blobs() {
        let extractor = RedMaskExtractor::default();
        let mut frame = frame_with_square(10, 10, 3);
        for y in 80..84 {
            for x in 80..84 {
                frame.put_pixel(x, y, Rgb([230, 30, 30]));
            }
        }

        let mut blobs = extractor.extract_blobs(&frame);
        blobs.sort_by(|a, b| a.area.partial_cmp(&b.area).unwrap());
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].area, 9.0);
        assert_eq!(blobs[1].area, 16.0);
    }

    #[test]
    fn test_green_spot_ignored() {
        let extractor = RedMaskExtractor::default();
        let mut frame = RgbImage::new(50, 50);
        for y in 20..25 {
            for x in 20..25 {
                frame.put_pixel(x, y, Rgb([20, 255, 20]));
            }
        }
        assert!(extractor.extract_blobs(&frame).is_empty());
    }
}
