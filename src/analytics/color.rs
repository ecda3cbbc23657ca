use image::{GrayImage, Luma, RgbImage};
use imageproc::map::map_colors;

/// Inclusive bounds in 8-bit HSV (hue 0..180, saturation and value 0..255).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.lower[c] <= hsv[c] && hsv[c] <= self.upper[c])
    }
}

const HSV_SHIFT: u32 = 12;
const HSV_ROUND: i32 = 1 << (HSV_SHIFT - 1);

/// 8-bit RGB to HSV with hue in 0..180, using the fixed-point reciprocal
/// tables OpenCV's `COLOR_RGB2HSV` uses, so range bounds agree bit for bit.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let v = r.max(g).max(b);
    let diff = v - r.min(g).min(b);

    let sdiv = if v == 0 {
        0
    } else {
        ((255 << HSV_SHIFT) as f64 / v as f64).round_ties_even() as i32
    };
    let hdiv = if diff == 0 {
        0
    } else {
        ((180 << HSV_SHIFT) as f64 / (6.0 * diff as f64)).round_ties_even() as i32
    };

    let s = (diff * sdiv + HSV_ROUND) >> HSV_SHIFT;
    let h = if v == r {
        g - b
    } else if v == g {
        b - r + 2 * diff
    } else {
        r - g + 4 * diff
    };
    let mut h = (h * hdiv + HSV_ROUND) >> HSV_SHIFT;
    if h < 0 {
        h += 180;
    }

    [h as u8, s as u8, v as u8]
}

/// BT.601 luma with the same fixed-point rounding OpenCV uses.
pub fn luminance([r, g, b]: [u8; 3]) -> u8 {
    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14) as u8
}

/// Grayscale of the pixels whose HSV falls inside `range`; everything else is 0.
pub fn isolate(frame: &RgbImage, range: &ColorRange) -> GrayImage {
    map_colors(frame, |px| {
        if range.contains(rgb_to_hsv(px.0)) {
            Luma([luminance(px.0)])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const BLUE_RANGE: ColorRange = ColorRange {
        lower: [102, 50, 50],
        upper: [122, 131, 145],
    };

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
        assert_eq!(rgb_to_hsv([80, 95, 140]), [113, 109, 140]);
    }

    #[test]
    fn test_hue_uses_fixed_point_rounding() {
        // exact hue is 122.5; the reciprocal table lands it on 122
        assert_eq!(rgb_to_hsv([37, 34, 70]), [122, 131, 70]);
        assert!(BLUE_RANGE.contains(rgb_to_hsv([37, 34, 70])));
        // exact hue is 102.5, kept at the lower bound
        assert_eq!(rgb_to_hsv([34, 55, 70]), [102, 131, 70]);
        // saturation truncates after the table multiply
        assert_eq!(rgb_to_hsv([28, 26, 52])[1], 127);
    }

    #[test]
    fn test_luminance() {
        assert_eq!(luminance([0, 0, 0]), 0);
        assert_eq!(luminance([255, 255, 255]), 255);
        assert_eq!(luminance([80, 95, 140]), 96);
    }

    #[test]
    fn test_isolate_keeps_only_in_range_pixels() {
        let mut frame = RgbImage::from_pixel(4, 2, Rgb([200, 30, 30]));
        frame.put_pixel(1, 0, Rgb([80, 95, 140]));
        frame.put_pixel(3, 1, Rgb([0, 0, 0]));

        let gray = isolate(&frame, &BLUE_RANGE);

        assert_eq!(gray.get_pixel(1, 0).0, [96]);
        assert_eq!(gray.get_pixel(0, 0).0, [0]);
        assert_eq!(gray.get_pixel(3, 1).0, [0]);
        assert_eq!(gray.pixels().filter(|p| p.0[0] > 0).count(), 1);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        assert!(BLUE_RANGE.contains([102, 50, 50]));
        assert!(BLUE_RANGE.contains([122, 131, 145]));
        assert!(!BLUE_RANGE.contains([123, 100, 100]));
        assert!(!BLUE_RANGE.contains([110, 49, 100]));
    }
}
