//! Color space helpers for the Color Control cluster
//!
//! The ZCL represents chromaticity as CIE 1931 `x`/`y` in 16-bit fixed point
//! (value / 65536, capped at 0xFEFF). Conversion uses sRGB gamma and the
//! wide gamut D65 matrix common to Light Link bulbs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest value CurrentX / CurrentY may carry
pub const MAX_XY_FIXED: u16 = 0xFEFF;

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// CIE 1931 chromaticity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    /// Build from the raw CurrentX / CurrentY attribute values
    #[must_use]
    pub fn from_fixed(x: u16, y: u16) -> Self {
        Self {
            x: f64::from(x) / 65536.0,
            y: f64::from(y) / 65536.0,
        }
    }

    /// Fixed point pair for a MoveToColor command
    #[must_use]
    pub fn to_fixed(self) -> (u16, u16) {
        (to_fixed(self.x), to_fixed(self.y))
    }
}

fn to_fixed(value: f64) -> u16 {
    let scaled = (value * 65536.0).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(MAX_XY_FIXED) {
        MAX_XY_FIXED
    } else {
        scaled as u16
    }
}

fn gamma_expand(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn gamma_compress(linear: f64) -> u8 {
    let c = if linear <= 0.003_130_8 {
        12.92 * linear
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    };
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Convert RGB to CIE xy chromaticity (brightness is dropped)
#[must_use]
pub fn rgb_to_xy(rgb: Rgb) -> Xy {
    let r = gamma_expand(rgb.r);
    let g = gamma_expand(rgb.g);
    let b = gamma_expand(rgb.b);

    let x = r * 0.664_511 + g * 0.154_324 + b * 0.162_028;
    let y = r * 0.283_881 + g * 0.668_433 + b * 0.047_685;
    let z = r * 0.000_088 + g * 0.072_310 + b * 0.986_039;

    let sum = x + y + z;
    if sum == 0.0 {
        // Black has no chromaticity, fall back to the D65 white point
        return Xy {
            x: 0.3127,
            y: 0.3290,
        };
    }
    Xy {
        x: x / sum,
        y: y / sum,
    }
}

/// Convert CIE xy chromaticity to RGB at full brightness
#[must_use]
pub fn xy_to_rgb(xy: Xy) -> Rgb {
    if xy.y <= 0.0 {
        return Rgb::new(0, 0, 0);
    }

    let big_y = 1.0;
    let big_x = (big_y / xy.y) * xy.x;
    let big_z = (big_y / xy.y) * (1.0 - xy.x - xy.y);

    let mut r = big_x * 1.656_492 - big_y * 0.354_851 - big_z * 0.255_038;
    let mut g = -big_x * 0.707_196 + big_y * 1.655_397 + big_z * 0.036_152;
    let mut b = big_x * 0.051_713 - big_y * 0.121_364 + big_z * 1.011_530;

    r = r.max(0.0);
    g = g.max(0.0);
    b = b.max(0.0);

    let max = r.max(g).max(b);
    if max > 1.0 {
        r /= max;
        g /= max;
        b /= max;
    }

    Rgb::new(gamma_compress(r), gamma_compress(g), gamma_compress(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_has_high_x() {
        let xy = rgb_to_xy(Rgb::new(255, 0, 0));
        assert!(xy.x > 0.69 && xy.x < 0.71, "x = {}", xy.x);
        assert!(xy.y > 0.29 && xy.y < 0.31, "y = {}", xy.y);
    }

    #[test]
    fn red_survives_conversion() {
        let rgb = xy_to_rgb(rgb_to_xy(Rgb::new(255, 0, 0)));
        assert_eq!(rgb.r, 255);
        assert!(rgb.g <= 3 && rgb.b <= 3, "{rgb:?}");
    }

    #[test]
    fn white_stays_near_white() {
        let rgb = xy_to_rgb(rgb_to_xy(Rgb::new(255, 255, 255)));
        assert!(rgb.r > 240 && rgb.g > 240 && rgb.b > 240, "{rgb:?}");
    }

    #[test]
    fn black_maps_to_white_point() {
        let xy = rgb_to_xy(Rgb::new(0, 0, 0));
        assert!((xy.x - 0.3127).abs() < f64::EPSILON);
    }

    #[test]
    fn fixed_point_is_capped() {
        assert_eq!(Xy { x: 1.2, y: -0.1 }.to_fixed(), (MAX_XY_FIXED, 0));
        let (x, y) = Xy::from_fixed(0x8000, 0x4000).to_fixed();
        assert_eq!((x, y), (0x8000, 0x4000));
    }

    #[test]
    fn rgb_display_is_hex() {
        assert_eq!(Rgb::new(0xff, 0x08, 0x00).to_string(), "#ff0800");
    }
}
