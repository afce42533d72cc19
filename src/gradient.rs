//! Waterfall color gradients
//!
//! A gradient is a list of evenly spaced RGB control points, linearly
//! interpolated into a fixed 256-entry lookup table. Both backends color from
//! the same table: the raster path indexes it directly, the GPU path uploads it
//! as a texture.

use serde::{Deserialize, Serialize};

pub const LUT_SIZE: usize = 256;

/// Color of waterfall pixels with no data behind them
pub const UNKNOWN_COLOR: [u8; 4] = [0x30, 0x30, 0x30, 0xff];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    /// Black through blue, cyan and yellow to red
    #[default]
    Classic,
    Viridis,
    Grayscale,
}

impl Palette {
    fn control_points(&self) -> &'static [[u8; 3]] {
        match self {
            Palette::Classic => &[
                [0, 0, 0],
                [0, 0, 255],
                [0, 200, 255],
                [255, 255, 0],
                [255, 0, 0],
            ],
            Palette::Viridis => &[
                [68, 1, 84],
                [59, 82, 139],
                [33, 145, 140],
                [94, 201, 98],
                [253, 231, 37],
            ],
            Palette::Grayscale => &[[0, 0, 0], [255, 255, 255]],
        }
    }

    pub fn gradient(&self) -> ColorGradient {
        ColorGradient::new(self.control_points())
    }
}

#[derive(Clone, PartialEq)]
pub struct ColorGradient {
    lut: Vec<[u8; 4]>,
}

impl std::fmt::Debug for ColorGradient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorGradient")
            .field("first", &self.lut[0])
            .field("last", &self.lut[LUT_SIZE - 1])
            .finish()
    }
}

impl ColorGradient {
    /// Build the lookup table from evenly spaced control points. Fewer than
    /// two points yield a flat (or black) gradient.
    pub fn new(points: &[[u8; 3]]) -> Self {
        let lut = (0..LUT_SIZE)
            .map(|i| {
                let t = i as f32 / (LUT_SIZE - 1) as f32;
                let [r, g, b] = interpolate(points, t);
                [r, g, b, 0xff]
            })
            .collect();
        Self { lut }
    }

    /// Color for a normalized level in [0, 1]. NaN maps to the bottom.
    pub fn color(&self, t: f32) -> [u8; 4] {
        self.lut[Self::index(t)]
    }

    pub fn index(t: f32) -> usize {
        if t.is_nan() {
            return 0;
        }
        (t.clamp(0.0, 1.0) * (LUT_SIZE - 1) as f32).round() as usize
    }

    pub fn lut(&self) -> &[[u8; 4]] {
        &self.lut
    }
}

impl Default for ColorGradient {
    fn default() -> Self {
        Palette::default().gradient()
    }
}

fn interpolate(points: &[[u8; 3]], t: f32) -> [u8; 3] {
    match points {
        [] => [0, 0, 0],
        [only] => *only,
        _ => {
            let segments = (points.len() - 1) as f32;
            let position = t * segments;
            let index = (position.floor() as usize).min(points.len() - 2);
            let local = position - index as f32;
            let (from, to) = (points[index], points[index + 1]);

            let mut out = [0u8; 3];
            for channel in 0..3 {
                let a = from[channel] as f32;
                let b = to[channel] as f32;
                out[channel] = (a + (b - a) * local).round().clamp(0.0, 255.0) as u8;
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_match_control_points() {
        let gradient = Palette::Classic.gradient();
        assert_eq!(gradient.color(0.0), [0, 0, 0, 255]);
        assert_eq!(gradient.color(1.0), [255, 0, 0, 255]);
        assert_eq!(gradient.lut().len(), LUT_SIZE);
    }

    #[test]
    fn test_grayscale_is_linear() {
        let gradient = Palette::Grayscale.gradient();
        for (i, color) in gradient.lut().iter().enumerate() {
            assert_eq!(color[0] as usize, i);
            assert_eq!(color[0], color[1]);
            assert_eq!(color[1], color[2]);
        }
    }

    #[test]
    fn test_out_of_range_levels_clamp() {
        let gradient = Palette::Viridis.gradient();
        assert_eq!(gradient.color(-3.0), gradient.color(0.0));
        assert_eq!(gradient.color(9.0), gradient.color(1.0));
        assert_eq!(gradient.color(f32::NAN), gradient.color(0.0));
    }

    #[test]
    fn test_degenerate_control_points() {
        assert_eq!(ColorGradient::new(&[]).color(0.5), [0, 0, 0, 255]);
        assert_eq!(ColorGradient::new(&[[9, 8, 7]]).color(0.7), [9, 8, 7, 255]);
    }

    #[test]
    fn test_palette_names() {
        let json = serde_json::to_string(&Palette::Viridis).unwrap();
        assert_eq!(json, "\"viridis\"");
        let palette: Palette = serde_json::from_str("\"classic\"").unwrap();
        assert_eq!(palette, Palette::Classic);
    }
}
