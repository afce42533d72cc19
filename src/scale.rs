//! Frequency scale ticks aligned to the coordinate model

use crate::coords::ViewSnapshot;

/// Upper bound on ticks produced for one view
const MAX_TICKS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub frequency: f64,
    /// Position in visible pixels
    pub x: f64,
    pub label: String,
}

/// Ticks on a 1-2-5 sequence across the visible span, at least
/// `min_spacing_px` apart
pub fn ticks(view: &ViewSnapshot, min_spacing_px: f64) -> Vec<Tick> {
    let pph = view.pixels_per_hertz();
    if pph <= 0.0 || !min_spacing_px.is_finite() || min_spacing_px <= 0.0 {
        return Vec::new();
    }

    let step = tick_step(min_spacing_px / pph);
    let left = view.left_visible_frequency();
    let right = view.right_visible_frequency();
    let unit = Unit::for_frequency(left.abs().max(right.abs()));
    let decimals = (-(step / unit.scale).log10()).ceil().max(0.0) as usize;

    let first = (left / step).ceil() as i64;
    (first..)
        .map(|k| k as f64 * step)
        .take_while(|&frequency| frequency <= right)
        .take(MAX_TICKS)
        .map(|frequency| Tick {
            frequency,
            x: view.frequency_to_visible_pixel(frequency),
            label: format!("{:.*} {}", decimals, frequency / unit.scale, unit.suffix),
        })
        .collect()
}

/// Smallest 1-2-5 step not below `min_step`
pub fn tick_step(min_step: f64) -> f64 {
    if !min_step.is_finite() || min_step <= 0.0 {
        return 1.0;
    }

    let magnitude = 10f64.powf(min_step.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|&step| step >= min_step * (1.0 - 1e-9))
        .unwrap_or(10.0 * magnitude)
}

struct Unit {
    scale: f64,
    suffix: &'static str,
}

impl Unit {
    fn for_frequency(frequency: f64) -> Self {
        let (scale, suffix) = if frequency >= 1e9 {
            (1e9, "GHz")
        } else if frequency >= 1e6 {
            (1e6, "MHz")
        } else if frequency >= 1e3 {
            (1e3, "kHz")
        } else {
            (1.0, "Hz")
        };
        Self { scale, suffix }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::DerivedLayout;

    fn view(left: f64, pph: f64, width: f64) -> ViewSnapshot {
        ViewSnapshot {
            layout: DerivedLayout {
                left_frequency: left,
                pixels_per_hertz: pph,
                visible_pixel_width: width,
            },
            center_frequency: left + width / pph / 2.0,
            bandwidth: width / pph,
            zoom: 1.0,
            scroll: 0.0,
        }
    }

    #[test]
    fn test_tick_step_sequence() {
        assert_eq!(tick_step(0.7), 1.0);
        assert_eq!(tick_step(1.0), 1.0);
        assert_eq!(tick_step(1.5), 2.0);
        assert_eq!(tick_step(3.0), 5.0);
        assert_eq!(tick_step(160_000.0), 200_000.0);
        assert_eq!(tick_step(6_000.0), 10_000.0);
    }

    #[test]
    fn test_ticks_for_one_megahertz_span() {
        let ticks = ticks(&view(99.5e6, 5e-4, 500.0), 80.0);
        let frequencies: Vec<f64> = ticks.iter().map(|t| t.frequency).collect();
        assert_eq!(frequencies, vec![99.6e6, 99.8e6, 100.0e6, 100.2e6, 100.4e6]);

        assert_eq!(ticks[2].label, "100.0 MHz");
        assert!((ticks[2].x - 250.0).abs() < 1e-6);
        assert!(ticks.windows(2).all(|w| w[1].x - w[0].x >= 80.0));
    }

    #[test]
    fn test_ticks_follow_scroll() {
        let mut snapshot = view(99.5e6, 1e-3, 500.0);
        snapshot.zoom = 2.0;
        snapshot.scroll = 250.0;

        let ticks = ticks(&snapshot, 50.0);
        assert!(!ticks.is_empty());
        for tick in &ticks {
            assert!(tick.x >= 0.0 && tick.x <= 500.0);
            assert!((snapshot.frequency_at_pixel(tick.x) - tick.frequency).abs() < 1e-3);
        }
    }

    #[test]
    fn test_kilohertz_labels() {
        let ticks = ticks(&view(0.0, 0.01, 400.0), 100.0);
        assert!(ticks.len() >= 4);
        assert_eq!(ticks[0].label, "0 kHz");
        assert_eq!(ticks[1].label, "10 kHz");
        assert_eq!(ticks[3].label, "30 kHz");
    }

    #[test]
    fn test_degenerate_view_has_no_ticks() {
        assert!(ticks(&view(0.0, 0.0, 500.0), 50.0).is_empty());
        assert!(ticks(&view(0.0, 1.0, 500.0), 0.0).is_empty());
    }
}
