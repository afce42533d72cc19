//! tiny-skia rendering of the waterfall
//!
//! Rows are painted newest at the top. Each row is sampled relative to the
//! center frequency it was captured at, so history stays aligned with the
//! current view after a retune. When nothing but new rows changed since the
//! previous draw, the existing image is shifted down and only the new rows
//! are painted.

use super::ensure_pixmap;
use crate::coords::ViewSnapshot;
use crate::gradient::{ColorGradient, UNKNOWN_COLOR};
use crate::history::{HistoryRingBuffer, HistorySlot};
use crate::render::{DrawStatus, LevelRange, Size};
use tiny_skia::{Pixmap, PremultipliedColorU8};

/// How the last draw was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepaintKind {
    None,
    /// Existing rows shifted, `rows` new rows painted
    Incremental { rows: usize },
    Full,
}

/// Everything that positions rows horizontally or vertically
#[derive(Debug, Clone, Copy, PartialEq)]
struct LayoutKey {
    center_frequency: f64,
    bandwidth: f64,
    left_visible: f64,
    pixels_per_hertz: f64,
    levels: (f32, f32),
    size: Size,
}

pub struct RasterWaterfall {
    pixmap: Option<Pixmap>,
    gradient: ColorGradient,
    drawn: Option<(LayoutKey, u64, u64)>,
    last_repaint: RepaintKind,
}

impl RasterWaterfall {
    pub fn new(gradient: ColorGradient) -> Self {
        Self {
            pixmap: None,
            gradient,
            drawn: None,
            last_repaint: RepaintKind::None,
        }
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    pub fn last_repaint(&self) -> RepaintKind {
        self.last_repaint
    }

    /// Height in rows of the image drawn into a target `height` pixels tall
    pub fn image_height(history: &HistoryRingBuffer, height: u32) -> u32 {
        height.min(history.capacity() as u32)
    }

    pub fn draw(
        &mut self,
        history: &HistoryRingBuffer,
        view: &ViewSnapshot,
        levels: LevelRange,
        size: Size,
    ) -> DrawStatus {
        let size = Size::new(size.width, Self::image_height(history, size.height));
        if size.is_empty() {
            self.last_repaint = RepaintKind::None;
            return DrawStatus::Idle;
        }

        let key = LayoutKey {
            center_frequency: view.center_frequency,
            bandwidth: view.bandwidth,
            left_visible: view.left_visible_frequency(),
            pixels_per_hertz: view.pixels_per_hertz(),
            levels: (levels.min_db, levels.max_db),
            size,
        };

        let had_image = self
            .pixmap
            .as_ref()
            .is_some_and(|p| p.width() == size.width && p.height() == size.height);
        let pending = match self.drawn {
            Some((drawn_key, epoch, written))
                if had_image && drawn_key == key && epoch == history.epoch() =>
            {
                Some(history.written().saturating_sub(written) as usize)
            }
            _ => None,
        };

        let gradient = &self.gradient;
        let Some(pixmap) = ensure_pixmap(&mut self.pixmap, size.width, size.height) else {
            return DrawStatus::Idle;
        };

        let painter = RowPainter {
            view,
            levels,
            gradient,
        };

        self.last_repaint = match pending {
            Some(0) => RepaintKind::Incremental { rows: 0 },
            Some(rows) if rows < size.height as usize => {
                shift_down(pixmap, rows);
                for age in 0..rows {
                    painter.paint(pixmap, age, history.row(age));
                }
                RepaintKind::Incremental { rows }
            }
            _ => {
                for age in 0..size.height as usize {
                    painter.paint(pixmap, age, history.row(age));
                }
                RepaintKind::Full
            }
        };

        self.drawn = Some((key, history.epoch(), history.written()));
        DrawStatus::Drawn
    }
}

struct RowPainter<'a> {
    view: &'a ViewSnapshot,
    levels: LevelRange,
    gradient: &'a ColorGradient,
}

impl RowPainter<'_> {
    fn paint(&self, pixmap: &mut Pixmap, y: usize, row: Option<HistorySlot<'_>>) {
        let width = pixmap.width() as usize;
        let unknown = premultiplied(UNKNOWN_COLOR);
        let pixels = &mut pixmap.pixels_mut()[y * width..(y + 1) * width];

        let Some(row) = row else {
            pixels.fill(unknown);
            return;
        };

        for (x, pixel) in pixels.iter_mut().enumerate() {
            *pixel = match row_bin(self.view, &row, x as f64 + 0.5) {
                Some(bin) => premultiplied(self.gradient.color(self.levels.normalize(row.magnitudes[bin]))),
                None => unknown,
            };
        }
    }
}

/// Bin of `row` under visible pixel position `x`, sampled against the
/// frequency the row was captured at. Rows with an unknown capture frequency
/// are taken to be at the current view center.
pub fn row_bin(view: &ViewSnapshot, row: &HistorySlot<'_>, x: f64) -> Option<usize> {
    let bins = row.magnitudes.len();
    if bins == 0 || view.bandwidth <= 0.0 || view.pixels_per_hertz() <= 0.0 {
        return None;
    }

    let captured = if row.center_frequency.is_nan() {
        view.center_frequency
    } else {
        row.center_frequency
    };
    let row_left = captured - view.bandwidth / 2.0;
    let position = (view.frequency_at_pixel(x) - row_left) / view.bandwidth * bins as f64;

    if position.is_finite() && position >= 0.0 && position < bins as f64 {
        Some(position as usize)
    } else {
        None
    }
}

fn shift_down(pixmap: &mut Pixmap, rows: usize) {
    let width = pixmap.width() as usize;
    let pixels = pixmap.pixels_mut();
    let len = pixels.len();
    pixels.copy_within(0..len - rows * width, rows * width);
}

fn premultiplied([r, g, b, a]: [u8; 4]) -> PremultipliedColorU8 {
    tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::DerivedLayout;
    use crate::frame::Frame;
    use crate::gradient::Palette;

    const BANDWIDTH: f64 = 1e6;

    fn view(center: f64, width: f64) -> ViewSnapshot {
        ViewSnapshot {
            layout: DerivedLayout {
                left_frequency: center - BANDWIDTH / 2.0,
                pixels_per_hertz: width / BANDWIDTH,
                visible_pixel_width: width,
            },
            center_frequency: center,
            bandwidth: BANDWIDTH,
            zoom: 1.0,
            scroll: 0.0,
        }
    }

    /// One hot bin on a quiet floor
    fn spike(center: f64, bins: usize, hot: usize) -> Frame {
        let mut values = vec![-130.0f32; bins];
        values[hot] = -20.0;
        Frame::new(center, values)
    }

    fn hot_columns(pixmap: &Pixmap, y: u32, hot: [u8; 4]) -> Vec<u32> {
        (0..pixmap.width())
            .filter(|&x| {
                let p = pixmap.pixel(x, y).unwrap();
                [p.red(), p.green(), p.blue(), p.alpha()] == hot
            })
            .collect()
    }

    #[test]
    fn test_drift_compensation_offsets_rows() {
        let gradient = Palette::Grayscale.gradient();
        let hot = gradient.color(1.0);
        let levels = LevelRange::default();
        let f2 = 100e6;

        // One bin per pixel at 500 px over 1 MHz, so 2 kHz per pixel
        for (f1, expected_shift) in [(100e6, 0i64), (100.02e6, 10), (99.9e6, -50)] {
            let mut history = HistoryRingBuffer::new(4);
            history.push(&spike(f1, 500, 250));

            let mut waterfall = RasterWaterfall::new(gradient.clone());
            let view = view(f2, 500.0);
            waterfall.draw(&history, &view, levels, Size::new(500, 4));

            let columns = hot_columns(waterfall.pixmap().unwrap(), 0, hot);
            assert_eq!(columns.len(), 1, "row captured at {}", f1);
            let expected_offset = (f1 - f2) * view.pixels_per_hertz();
            assert_eq!(columns[0] as i64, 250 + expected_shift);
            assert!((columns[0] as f64 - 250.0 - expected_offset).abs() < 1e-6);
        }
    }

    #[test]
    fn test_out_of_range_pixels_are_unknown() {
        let gradient = Palette::Grayscale.gradient();
        let mut history = HistoryRingBuffer::new(2);
        history.push(&Frame::new(100.2e6, vec![-75.0f32; 100]));

        let mut waterfall = RasterWaterfall::new(gradient);
        waterfall.draw(&history, &view(100e6, 100.0), LevelRange::default(), Size::new(100, 2));
        let pixmap = waterfall.pixmap().unwrap();

        let at = |x, y| {
            let p = pixmap.pixel(x, y).unwrap();
            [p.red(), p.green(), p.blue(), p.alpha()]
        };
        // Row shifted right by 200 kHz = 20 px; the left 20 px have no data
        assert_eq!(at(5, 0), UNKNOWN_COLOR);
        assert_ne!(at(50, 0), UNKNOWN_COLOR);
        // Second row was never written
        assert_eq!(at(50, 1), UNKNOWN_COLOR);
    }

    #[test]
    fn test_incremental_matches_full_repaint() {
        let gradient = Palette::Classic.gradient();
        let levels = LevelRange::default();
        let view = view(100e6, 64.0);
        let size = Size::new(64, 16);

        let mut history = HistoryRingBuffer::new(24);
        let mut incremental = RasterWaterfall::new(gradient.clone());

        for i in 0..40usize {
            history.push(&spike(100e6 + (i % 3) as f64 * 5e3, 64, (i * 7) % 64));
            if i % 3 != 0 {
                incremental.draw(&history, &view, levels, size);
            }
        }
        incremental.draw(&history, &view, levels, size);
        assert_eq!(incremental.last_repaint(), RepaintKind::Incremental { rows: 1 });

        let mut full = RasterWaterfall::new(gradient);
        full.draw(&history, &view, levels, size);
        assert_eq!(full.last_repaint(), RepaintKind::Full);

        assert_eq!(
            incremental.pixmap().unwrap().data(),
            full.pixmap().unwrap().data()
        );
    }

    #[test]
    fn test_layout_change_forces_full_repaint() {
        let gradient = Palette::Classic.gradient();
        let levels = LevelRange::default();
        let mut history = HistoryRingBuffer::new(8);
        let mut waterfall = RasterWaterfall::new(gradient);

        history.push(&spike(100e6, 32, 3));
        waterfall.draw(&history, &view(100e6, 32.0), levels, Size::new(32, 8));
        assert_eq!(waterfall.last_repaint(), RepaintKind::Full);

        history.push(&spike(100e6, 32, 4));
        waterfall.draw(&history, &view(100e6, 32.0), levels, Size::new(32, 8));
        assert_eq!(waterfall.last_repaint(), RepaintKind::Incremental { rows: 1 });

        history.push(&spike(100e6, 32, 5));
        waterfall.draw(&history, &view(100.1e6, 32.0), levels, Size::new(32, 8));
        assert_eq!(waterfall.last_repaint(), RepaintKind::Full);

        // Bin count change discards history and repaints
        history.push(&spike(100.1e6, 16, 5));
        waterfall.draw(&history, &view(100.1e6, 32.0), levels, Size::new(32, 8));
        assert_eq!(waterfall.last_repaint(), RepaintKind::Full);
    }

    #[test]
    fn test_height_is_bounded_by_history() {
        let mut history = HistoryRingBuffer::new(10);
        history.push(&spike(1e6, 8, 0));
        let mut waterfall = RasterWaterfall::new(Palette::Classic.gradient());
        waterfall.draw(&history, &view(1e6, 40.0), LevelRange::default(), Size::new(40, 300));
        assert_eq!(waterfall.pixmap().map(|p| p.height()), Some(10));
    }
}
