//! tiny-skia rendering of the instantaneous plot

use super::{color, ensure_pixmap};
use crate::coords::ViewSnapshot;
use crate::render::plot::{bin_frequency, visible_bins};
use crate::render::{DrawStatus, LevelRange, PlotStyle, Size};
use tiny_skia::*;

pub struct RasterPlot {
    pixmap: Option<Pixmap>,
    style: PlotStyle,
}

impl RasterPlot {
    pub fn new(style: PlotStyle) -> Self {
        Self { pixmap: None, style }
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    /// Draw the stroke, then the fill over it
    pub fn draw(
        &mut self,
        values: Option<&[f32]>,
        view: &ViewSnapshot,
        levels: LevelRange,
        size: Size,
    ) -> DrawStatus {
        if size.is_empty() {
            return DrawStatus::Idle;
        }
        let style = self.style;
        let Some(pixmap) = ensure_pixmap(&mut self.pixmap, size.width, size.height) else {
            return DrawStatus::Idle;
        };
        pixmap.fill(color(style.background));

        let points = match values {
            Some(values) if !values.is_empty() => curve_points(values, view, levels, size),
            _ => return DrawStatus::Idle,
        };
        if points.is_empty() {
            return DrawStatus::Drawn;
        }

        let bottom = size.height as f32;

        if let Some(path) = polyline(&points) {
            let mut paint = Paint::default();
            paint.set_color(color(style.stroke));
            paint.anti_alias = true;
            let stroke = Stroke {
                width: style.stroke_width,
                line_join: LineJoin::Round,
                ..Default::default()
            };
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }

        if let Some(path) = area(&points, bottom) {
            let mut paint = Paint::default();
            paint.set_color(color(style.fill));
            paint.anti_alias = true;
            pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }

        DrawStatus::Drawn
    }
}

/// Curve vertices in target pixels for the bins near the visible span. A
/// single bin becomes a flat segment one bin wide.
pub(crate) fn curve_points(
    values: &[f32],
    view: &ViewSnapshot,
    levels: LevelRange,
    size: Size,
) -> Vec<(f32, f32)> {
    let height = size.height as f32;
    let to_y = |db: f32| (1.0 - levels.normalize(db)) * height;

    let mut points: Vec<(f32, f32)> = visible_bins(view, values.len())
        .map(|i| {
            let x = view.frequency_to_visible_pixel(bin_frequency(view, i, values.len()));
            (x as f32, to_y(values[i]))
        })
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();

    if let &[(x, y)] = points.as_slice() {
        let half = (view.frequency_to_pixel_length(view.bandwidth / values.len() as f64) / 2.0) as f32;
        points = vec![(x - half, y), (x + half, y)];
    }
    points
}

fn polyline(points: &[(f32, f32)]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.0, first.1);
    for &(x, y) in rest {
        pb.line_to(x, y);
    }
    pb.finish()
}

fn area(points: &[(f32, f32)], bottom: f32) -> Option<Path> {
    let first = points.first()?;
    let last = points.last()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.0, bottom);
    for &(x, y) in points {
        pb.line_to(x, y);
    }
    pb.line_to(last.0, bottom);
    pb.close();
    pb.finish()
}
