//! Instantaneous plot: averaged magnitude curve over the visible span

use super::gpu::GpuContext;
use super::gpu::plot::GpuPlot;
use super::raster::plot::RasterPlot;
use super::{BackendKind, DrawStatus, LevelRange, PlotStyle, RenderOutput, Size, SpectrumRenderer};
use crate::average::{AverageBuffer, AverageUpdate};
use crate::cell::Cell;
use crate::coords::ViewSnapshot;
use crate::frame::Frame;
use std::ops::Range;
use std::rc::Rc;

enum Backend {
    Gpu(GpuPlot),
    Raster(RasterPlot),
    Disposed,
}

pub struct PlotRenderer {
    average: AverageBuffer,
    averaging: Rc<dyn Cell<f32>>,
    levels: LevelRange,
    style: PlotStyle,
    backend: Backend,
}

impl PlotRenderer {
    /// `averaging` is read on every ingest, so it can be tuned live
    pub fn new(
        averaging: Rc<dyn Cell<f32>>,
        levels: LevelRange,
        style: PlotStyle,
        gpu: Option<Rc<GpuContext>>,
    ) -> Self {
        let mut renderer = Self {
            average: AverageBuffer::new(),
            averaging,
            levels,
            style,
            backend: Backend::Disposed,
        };
        renderer.reinitialize(gpu);
        renderer
    }

    pub fn average(&self) -> &AverageBuffer {
        &self.average
    }

    pub fn levels(&self) -> LevelRange {
        self.levels
    }

    pub fn set_levels(&mut self, levels: LevelRange) {
        self.levels = levels;
    }

    fn build_backend(&self, gpu: Option<Rc<GpuContext>>) -> Backend {
        let Some(context) = gpu else {
            return Backend::Raster(RasterPlot::new(self.style));
        };

        let built = GpuPlot::new(context, self.style).and_then(|mut plot| {
            if let Some(values) = self.average.values() {
                plot.upload(values)?;
            }
            Ok(plot)
        });

        match built {
            Ok(plot) => Backend::Gpu(plot),
            Err(e) => {
                tracing::warn!(error = %e, "GPU plot unavailable, using raster");
                Backend::Raster(RasterPlot::new(self.style))
            }
        }
    }
}

impl SpectrumRenderer for PlotRenderer {
    fn ingest(&mut self, frame: &Frame) {
        if matches!(self.backend, Backend::Disposed) {
            return;
        }

        let update = self.average.ingest(frame, self.averaging.get());
        if update == AverageUpdate::Skipped {
            return;
        }

        if let (Backend::Gpu(plot), Some(values)) = (&mut self.backend, self.average.values()) {
            if let Err(e) = plot.upload(values) {
                tracing::warn!(error = %e, "GPU plot upload failed, using raster");
                self.backend = Backend::Raster(RasterPlot::new(self.style));
            }
        }
    }

    fn draw(&mut self, view: &ViewSnapshot, size: Size) -> DrawStatus {
        match &mut self.backend {
            Backend::Raster(plot) => plot.draw(self.average.values(), view, self.levels, size),
            Backend::Gpu(plot) => plot.draw(self.average.bin_count(), view, self.levels, size),
            Backend::Disposed => DrawStatus::Idle,
        }
    }

    fn reinitialize(&mut self, gpu: Option<Rc<GpuContext>>) {
        // Old resources go before new ones are created
        self.backend = Backend::Disposed;
        self.backend = self.build_backend(gpu);
        tracing::debug!(backend = %self.backend(), "Plot renderer initialized");
    }

    fn backend(&self) -> BackendKind {
        match self.backend {
            Backend::Gpu(_) => BackendKind::Gpu,
            Backend::Raster(_) | Backend::Disposed => BackendKind::Raster,
        }
    }

    fn output(&self) -> RenderOutput<'_> {
        match &self.backend {
            Backend::Raster(plot) => plot.pixmap().map_or(RenderOutput::None, RenderOutput::Pixmap),
            Backend::Gpu(plot) => plot.texture().map_or(RenderOutput::None, RenderOutput::Texture),
            Backend::Disposed => RenderOutput::None,
        }
    }

    fn dispose(&mut self) {
        self.backend = Backend::Disposed;
    }
}

/// Frequency of bin `index` of a `len`-bin frame spanning the view's band
pub fn bin_frequency(view: &ViewSnapshot, index: usize, len: usize) -> f64 {
    let bin_width = view.bandwidth / len as f64;
    view.center_frequency - view.bandwidth / 2.0 + (index as f64 + 0.5) * bin_width
}

/// Bins that land within the visible width, plus one on either side
pub fn visible_bins(view: &ViewSnapshot, len: usize) -> Range<usize> {
    if len == 0 || view.bandwidth <= 0.0 || view.pixels_per_hertz() <= 0.0 {
        return 0..0;
    }

    let bin_width = view.bandwidth / len as f64;
    let data_left = view.center_frequency - view.bandwidth / 2.0;
    let to_bin = |frequency: f64| (frequency - data_left) / bin_width - 0.5;

    let first = to_bin(view.left_visible_frequency()).floor() - 1.0;
    let last = to_bin(view.right_visible_frequency()).ceil() + 1.0;
    if !first.is_finite() || !last.is_finite() || last < 0.0 || first >= len as f64 {
        return 0..0;
    }

    let first = first.max(0.0) as usize;
    let last = (last as usize).min(len - 1);
    first..last + 1
}
