//! Waterfall: scrolling history of frames with drift compensation

use super::gpu::GpuContext;
use super::gpu::waterfall::GpuWaterfall;
use super::raster::waterfall::RasterWaterfall;
use super::{BackendKind, DrawStatus, LevelRange, RenderOutput, Size, SpectrumRenderer};
use crate::coords::ViewSnapshot;
use crate::frame::Frame;
use crate::gradient::ColorGradient;
use crate::history::{HistoryRingBuffer, HistoryWrite};
use std::rc::Rc;

enum Backend {
    Gpu(GpuWaterfall),
    Raster(RasterWaterfall),
    Disposed,
}

pub struct WaterfallRenderer {
    history: HistoryRingBuffer,
    levels: LevelRange,
    gradient: ColorGradient,
    backend: Backend,
}

impl WaterfallRenderer {
    pub fn new(
        history_count: usize,
        levels: LevelRange,
        gradient: ColorGradient,
        gpu: Option<Rc<GpuContext>>,
    ) -> Self {
        let mut renderer = Self {
            history: HistoryRingBuffer::new(history_count),
            levels,
            gradient,
            backend: Backend::Disposed,
        };
        renderer.reinitialize(gpu);
        renderer
    }

    pub fn history(&self) -> &HistoryRingBuffer {
        &self.history
    }

    pub fn levels(&self) -> LevelRange {
        self.levels
    }

    pub fn set_levels(&mut self, levels: LevelRange) {
        self.levels = levels;
    }

    /// The raster backend's image, when that backend is active
    pub fn raster(&self) -> Option<&RasterWaterfall> {
        match &self.backend {
            Backend::Raster(raster) => Some(raster),
            _ => None,
        }
    }

    fn build_backend(&self, gpu: Option<Rc<GpuContext>>) -> Backend {
        let Some(context) = gpu else {
            return Backend::Raster(RasterWaterfall::new(self.gradient.clone()));
        };

        let built = GpuWaterfall::new(context, &self.gradient).and_then(|mut waterfall| {
            waterfall.upload_history(&self.history)?;
            Ok(waterfall)
        });

        match built {
            Ok(waterfall) => Backend::Gpu(waterfall),
            Err(e) => {
                tracing::warn!(error = %e, "GPU waterfall unavailable, using raster");
                Backend::Raster(RasterWaterfall::new(self.gradient.clone()))
            }
        }
    }
}

impl SpectrumRenderer for WaterfallRenderer {
    fn ingest(&mut self, frame: &Frame) {
        if matches!(self.backend, Backend::Disposed) {
            return;
        }

        let HistoryWrite::Stored { slot, reallocated } = self.history.push(frame) else {
            return;
        };

        if let Backend::Gpu(waterfall) = &mut self.backend {
            let uploaded = if reallocated {
                waterfall.upload_history(&self.history)
            } else {
                waterfall.upload_row(&self.history, slot)
            };
            if let Err(e) = uploaded {
                tracing::warn!(error = %e, "GPU waterfall upload failed, using raster");
                self.backend = Backend::Raster(RasterWaterfall::new(self.gradient.clone()));
            }
        }
    }

    fn draw(&mut self, view: &ViewSnapshot, size: Size) -> DrawStatus {
        match &mut self.backend {
            Backend::Raster(waterfall) => waterfall.draw(&self.history, view, self.levels, size),
            Backend::Gpu(waterfall) => waterfall.draw(&self.history, view, self.levels, size),
            Backend::Disposed => DrawStatus::Idle,
        }
    }

    fn reinitialize(&mut self, gpu: Option<Rc<GpuContext>>) {
        self.backend = Backend::Disposed;
        self.backend = self.build_backend(gpu);
        tracing::debug!(
            backend = %self.backend(),
            rows = self.history.len(),
            "Waterfall renderer initialized"
        );
    }

    fn backend(&self) -> BackendKind {
        match self.backend {
            Backend::Gpu(_) => BackendKind::Gpu,
            Backend::Raster(_) | Backend::Disposed => BackendKind::Raster,
        }
    }

    fn output(&self) -> RenderOutput<'_> {
        match &self.backend {
            Backend::Raster(waterfall) => waterfall.pixmap().map_or(RenderOutput::None, RenderOutput::Pixmap),
            Backend::Gpu(waterfall) => waterfall.texture().map_or(RenderOutput::None, RenderOutput::Texture),
            Backend::Disposed => RenderOutput::None,
        }
    }

    fn dispose(&mut self) {
        self.backend = Backend::Disposed;
    }
}
