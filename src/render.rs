//! Spectrum renderers and backend selection
//!
//! Both renderers own their data model (average buffer, history ring buffer)
//! and one backend, GPU or raster, chosen when the renderer is built. Swapping
//! backends rebuilds the backend from the data model; the data itself is kept.

pub mod gpu;
pub mod plot;
pub mod raster;
pub mod waterfall;

use crate::coords::ViewSnapshot;
use crate::frame::Frame;
use gpu::GpuContext;
use std::rc::Rc;

pub use plot::PlotRenderer;
pub use waterfall::WaterfallRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gpu,
    Raster,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Gpu => write!(f, "gpu"),
            BackendKind::Raster => write!(f, "raster"),
        }
    }
}

/// GPU only when it is both wanted and obtainable
pub fn select_backend(prefer_gpu: bool, gpu_available: bool) -> BackendKind {
    if prefer_gpu && gpu_available {
        BackendKind::Gpu
    } else {
        BackendKind::Raster
    }
}

/// Pixel size of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Fixed power range mapped onto the vertical axis or the gradient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl LevelRange {
    pub fn new(min_db: f32, max_db: f32) -> Self {
        Self { min_db, max_db }
    }

    /// Map a level to [0, 1]. Non-finite input and an empty range give 0.
    pub fn normalize(&self, db: f32) -> f32 {
        let span = self.max_db - self.min_db;
        if !db.is_finite() || !span.is_finite() || span <= 0.0 {
            return 0.0;
        }
        ((db - self.min_db) / span).clamp(0.0, 1.0)
    }
}

impl Default for LevelRange {
    fn default() -> Self {
        Self::new(-130.0, -20.0)
    }
}

/// Colors of the instantaneous plot, RGBA
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotStyle {
    pub background: [u8; 4],
    pub fill: [u8; 4],
    pub stroke: [u8; 4],
    pub stroke_width: f32,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            background: [0x00, 0x00, 0x00, 0xff],
            fill: [0x1f, 0x4e, 0x79, 0xff],
            stroke: [0x7f, 0xd4, 0xff, 0xff],
            stroke_width: 2.0,
        }
    }
}

/// What a draw call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStatus {
    /// Nothing to draw yet (no data or empty target)
    Idle,
    Drawn,
    /// The GPU device went away; the backend must be rebuilt
    DeviceLost,
}

/// Where the last draw ended up
pub enum RenderOutput<'a> {
    None,
    Pixmap(&'a tiny_skia::Pixmap),
    Texture(&'a wgpu::Texture),
}

/// Contract shared by the plot and waterfall renderers
pub trait SpectrumRenderer {
    /// Take in one frame. Never blocks.
    fn ingest(&mut self, frame: &Frame);

    /// Render the current data for `view` into a target of `size`
    fn draw(&mut self, view: &ViewSnapshot, size: Size) -> DrawStatus;

    /// Tear down the current backend and build a new one, on the GPU when a
    /// context is given, on the raster path otherwise
    fn reinitialize(&mut self, gpu: Option<Rc<GpuContext>>);

    fn backend(&self) -> BackendKind;

    fn output(&self) -> RenderOutput<'_>;

    /// Release backend resources; the renderer draws nothing afterwards
    fn dispose(&mut self);
}
