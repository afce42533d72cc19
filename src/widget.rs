//! Spectrum display widget
//!
//! Stacks the instantaneous plot above the waterfall in one viewport. Frames
//! from the source are ingested into both renderers and a redraw is enqueued
//! with the scheduler, so bursts of frames collapse into one draw per tick.
//! Zoom and scroll handlers redraw synchronously.

use crate::cell::{Cell, SubscriptionId};
use crate::config::DisplayConfig;
use crate::coords::{CoordinateInputs, CoordinateModel, Viewport};
use crate::frame::{Frame, FrameSource};
use crate::render::gpu::{GpuContext, GpuProvider};
use crate::render::{
    BackendKind, DrawStatus, LevelRange, PlotRenderer, PlotStyle, Size, SpectrumRenderer,
    WaterfallRenderer, select_backend,
};
use crate::scheduler::{Scheduler, Task};
use crate::storage::ViewPersistence;
use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

/// Longest wait, in redraws, between attempts to get a GPU back after a loss
const MAX_RESTORE_BACKOFF: u32 = 64;

/// Everything the host hands the widget
pub struct DisplayInputs {
    pub bandwidth: Rc<dyn Cell<f64>>,
    pub center_frequency: Rc<dyn Cell<f64>>,
    pub averaging: Rc<dyn Cell<f32>>,
    pub prefer_gpu: Rc<dyn Cell<bool>>,
    /// Fraction of the height given to the plot
    pub split_ratio: Rc<dyn Cell<f32>>,
    pub scheduler: Rc<dyn Scheduler>,
    pub persistence: Box<dyn ViewPersistence>,
    pub frames: Rc<dyn FrameSource>,
    pub viewport: Rc<dyn Viewport>,
    pub gpu: Option<Rc<dyn GpuProvider>>,
    pub config: DisplayConfig,
}

/// Pixel sizes of the two panes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneLayout {
    pub plot: Size,
    pub waterfall: Size,
}

impl PaneLayout {
    /// Split `viewport` vertically, `ratio` of the height going to the plot.
    /// A non-finite ratio splits evenly.
    pub fn split(viewport: Size, ratio: f32) -> Self {
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.5 };
        let plot_height = ((viewport.height as f32 * ratio).round() as u32).min(viewport.height);
        Self {
            plot: Size::new(viewport.width, plot_height),
            waterfall: Size::new(viewport.width, viewport.height - plot_height),
        }
    }
}

pub struct SpectrumDisplay {
    coords: Rc<CoordinateModel>,
    plot: RefCell<PlotRenderer>,
    waterfall: RefCell<WaterfallRenderer>,
    scheduler: Rc<dyn Scheduler>,
    frames: Rc<dyn FrameSource>,
    viewport: Rc<dyn Viewport>,
    split_ratio: Rc<dyn Cell<f32>>,
    prefer_gpu: Rc<dyn Cell<bool>>,
    gpu_provider: Option<Rc<dyn GpuProvider>>,
    gpu: RefCell<Option<Rc<GpuContext>>>,
    redraw: Task,
    /// Attempts to reacquire a GPU after a device loss
    restore: Task,
    restore_pending: std::cell::Cell<bool>,
    restore_backoff: std::cell::Cell<u32>,
    redraws_until_restore: std::cell::Cell<u32>,
    frame_subscription: std::cell::Cell<Option<SubscriptionId>>,
    preference_subscription: std::cell::Cell<Option<SubscriptionId>>,
    layout: std::cell::Cell<PaneLayout>,
    disposed: std::cell::Cell<bool>,
}

impl SpectrumDisplay {
    pub fn new(inputs: DisplayInputs) -> Rc<Self> {
        let config = inputs.config.validated();
        let levels = LevelRange::new(config.min_level_db, config.max_level_db);

        let gpu = Self::acquire_gpu(inputs.prefer_gpu.get(), inputs.gpu.as_deref());
        tracing::info!(
            backend = %select_backend(inputs.prefer_gpu.get(), gpu.is_some()),
            history = config.history_count,
            "Creating spectrum display"
        );

        let coords = CoordinateModel::new(
            CoordinateInputs {
                bandwidth: inputs.bandwidth,
                center_frequency: inputs.center_frequency,
                viewport: Rc::clone(&inputs.viewport),
            },
            Rc::clone(&inputs.scheduler),
            inputs.persistence,
            config.zoom_sensitivity,
        );

        let plot = PlotRenderer::new(inputs.averaging, levels, PlotStyle::default(), gpu.clone());
        let waterfall = WaterfallRenderer::new(config.history_count, levels, config.palette.gradient(), gpu.clone());

        let display = Rc::new_cyclic(|this: &Weak<Self>| {
            let weak = this.clone();
            let redraw = Task::new(move || {
                if let Some(display) = weak.upgrade() {
                    display.redraw();
                }
            });
            let weak = this.clone();
            let restore = Task::new(move || {
                if let Some(display) = weak.upgrade() {
                    display.try_restore_gpu();
                }
            });

            Self {
                coords,
                plot: RefCell::new(plot),
                waterfall: RefCell::new(waterfall),
                scheduler: inputs.scheduler,
                frames: inputs.frames,
                viewport: inputs.viewport,
                split_ratio: inputs.split_ratio,
                prefer_gpu: inputs.prefer_gpu,
                gpu_provider: inputs.gpu,
                gpu: RefCell::new(gpu),
                redraw,
                restore,
                restore_pending: std::cell::Cell::new(false),
                restore_backoff: std::cell::Cell::new(1),
                redraws_until_restore: std::cell::Cell::new(0),
                frame_subscription: std::cell::Cell::new(None),
                preference_subscription: std::cell::Cell::new(None),
                layout: std::cell::Cell::new(PaneLayout::split(Size::default(), config.split_ratio)),
                disposed: std::cell::Cell::new(false),
            }
        });

        let weak = Rc::downgrade(&display);
        let id = display.frames.subscribe(Box::new(move |frame: &Frame| {
            if let Some(display) = weak.upgrade() {
                display.ingest(frame);
            }
        }));
        display.frame_subscription.set(Some(id));

        let weak = Rc::downgrade(&display);
        let id = display.prefer_gpu.subscribe(Box::new(move |prefer: &bool| {
            if let Some(display) = weak.upgrade() {
                display.switch_backend(*prefer);
            }
        }));
        display.preference_subscription.set(Some(id));

        display.watch_layout();
        display.scheduler.enqueue(&display.redraw);
        display
    }

    fn acquire_gpu(prefer_gpu: bool, provider: Option<&dyn GpuProvider>) -> Option<Rc<GpuContext>> {
        if !prefer_gpu {
            return None;
        }
        provider.and_then(|provider| provider.acquire())
    }

    /// Redraw after every layout change. The listener is one-shot, so it
    /// registers itself again each time it fires.
    fn watch_layout(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.coords.listen(Box::new(move || {
            if let Some(display) = weak.upgrade() {
                if display.disposed.get() {
                    return;
                }
                display.scheduler.enqueue(&display.redraw);
                display.watch_layout();
            }
        }));
    }

    fn ingest(&self, frame: &Frame) {
        if self.disposed.get() {
            return;
        }
        self.plot.borrow_mut().ingest(frame);
        self.waterfall.borrow_mut().ingest(frame);
        if !frame.is_empty() {
            self.coords.set_bin_count(frame.bin_count());
        }
        self.scheduler.enqueue(&self.redraw);
    }

    /// Draw both panes at the current layout. Runs from the scheduler.
    fn redraw(&self) {
        if self.disposed.get() {
            return;
        }

        let layout = PaneLayout::split(
            Size::new(self.viewport.width(), self.viewport.height()),
            self.split_ratio.get(),
        );
        self.layout.set(layout);
        let view = self.coords.snapshot();

        let plot = self.plot.borrow_mut().draw(&view, layout.plot);
        let waterfall = self.waterfall.borrow_mut().draw(&view, layout.waterfall);

        if plot == DrawStatus::DeviceLost || waterfall == DrawStatus::DeviceLost {
            self.recover_from_device_loss();
        }
        self.schedule_restore();
    }

    /// Drop every GPU resource and continue on the raster backend with the
    /// buffered data. Getting a GPU back is left to the restore task so the
    /// draw path never waits on a provider.
    fn recover_from_device_loss(&self) {
        tracing::warn!("GPU device lost, falling back to raster");
        self.plot.borrow_mut().dispose();
        self.waterfall.borrow_mut().dispose();
        self.gpu.replace(None);
        self.reinitialize(None);

        if self.prefer_gpu.get() && self.gpu_provider.is_some() {
            self.restore_pending.set(true);
            self.restore_backoff.set(1);
            self.redraws_until_restore.set(0);
            self.scheduler.enqueue(&self.restore);
        }
        self.scheduler.enqueue(&self.redraw);
    }

    /// Count down redraws while a restore is pending, then queue an attempt
    fn schedule_restore(&self) {
        if !self.restore_pending.get() {
            return;
        }
        match self.redraws_until_restore.get() {
            0 => self.scheduler.enqueue(&self.restore),
            n => self.redraws_until_restore.set(n - 1),
        }
    }

    fn try_restore_gpu(&self) {
        if self.disposed.get() || !self.restore_pending.get() {
            return;
        }
        if !self.prefer_gpu.get() || self.backend() == BackendKind::Gpu {
            self.restore_pending.set(false);
            return;
        }

        match Self::acquire_gpu(true, self.gpu_provider.as_deref()) {
            Some(gpu) => {
                self.restore_pending.set(false);
                self.reinitialize(Some(gpu));
                self.scheduler.enqueue(&self.redraw);
            }
            None => {
                let backoff = (self.restore_backoff.get() * 2).min(MAX_RESTORE_BACKOFF);
                self.restore_backoff.set(backoff);
                self.redraws_until_restore.set(backoff);
                tracing::debug!(retry_in = backoff, "GPU still unavailable");
            }
        }
    }

    /// The host hit a device-lost error on its own surface
    pub fn on_device_lost(&self) {
        if self.disposed.get() {
            return;
        }
        if let Some(gpu) = self.gpu.borrow().as_ref() {
            gpu.mark_lost();
        }
        self.recover_from_device_loss();
    }

    /// The host saw its GPU context come back. Rebuilds both renderers on a
    /// fresh context when the GPU is preferred and currently not in use.
    pub fn on_gpu_restored(&self) {
        if self.disposed.get() || !self.prefer_gpu.get() || self.backend() == BackendKind::Gpu {
            return;
        }
        self.restore_pending.set(true);
        self.restore_backoff.set(1);
        self.try_restore_gpu();
    }

    fn switch_backend(&self, prefer_gpu: bool) {
        if self.disposed.get() {
            return;
        }
        if !prefer_gpu {
            self.restore_pending.set(false);
        }
        let wanted = if prefer_gpu {
            BackendKind::Gpu
        } else {
            BackendKind::Raster
        };
        if self.backend() == wanted {
            return;
        }

        self.plot.borrow_mut().dispose();
        self.waterfall.borrow_mut().dispose();
        self.gpu.replace(None);

        let gpu = Self::acquire_gpu(prefer_gpu, self.gpu_provider.as_deref());
        self.reinitialize(gpu);
        self.scheduler.enqueue(&self.redraw);
    }

    fn reinitialize(&self, gpu: Option<Rc<GpuContext>>) {
        self.plot.borrow_mut().reinitialize(gpu.clone());
        self.waterfall.borrow_mut().reinitialize(gpu.clone());
        self.gpu.replace(gpu);
        tracing::info!(backend = %self.backend(), "Renderers reinitialized");
    }

    /// Mouse wheel over the display at visible pixel `x`
    pub fn on_wheel(&self, delta: f64, x: f64) {
        if self.disposed.get() {
            return;
        }
        self.coords.change_zoom(delta, x);
        self.scheduler.call_now(&self.redraw);
    }

    /// The host scrolled the view to an integer pixel offset
    pub fn on_scroll(&self, scroll_pixels: f64) {
        if self.disposed.get() {
            return;
        }
        self.coords.on_scroll(scroll_pixels);
        self.scheduler.call_now(&self.redraw);
    }

    /// The viewport changed size
    pub fn on_resize(&self) {
        if self.disposed.get() {
            return;
        }
        self.coords.on_resize();
        self.scheduler.call_now(&self.redraw);
    }

    /// Frequency under visible pixel `x`, for click-to-tune
    pub fn frequency_at_pixel(&self, x: f64) -> f64 {
        self.coords.frequency_at_pixel(x)
    }

    pub fn coords(&self) -> &Rc<CoordinateModel> {
        &self.coords
    }

    pub fn backend(&self) -> BackendKind {
        self.plot.borrow().backend()
    }

    /// Pane sizes used by the latest draw
    pub fn layout(&self) -> PaneLayout {
        self.layout.get()
    }

    pub fn plot(&self) -> Ref<'_, PlotRenderer> {
        self.plot.borrow()
    }

    pub fn waterfall(&self) -> Ref<'_, WaterfallRenderer> {
        self.waterfall.borrow()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Stop listening and scheduling, and release GPU resources
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(id) = self.frame_subscription.take() {
            self.frames.unsubscribe(id);
        }
        if let Some(id) = self.preference_subscription.take() {
            self.prefer_gpu.unsubscribe(id);
        }
        self.restore_pending.set(false);
        self.plot.borrow_mut().dispose();
        self.waterfall.borrow_mut().dispose();
        self.gpu.replace(None);
        tracing::debug!("Spectrum display disposed");
    }
}
