//! Pan/zoom coordinate model shared by every spectrum renderer
//!
//! The display is conceptually a strip `visible_width * zoom` pixels wide
//! showing the whole received bandwidth, viewed through a window
//! `visible_width` pixels wide at a horizontal scroll offset. The scroll is
//! kept as an integer part (what a scrollable viewport can represent) plus a
//! fractional remainder, so cursor-anchored zooming does not drift.
//!
//! Layout is derived from external state (bandwidth, tuned frequency,
//! viewport width) on every [`CoordinateModel::recompute`]; all
//! frequency/pixel conversions are pure functions of that layout.

use crate::cell::Cell as ReactiveCell;
use crate::error::finite_or_zero;
use crate::scheduler::{Scheduler, Task};
use crate::storage::{PersistedView, ViewPersistence};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Zoom change per wheel delta unit
pub const DEFAULT_ZOOM_SENSITIVITY: f64 = 0.0005;

/// Narrowest span zooming may reach on bandwidth grounds (Hz)
const MIN_VISIBLE_SPAN: f64 = 100e3;

/// Fewest bins zooming may reach on resolution grounds
const MIN_VISIBLE_BINS: f64 = 60.0;

/// Rendering surface geometry, in physical pixels
pub trait Viewport {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Viewport whose size the host sets directly
#[derive(Debug, Default)]
pub struct SharedViewport {
    width: Cell<u32>,
    height: Cell<u32>,
}

impl SharedViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: Cell::new(width),
            height: Cell::new(height),
        }
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.width.set(width);
        self.height.set(height);
    }
}

impl Viewport for SharedViewport {
    fn width(&self) -> u32 {
        self.width.get()
    }

    fn height(&self) -> u32 {
        self.height.get()
    }
}

/// Interaction state persisted across sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Magnification relative to showing the full bandwidth, >= 1
    pub zoom: f64,
    /// Integer part of the scroll offset (pixels)
    pub scroll_pixels: f64,
    /// Sub-pixel remainder of the scroll offset, in [0, 1)
    pub fractional_scroll: f64,
}

impl ViewState {
    pub fn scroll(&self) -> f64 {
        self.scroll_pixels + self.fractional_scroll
    }

    fn with_scroll(self, scroll: f64) -> Self {
        let scroll = finite_or_zero(scroll).max(0.0);
        let whole = scroll.floor();
        Self {
            scroll_pixels: whole,
            fractional_scroll: scroll - whole,
            ..self
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            scroll_pixels: 0.0,
            fractional_scroll: 0.0,
        }
    }
}

/// Layout derived from [`ViewState`] and external inputs. Never kept beyond
/// one recompute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedLayout {
    /// Frequency at content pixel 0 (Hz)
    pub left_frequency: f64,
    pub pixels_per_hertz: f64,
    pub visible_pixel_width: f64,
}

/// Immutable view of the coordinate space for one draw
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewSnapshot {
    pub layout: DerivedLayout,
    pub center_frequency: f64,
    pub bandwidth: f64,
    pub zoom: f64,
    /// True scroll offset, integer and fractional parts combined
    pub scroll: f64,
}

impl ViewSnapshot {
    pub fn pixels_per_hertz(&self) -> f64 {
        self.layout.pixels_per_hertz
    }

    pub fn visible_pixel_width(&self) -> f64 {
        self.layout.visible_pixel_width
    }

    pub fn total_pixel_width(&self) -> f64 {
        self.layout.visible_pixel_width * self.zoom
    }

    /// Content-space position of `frequency`, measured from the left edge
    pub fn frequency_to_pixel_left(&self, frequency: f64) -> f64 {
        finite_or_zero((frequency - self.layout.left_frequency) * self.layout.pixels_per_hertz)
    }

    /// Content-space position of `frequency`, measured from the right edge
    pub fn frequency_to_pixel_right(&self, frequency: f64) -> f64 {
        self.total_pixel_width() - self.frequency_to_pixel_left(frequency)
    }

    /// Width in pixels of a frequency span
    pub fn frequency_to_pixel_length(&self, span: f64) -> f64 {
        finite_or_zero(span * self.layout.pixels_per_hertz)
    }

    pub fn left_visible_frequency(&self) -> f64 {
        self.frequency_at_pixel(0.0)
    }

    pub fn right_visible_frequency(&self) -> f64 {
        self.frequency_at_pixel(self.layout.visible_pixel_width)
    }

    /// Frequency under visible pixel `x`
    pub fn frequency_at_pixel(&self, x: f64) -> f64 {
        let pph = self.layout.pixels_per_hertz;
        if pph <= 0.0 {
            return self.layout.left_frequency;
        }
        self.layout.left_frequency + (self.scroll + x) / pph
    }

    /// Visible-space position of `frequency` (0 = left edge of the window)
    pub fn frequency_to_visible_pixel(&self, frequency: f64) -> f64 {
        self.frequency_to_pixel_left(frequency) - self.scroll
    }
}

/// External inputs the layout is derived from
pub struct CoordinateInputs {
    pub bandwidth: Rc<dyn ReactiveCell<f64>>,
    pub center_frequency: Rc<dyn ReactiveCell<f64>>,
    pub viewport: Rc<dyn Viewport>,
}

/// One-shot listener registered with [`CoordinateModel::listen`]
pub type LayoutListener = Box<dyn FnOnce()>;

pub struct CoordinateModel {
    inputs: CoordinateInputs,
    scheduler: Rc<dyn Scheduler>,
    persistence: Box<dyn ViewPersistence>,
    sensitivity: f64,
    state: Cell<ViewState>,
    /// Restored scroll waiting for a viewport with a width to clamp against
    pending_scroll: Cell<Option<f64>>,
    layout: Cell<DerivedLayout>,
    center_frequency: Cell<f64>,
    bandwidth: Cell<f64>,
    bin_count: Cell<usize>,
    listeners: RefCell<Vec<LayoutListener>>,
    notifying: Cell<bool>,
    renotify: Cell<bool>,
    watching_bandwidth: Cell<bool>,
    watching_center: Cell<bool>,
    recompute_task: Task,
    this: Weak<CoordinateModel>,
}

impl CoordinateModel {
    pub fn new(
        inputs: CoordinateInputs,
        scheduler: Rc<dyn Scheduler>,
        persistence: Box<dyn ViewPersistence>,
        sensitivity: f64,
    ) -> Rc<Self> {
        let stored = persistence.load();
        let state = ViewState {
            zoom: finite_or_zero(stored.zoom).max(1.0),
            ..ViewState::default()
        };
        let pending_scroll = Some(finite_or_zero(stored.scroll)).filter(|scroll| *scroll > 0.0);

        let model = Rc::new_cyclic(|this: &Weak<Self>| {
            let weak = this.clone();
            let recompute_task = Task::new(move || {
                if let Some(model) = weak.upgrade() {
                    model.recompute();
                }
            });

            Self {
                inputs,
                scheduler,
                persistence,
                sensitivity: if sensitivity.is_finite() && sensitivity > 0.0 {
                    sensitivity
                } else {
                    DEFAULT_ZOOM_SENSITIVITY
                },
                state: Cell::new(state),
                pending_scroll: Cell::new(pending_scroll),
                layout: Cell::new(DerivedLayout::default()),
                center_frequency: Cell::new(0.0),
                bandwidth: Cell::new(0.0),
                bin_count: Cell::new(0),
                listeners: RefCell::new(Vec::new()),
                notifying: Cell::new(false),
                renotify: Cell::new(false),
                watching_bandwidth: Cell::new(false),
                watching_center: Cell::new(false),
                recompute_task,
                this: this.clone(),
            }
        });

        model.recompute();
        model
    }

    /// Re-derive the layout from current inputs and notify listeners
    pub fn recompute(&self) {
        self.refresh_layout();
        self.notify();
    }

    /// Register a one-shot listener, fired on the next recompute. Listeners
    /// that want further notifications register again from the callback; a
    /// listener registered during a notification pass waits for the next one.
    pub fn listen(&self, listener: LayoutListener) {
        self.listeners.borrow_mut().push(listener);
    }

    /// Cursor-anchored zoom. The frequency under `cursor_x` (visible pixels)
    /// stays under it unless zoom or scroll had to be clamped.
    pub fn change_zoom(&self, delta: f64, cursor_x: f64) {
        if !delta.is_finite() || !cursor_x.is_finite() {
            return;
        }

        let layout = self.layout.get();
        let pph = layout.pixels_per_hertz;
        if pph <= 0.0 {
            return;
        }

        self.pending_scroll.set(None);
        let mut state = self.state.get();
        let cursor = cursor_x + state.fractional_scroll;
        let cursor_frequency = layout.left_frequency + (state.scroll_pixels + cursor) / pph;

        state.zoom = (state.zoom * (-delta * self.sensitivity).exp()).clamp(1.0, self.max_zoom());
        self.state.set(state);

        let layout = self.derive_layout(state);
        let scroll = (cursor_frequency - layout.left_frequency) * layout.pixels_per_hertz - cursor_x;
        let state = state.with_scroll(scroll.clamp(0.0, self.max_scroll(state.zoom, &layout)));

        self.state.set(state);
        self.layout.set(layout);
        self.persist(state);

        tracing::debug!(zoom = state.zoom, scroll = state.scroll(), "Zoom changed");
        self.scheduler.enqueue(&self.recompute_task);
    }

    /// The viewport scrolled to an integer offset
    pub fn on_scroll(&self, scroll_pixels: f64) {
        let state = self.state.get();
        let layout = self.layout.get();
        if layout.visible_pixel_width > 0.0 {
            self.pending_scroll.set(None);
        }
        let scroll = finite_or_zero(scroll_pixels)
            .round()
            .clamp(0.0, self.max_scroll(state.zoom, &layout).floor());
        let state = state.with_scroll(scroll);
        self.state.set(state);
        self.persist(state);
        self.recompute();
    }

    /// The viewport changed size
    pub fn on_resize(&self) {
        self.recompute();
    }

    /// Number of bins in incoming frames; bounds the maximum zoom
    pub fn set_bin_count(&self, bins: usize) {
        self.bin_count.set(bins);
    }

    pub fn max_zoom(&self) -> f64 {
        let by_bandwidth = finite_or_zero(self.bandwidth.get() / MIN_VISIBLE_SPAN);
        let by_bins = self.bin_count.get() as f64 / MIN_VISIBLE_BINS;
        1.0f64.max(by_bandwidth).max(by_bins)
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let state = self.state.get();
        ViewSnapshot {
            layout: self.layout.get(),
            center_frequency: self.center_frequency.get(),
            bandwidth: self.bandwidth.get(),
            zoom: state.zoom,
            scroll: state.scroll(),
        }
    }

    pub fn view_state(&self) -> ViewState {
        self.state.get()
    }

    pub fn layout(&self) -> DerivedLayout {
        self.layout.get()
    }

    pub fn zoom(&self) -> f64 {
        self.state.get().zoom
    }

    pub fn scroll_position(&self) -> f64 {
        self.state.get().scroll()
    }

    pub fn center_frequency(&self) -> f64 {
        self.center_frequency.get()
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth.get()
    }

    pub fn pixels_per_hertz(&self) -> f64 {
        self.layout.get().pixels_per_hertz
    }

    pub fn visible_pixel_width(&self) -> f64 {
        self.layout.get().visible_pixel_width
    }

    pub fn total_pixel_width(&self) -> f64 {
        self.snapshot().total_pixel_width()
    }

    pub fn frequency_to_pixel_left(&self, frequency: f64) -> f64 {
        self.snapshot().frequency_to_pixel_left(frequency)
    }

    pub fn frequency_to_pixel_right(&self, frequency: f64) -> f64 {
        self.snapshot().frequency_to_pixel_right(frequency)
    }

    pub fn frequency_to_pixel_length(&self, span: f64) -> f64 {
        self.snapshot().frequency_to_pixel_length(span)
    }

    pub fn left_visible_frequency(&self) -> f64 {
        self.snapshot().left_visible_frequency()
    }

    pub fn right_visible_frequency(&self) -> f64 {
        self.snapshot().right_visible_frequency()
    }

    pub fn frequency_at_pixel(&self, x: f64) -> f64 {
        self.snapshot().frequency_at_pixel(x)
    }

    fn refresh_layout(&self) {
        let bandwidth = self.read_input(&self.inputs.bandwidth, &self.watching_bandwidth);
        let center = self.read_input(&self.inputs.center_frequency, &self.watching_center);

        self.bandwidth.set(if bandwidth > 0.0 { finite_or_zero(bandwidth) } else { 0.0 });
        self.center_frequency.set(finite_or_zero(center));

        let mut state = self.state.get();
        state.zoom = finite_or_zero(state.zoom).max(1.0);

        let layout = self.derive_layout(state);
        if layout.visible_pixel_width > 0.0 {
            if let Some(scroll) = self.pending_scroll.take() {
                state = state.with_scroll(scroll);
            }
        }
        let state = state.with_scroll(state.scroll().min(self.max_scroll(state.zoom, &layout)));

        self.state.set(state);
        self.layout.set(layout);
    }

    /// Read a cell, registering one-shot interest unless already armed
    fn read_input(&self, cell: &Rc<dyn ReactiveCell<f64>>, watching: &Cell<bool>) -> f64 {
        if watching.get() {
            return cell.get();
        }

        watching.set(true);
        let this = self.this.clone();
        let is_bandwidth = std::ptr::eq(watching, &self.watching_bandwidth);
        cell.depend(Box::new(move || {
            if let Some(model) = this.upgrade() {
                let flag = if is_bandwidth {
                    &model.watching_bandwidth
                } else {
                    &model.watching_center
                };
                flag.set(false);
                model.scheduler.enqueue(&model.recompute_task);
            }
        }))
    }

    fn derive_layout(&self, state: ViewState) -> DerivedLayout {
        let bandwidth = self.bandwidth.get();
        let visible = self.inputs.viewport.width() as f64;
        let pph = if bandwidth > 0.0 {
            finite_or_zero(visible / bandwidth * state.zoom)
        } else {
            0.0
        };

        DerivedLayout {
            left_frequency: finite_or_zero(self.center_frequency.get() - bandwidth / 2.0),
            pixels_per_hertz: pph,
            visible_pixel_width: visible,
        }
    }

    fn max_scroll(&self, zoom: f64, layout: &DerivedLayout) -> f64 {
        finite_or_zero(layout.visible_pixel_width * zoom - layout.visible_pixel_width).max(0.0)
    }

    fn persist(&self, state: ViewState) {
        self.persistence.save(PersistedView {
            zoom: state.zoom,
            scroll: state.scroll(),
        });
    }

    fn notify(&self) {
        if self.notifying.get() {
            // A listener asked for a recompute: the layout is already fresh,
            // the notification goes out on the next tick.
            self.renotify.set(true);
            return;
        }

        self.notifying.set(true);
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners {
            listener();
        }
        self.notifying.set(false);

        if self.renotify.replace(false) {
            self.scheduler.enqueue(&self.recompute_task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::LocalCell;
    use crate::scheduler::FrameScheduler;
    use crate::storage::{KeyValueStore, MemoryStore, StoredView};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct Harness {
        bandwidth: LocalCell<f64>,
        center: LocalCell<f64>,
        viewport: Rc<SharedViewport>,
        scheduler: Rc<FrameScheduler>,
        store: Rc<MemoryStore>,
        model: Rc<CoordinateModel>,
    }

    fn harness(bandwidth: f64, center: f64, width: u32) -> Harness {
        harness_with_store(bandwidth, center, width, Rc::new(MemoryStore::new()))
    }

    fn harness_with_store(bandwidth: f64, center: f64, width: u32, store: Rc<MemoryStore>) -> Harness {
        let bandwidth_cell = LocalCell::new(bandwidth);
        let center_cell = LocalCell::new(center);
        let viewport = Rc::new(SharedViewport::new(width, 200));
        let scheduler = Rc::new(FrameScheduler::new());

        let model = CoordinateModel::new(
            CoordinateInputs {
                bandwidth: Rc::new(bandwidth_cell.clone()),
                center_frequency: Rc::new(center_cell.clone()),
                viewport: viewport.clone(),
            },
            scheduler.clone(),
            Box::new(StoredView::new(Rc::clone(&store))),
            DEFAULT_ZOOM_SENSITIVITY,
        );

        Harness {
            bandwidth: bandwidth_cell,
            center: center_cell,
            viewport,
            scheduler,
            store,
            model,
        }
    }

    fn relative_error(a: f64, b: f64) -> f64 {
        (a - b).abs() / a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_unzoomed_scenario() {
        let h = harness(1_000_000.0, 100_000_000.0, 500);
        let model = &h.model;

        assert_eq!(model.left_visible_frequency(), 99_500_000.0);
        assert!((model.right_visible_frequency() - 100_500_000.0).abs() < 1e-6);
        assert_eq!(model.frequency_to_pixel_left(100_000_000.0), 250.0);
        assert_eq!(model.frequency_to_pixel_right(100_000_000.0), 250.0);
        assert!((model.frequency_to_pixel_length(100_000.0) - 50.0).abs() < 1e-9);
        assert_eq!(model.total_pixel_width(), 500.0);
        assert_eq!(model.center_frequency(), 100_000_000.0);
        assert_eq!(model.bandwidth(), 1_000_000.0);
    }

    #[test]
    fn test_zoom_keeps_cursor_frequency_anchored() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..500 {
            let width = rng.random_range(100..2000u32);
            let bandwidth = rng.random_range(1e4..1e7);
            let center = rng.random_range(1e6..1e9);
            let h = harness(bandwidth, center, width);
            h.model.set_bin_count(rng.random_range(64..8192));

            // Wander to an arbitrary zoom and scroll first
            for _ in 0..3 {
                let x = rng.random_range(0.0..width as f64);
                h.model.change_zoom(rng.random_range(-4000.0..1000.0), x);
            }

            let before = h.model.view_state();
            let x = rng.random_range(0.0..=width as f64);
            let frequency_before = h.model.frequency_at_pixel(x);
            h.model.change_zoom(rng.random_range(-800.0..800.0), x);
            let after = h.model.view_state();

            let zoom_clamped = after.zoom <= 1.0 || after.zoom >= h.model.max_zoom();
            let max_scroll = h.model.total_pixel_width() - h.model.visible_pixel_width();
            let scroll_clamped = after.scroll() <= 0.0 || after.scroll() >= max_scroll;
            if zoom_clamped || scroll_clamped || before == after {
                continue;
            }

            let frequency_after = h.model.frequency_at_pixel(x);
            assert!(
                relative_error(frequency_before, frequency_after) < 1e-6,
                "cursor frequency moved: {} -> {}",
                frequency_before,
                frequency_after
            );
        }
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut rng = StdRng::seed_from_u64(42);
        let h = harness(2_400_000.0, 100e6, 800);
        h.model.set_bin_count(4096);
        let max = 1.0f64.max(2_400_000.0 / 100_000.0).max(4096.0 / 60.0);
        assert!((h.model.max_zoom() - max).abs() < 1e-9);

        for _ in 0..1000 {
            let delta = rng.random_range(-20_000.0..20_000.0);
            h.model.change_zoom(delta, rng.random_range(0.0..800.0));
            let zoom = h.model.zoom();
            assert!(zoom >= 1.0 && zoom <= max, "zoom out of range: {}", zoom);

            let scroll = h.model.scroll_position();
            let max_scroll = h.model.total_pixel_width() - h.model.visible_pixel_width();
            assert!(scroll >= 0.0 && scroll <= max_scroll + 1e-9);
            assert!((0.0..1.0).contains(&h.model.view_state().fractional_scroll));
        }
    }

    #[test]
    fn test_repeated_small_zoom_deltas_do_not_drift() {
        let h = harness(2_000_000.0, 433e6, 1000);
        h.model.set_bin_count(8192);
        h.model.change_zoom(-3000.0, 500.0);

        let x = 317.0;
        let anchored = h.model.frequency_at_pixel(x);

        for i in 0..2000 {
            let delta = if i % 2 == 0 { -1.0 } else { 1.0 };
            h.model.change_zoom(delta, x);
        }
        for _ in 0..500 {
            h.model.change_zoom(-0.5, x);
        }
        for _ in 0..500 {
            h.model.change_zoom(0.5, x);
        }

        assert!(relative_error(anchored, h.model.frequency_at_pixel(x)) < 1e-9);
    }

    #[test]
    fn test_coordinate_inverse() {
        let mut rng = StdRng::seed_from_u64(7);
        let h = harness(3_200_000.0, 145e6, 640);
        h.model.set_bin_count(2048);
        h.model.change_zoom(-2500.0, 100.0);

        let snapshot = h.model.snapshot();
        let left = snapshot.left_visible_frequency();
        let right = snapshot.right_visible_frequency();
        let pph = snapshot.pixels_per_hertz();

        for _ in 0..200 {
            let frequency = rng.random_range(left..right);
            let pixel = snapshot.frequency_to_pixel_left(frequency);
            let recovered = left + (pixel - snapshot.scroll) / pph;
            assert!(relative_error(frequency, recovered) < 1e-12);

            let x = snapshot.frequency_to_visible_pixel(frequency);
            assert!(relative_error(frequency, snapshot.frequency_at_pixel(x)) < 1e-12);
        }
    }

    #[test]
    fn test_zoom_is_persisted_and_restored() {
        let store = Rc::new(MemoryStore::new());
        let h = harness_with_store(1e6, 100e6, 500, Rc::clone(&store));
        h.model.change_zoom(-1000.0, 250.0);
        let zoom = h.model.zoom();
        let scroll = h.model.scroll_position();
        assert!(zoom > 1.0);

        let restored = harness_with_store(1e6, 100e6, 500, store);
        assert!((restored.model.zoom() - zoom).abs() < 1e-9);
        assert!((restored.model.scroll_position() - scroll).abs() < 1e-6);
    }

    #[test]
    fn test_restored_scroll_waits_for_layout() {
        let store = Rc::new(MemoryStore::new());
        StoredView::new(Rc::clone(&store)).save(PersistedView {
            zoom: 4.0,
            scroll: 900.0,
        });

        let h = harness_with_store(1e6, 100e6, 0, store);
        assert_eq!(h.model.zoom(), 4.0);
        assert_eq!(h.model.scroll_position(), 0.0);

        // A recompute before layout keeps the restored scroll around
        h.model.recompute();

        h.viewport.set_size(500, 200);
        h.model.on_resize();
        assert_eq!(h.model.zoom(), 4.0);
        assert_eq!(h.model.scroll_position(), 900.0);

        // Clamped once a width is known: 500 * 4 - 500 = 1500 at most
        let store = Rc::new(MemoryStore::new());
        StoredView::new(Rc::clone(&store)).save(PersistedView {
            zoom: 4.0,
            scroll: 5000.0,
        });
        let h = harness_with_store(1e6, 100e6, 0, store);
        h.viewport.set_size(500, 200);
        h.model.on_resize();
        assert_eq!(h.model.scroll_position(), 1500.0);
    }

    #[test]
    fn test_change_zoom_schedules_recompute() {
        let h = harness(1e6, 100e6, 500);
        let fired = Rc::new(Cell::new(0));

        let counter = Rc::clone(&fired);
        h.model.listen(Box::new(move || counter.set(counter.get() + 1)));
        h.model.change_zoom(-100.0, 10.0);

        assert_eq!(fired.get(), 0);
        assert_eq!(h.scheduler.pending(), 1);
        h.scheduler.run_frame();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_listener_recompute_is_not_reentrant() {
        fn register(model: &Rc<CoordinateModel>, count: &Rc<Cell<u32>>) {
            let weak = Rc::downgrade(model);
            let count = Rc::clone(count);
            model.listen(Box::new(move || {
                count.set(count.get() + 1);
                if let Some(model) = weak.upgrade() {
                    register(&model, &count);
                    model.recompute();
                }
            }));
        }

        let h = harness(1e6, 100e6, 500);
        let count = Rc::new(Cell::new(0));
        register(&h.model, &count);

        h.model.recompute();
        assert_eq!(count.get(), 1);
        // The nested request went to the scheduler instead of looping
        assert_eq!(h.scheduler.pending(), 1);

        h.scheduler.run_frame();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_input_change_schedules_recompute() {
        let h = harness(1e6, 100e6, 500);
        h.center.set(101e6);
        assert_eq!(h.model.center_frequency(), 100e6);
        assert_eq!(h.scheduler.pending(), 1);

        h.scheduler.run_frame();
        assert_eq!(h.model.center_frequency(), 101e6);
        assert_eq!(h.model.left_visible_frequency(), 100.5e6);

        // Interest is re-armed after each change
        h.bandwidth.set(2e6);
        h.scheduler.run_frame();
        assert_eq!(h.model.bandwidth(), 2e6);
        assert_eq!(h.model.left_visible_frequency(), 100e6);
    }

    #[test]
    fn test_scroll_and_resize_recompute_immediately() {
        let h = harness(1e6, 100e6, 500);
        h.model.set_bin_count(4096);
        h.model.change_zoom(-2000.0, 0.0);
        let max_scroll = h.model.total_pixel_width() - h.model.visible_pixel_width();

        h.model.on_scroll(1e9);
        assert_eq!(h.model.scroll_position(), max_scroll.floor());
        assert_eq!(h.model.view_state().fractional_scroll, 0.0);

        h.viewport.set_size(250, 200);
        h.model.on_resize();
        assert_eq!(h.model.visible_pixel_width(), 250.0);
        let max_scroll = h.model.total_pixel_width() - h.model.visible_pixel_width();
        assert!(h.model.scroll_position() <= max_scroll);
        assert!(h.store.get_item("scroll").is_some());
    }

    #[test]
    fn test_degenerate_inputs_stay_finite() {
        let h = harness(0.0, f64::NAN, 0);
        h.model.change_zoom(-500.0, 10.0);
        h.model.change_zoom(f64::NAN, 10.0);

        let snapshot = h.model.snapshot();
        assert_eq!(snapshot.pixels_per_hertz(), 0.0);
        assert!(snapshot.left_visible_frequency().is_finite());
        assert!(snapshot.right_visible_frequency().is_finite());
        assert!(h.model.frequency_to_pixel_left(1e6).is_finite());
        assert_eq!(h.model.zoom(), 1.0);
    }
}
