//! Spectrum frames and the frame source adapter
//!
//! A [`Frame`] is one FFT result: the receiver's center frequency at capture
//! time plus per-bin power in dB. Frames are pushed by an external source in
//! capture order; [`FrameHub`] fans them out synchronously to whichever
//! renderers subscribed.

use crate::cell::SubscriptionId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Tuned center frequency (Hz) when the frame was captured. NaN when
    /// unknown.
    pub center_frequency: f64,
    /// Power per frequency bin (dB), lowest frequency first
    pub magnitudes: Arc<[f32]>,
}

impl Frame {
    pub fn new(center_frequency: f64, magnitudes: impl Into<Arc<[f32]>>) -> Self {
        Self {
            center_frequency,
            magnitudes: magnitudes.into(),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }
}

pub type FrameHandler = Box<dyn FnMut(&Frame)>;

pub trait FrameSource {
    /// Deliver every subsequent frame to `handler`, one at a time, in capture
    /// order
    fn subscribe(&self, handler: FrameHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

type SharedHandler = Rc<RefCell<FrameHandler>>;

/// Push-based frame fan-out
#[derive(Default)]
pub struct FrameHub {
    handlers: RefCell<Vec<(SubscriptionId, SharedHandler)>>,
    next_id: std::cell::Cell<SubscriptionId>,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a frame to every current subscriber
    pub fn push(&self, frame: &Frame) {
        let handlers: Vec<SharedHandler> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();

        for handler in handlers {
            if let Ok(mut handler) = handler.try_borrow_mut() {
                (*handler)(frame);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}

impl FrameSource for FrameHub {
    fn subscribe(&self, handler: FrameHandler) -> SubscriptionId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.handlers
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(handler))));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }
}

/// A carrier in the synthetic spectrum
#[derive(Debug, Clone, Copy)]
pub struct Carrier {
    /// Absolute frequency (Hz)
    pub frequency: f64,
    /// Peak power (dB)
    pub level_db: f32,
    /// Half-power width (Hz)
    pub width: f64,
}

/// Deterministic noise-plus-carriers frame generator
#[derive(Debug)]
pub struct SyntheticSource {
    rng: StdRng,
    bandwidth: f64,
    bin_count: usize,
    center_frequency: f64,
    noise_floor_db: f32,
    noise_spread_db: f32,
    carriers: Vec<Carrier>,
}

impl SyntheticSource {
    pub fn new(seed: u64, center_frequency: f64, bandwidth: f64, bin_count: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            bandwidth,
            bin_count,
            center_frequency,
            noise_floor_db: -110.0,
            noise_spread_db: 6.0,
            carriers: Vec::new(),
        }
    }

    pub fn with_carrier(mut self, carrier: Carrier) -> Self {
        self.carriers.push(carrier);
        self
    }

    pub fn with_noise(mut self, floor_db: f32, spread_db: f32) -> Self {
        self.noise_floor_db = floor_db;
        self.noise_spread_db = spread_db.max(0.0);
        self
    }

    /// Retune; subsequent frames are centered on `frequency`
    pub fn tune(&mut self, frequency: f64) {
        self.center_frequency = frequency;
    }

    pub fn center_frequency(&self) -> f64 {
        self.center_frequency
    }

    pub fn next_frame(&mut self) -> Frame {
        let bin_width = self.bandwidth / self.bin_count.max(1) as f64;
        let left = self.center_frequency - self.bandwidth / 2.0;

        let magnitudes: Vec<f32> = (0..self.bin_count)
            .map(|bin| {
                let frequency = left + (bin as f64 + 0.5) * bin_width;
                let noise = if self.noise_spread_db > 0.0 {
                    self.rng
                        .random_range(-self.noise_spread_db..self.noise_spread_db)
                } else {
                    0.0
                };
                let mut power = self.noise_floor_db + noise;

                for carrier in &self.carriers {
                    let offset = (frequency - carrier.frequency) / carrier.width.max(1.0);
                    let shape = (1.0 / (1.0 + offset * offset)) as f32;
                    let carrier_db = carrier.level_db + 10.0 * shape.max(1e-12).log10();
                    power = power.max(carrier_db);
                }

                power
            })
            .collect();

        Frame::new(self.center_frequency, magnitudes)
    }
}
