//! Exponential averaging of magnitude bins for the instantaneous plot

use crate::frame::Frame;

/// What an ingest did to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageUpdate {
    /// Zero-length frame, nothing changed
    Skipped,
    /// Buffer replaced by a copy of the frame
    Reset,
    /// Frame blended into the running average
    Blended,
}

/// Clamp an externally supplied smoothing coefficient into (0, 1]. Non-finite
/// values disable smoothing.
pub fn sanitize_alpha(alpha: f32) -> f32 {
    if alpha.is_finite() { alpha.clamp(f32::MIN_POSITIVE, 1.0) } else { 1.0 }
}

/// Per-bin first-order IIR low-pass over incoming frames
#[derive(Debug, Clone)]
pub struct AverageBuffer {
    values: Option<Vec<f32>>,
    last_center_frequency: f64,
}

impl Default for AverageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AverageBuffer {
    pub fn new() -> Self {
        Self {
            values: None,
            last_center_frequency: f64::NAN,
        }
    }

    /// Fold `frame` into the average with coefficient `alpha`
    ///
    /// The buffer is reallocated from the frame when it does not exist yet,
    /// when the bin count changed, or when the frame was captured at a
    /// different (known) center frequency than the previous one.
    pub fn ingest(&mut self, frame: &Frame, alpha: f32) -> AverageUpdate {
        if frame.is_empty() {
            return AverageUpdate::Skipped;
        }

        let center = frame.center_frequency;
        let retuned = !center.is_nan() && center != self.last_center_frequency;
        if !center.is_nan() {
            self.last_center_frequency = center;
        }

        match &mut self.values {
            Some(values) if values.len() == frame.bin_count() && !retuned => {
                let alpha = sanitize_alpha(alpha);
                let keep = 1.0 - alpha;
                for (avg, &incoming) in values.iter_mut().zip(frame.magnitudes.iter()) {
                    *avg = *avg * keep + incoming * alpha;
                }
                AverageUpdate::Blended
            }
            _ => {
                tracing::debug!(
                    bins = frame.bin_count(),
                    center_frequency = center,
                    "Resetting average buffer"
                );
                self.values = Some(frame.magnitudes.to_vec());
                AverageUpdate::Reset
            }
        }
    }

    pub fn values(&self) -> Option<&[f32]> {
        self.values.as_deref()
    }

    pub fn bin_count(&self) -> usize {
        self.values.as_ref().map_or(0, Vec::len)
    }

    /// Center frequency of the most recent frame with a known frequency
    pub fn center_frequency(&self) -> f64 {
        self.last_center_frequency
    }

    pub fn clear(&mut self) {
        self.values = None;
        self.last_center_frequency = f64::NAN;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(center: f64, values: &[f32]) -> Frame {
        Frame::new(center, values.to_vec())
    }

    #[test]
    fn test_first_ingest_then_blend() {
        let mut average = AverageBuffer::new();

        assert_eq!(average.ingest(&frame(100e6, &[10.0]), 0.5), AverageUpdate::Reset);
        assert_eq!(average.values(), Some(&[10.0f32][..]));

        assert_eq!(average.ingest(&frame(100e6, &[10.0]), 0.5), AverageUpdate::Blended);
        assert_eq!(average.values(), Some(&[10.0f32][..]));

        average.ingest(&frame(100e6, &[0.0]), 0.5);
        assert_eq!(average.values(), Some(&[5.0f32][..]));
    }

    #[test]
    fn test_geometric_decay() {
        let target = -40.0f32;
        for &alpha in &[0.1f32, 0.25, 0.5, 0.9] {
            let mut average = AverageBuffer::new();
            average.ingest(&frame(1e6, &[-100.0, 0.0]), alpha);

            let mut previous_error = [60.0f32, 40.0];
            for n in 1..=30 {
                average.ingest(&frame(1e6, &[target, target]), alpha);
                let values = average.values().unwrap();

                for (i, &initial) in [-100.0f32, 0.0].iter().enumerate() {
                    let error = (values[i] - target).abs();
                    let expected = (initial - target).abs() * (1.0 - alpha).powi(n);
                    assert!(
                        (error - expected).abs() <= 1e-3 * (initial - target).abs(),
                        "alpha {} step {}: {} vs {}",
                        alpha,
                        n,
                        error,
                        expected
                    );
                    assert!(error <= previous_error[i] + 1e-4);
                    previous_error[i] = error;
                }
            }
        }
    }

    #[test]
    fn test_retune_resets_without_blending() {
        let mut average = AverageBuffer::new();
        average.ingest(&frame(100e6, &[-80.0, -70.0]), 0.2);
        average.ingest(&frame(100e6, &[-60.0, -60.0]), 0.2);

        assert_eq!(average.ingest(&frame(101e6, &[-20.0, -30.0]), 0.2), AverageUpdate::Reset);
        assert_eq!(average.values(), Some(&[-20.0f32, -30.0][..]));
        assert_eq!(average.center_frequency(), 101e6);
    }

    #[test]
    fn test_unknown_center_frequency_blends() {
        let mut average = AverageBuffer::new();
        average.ingest(&frame(100e6, &[0.0]), 0.5);

        assert_eq!(average.ingest(&frame(f64::NAN, &[10.0]), 0.5), AverageUpdate::Blended);
        assert_eq!(average.values(), Some(&[5.0f32][..]));
        assert_eq!(average.center_frequency(), 100e6);

        // Still compared against the last known frequency
        assert_eq!(average.ingest(&frame(100e6, &[10.0]), 0.5), AverageUpdate::Blended);
    }

    #[test]
    fn test_bin_count_change_reallocates() {
        let mut average = AverageBuffer::new();
        average.ingest(&frame(1e6, &[1.0, 2.0]), 0.5);
        assert_eq!(average.ingest(&frame(1e6, &[3.0, 4.0, 5.0]), 0.5), AverageUpdate::Reset);
        assert_eq!(average.bin_count(), 3);
    }

    #[test]
    fn test_empty_frame_is_skipped() {
        let mut average = AverageBuffer::new();
        average.ingest(&frame(1e6, &[1.0]), 0.5);
        assert_eq!(average.ingest(&frame(2e6, &[]), 0.5), AverageUpdate::Skipped);
        assert_eq!(average.values(), Some(&[1.0f32][..]));
        assert_eq!(average.center_frequency(), 1e6);
    }

    #[test]
    fn test_alpha_is_sanitized() {
        assert_eq!(sanitize_alpha(f32::NAN), 1.0);
        assert_eq!(sanitize_alpha(7.0), 1.0);
        assert_eq!(sanitize_alpha(-1.0), f32::MIN_POSITIVE);
        assert!(sanitize_alpha(0.0) > 0.0);
        assert_eq!(sanitize_alpha(0.5), 0.5);

        let mut average = AverageBuffer::new();
        average.ingest(&frame(1e6, &[0.0]), f32::INFINITY);
        average.ingest(&frame(1e6, &[8.0]), f32::INFINITY);
        assert_eq!(average.values(), Some(&[8.0f32][..]));
    }
}
