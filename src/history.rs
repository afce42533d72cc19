//! Fixed-capacity history of frames for the waterfall
//!
//! One flat arena of `capacity * bin_count` magnitudes plus a parallel array of
//! captured center frequencies. The capacity never changes; a bin-count change
//! discards the arena and allocates a new one of the same depth.

use crate::frame::Frame;

/// One stored row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySlot<'a> {
    pub magnitudes: &'a [f32],
    /// Center frequency the row was captured at (NaN when unknown)
    pub center_frequency: f64,
}

/// Result of [`HistoryRingBuffer::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWrite {
    Skipped,
    /// Row stored in `slot`; `reallocated` when older history was discarded
    /// first
    Stored { slot: usize, reallocated: bool },
}

#[derive(Debug, Clone)]
pub struct HistoryRingBuffer {
    arena: Vec<f32>,
    frequencies: Vec<f64>,
    capacity: usize,
    bin_count: usize,
    /// Next slot to write
    cursor: usize,
    /// Number of valid rows (0 to capacity)
    filled: usize,
    /// Rows written since the last reallocation
    written: u64,
    /// Bumped whenever stored rows are discarded
    epoch: u64,
}

impl HistoryRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            arena: Vec::new(),
            frequencies: vec![f64::NAN; capacity],
            capacity,
            bin_count: 0,
            cursor: 0,
            filled: 0,
            written: 0,
            epoch: 0,
        }
    }

    /// Store `frame` in the slot under the cursor and advance it
    pub fn push(&mut self, frame: &Frame) -> HistoryWrite {
        if frame.is_empty() {
            return HistoryWrite::Skipped;
        }

        let reallocated = frame.bin_count() != self.bin_count;
        if reallocated {
            self.reallocate(frame.bin_count());
        }

        let slot = self.cursor;
        let start = slot * self.bin_count;
        self.arena[start..start + self.bin_count].copy_from_slice(&frame.magnitudes);
        self.frequencies[slot] = frame.center_frequency;

        self.cursor = (self.cursor + 1) % self.capacity;
        if self.filled < self.capacity {
            self.filled += 1;
        }
        self.written += 1;

        HistoryWrite::Stored { slot, reallocated }
    }

    fn reallocate(&mut self, bin_count: usize) {
        tracing::debug!(
            from = self.bin_count,
            to = bin_count,
            capacity = self.capacity,
            "Reallocating waterfall history"
        );
        self.arena = vec![0.0; self.capacity * bin_count];
        self.bin_count = bin_count;
        self.discard();
    }

    fn discard(&mut self) {
        self.frequencies.fill(f64::NAN);
        self.cursor = 0;
        self.filled = 0;
        self.written = 0;
        self.epoch += 1;
    }

    /// Forget every stored row, keeping the allocation
    pub fn clear(&mut self) {
        self.discard();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Slot the next frame will be written to
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Slot holding the newest row
    pub fn last_written(&self) -> Option<usize> {
        if self.filled == 0 {
            None
        } else {
            Some((self.cursor + self.capacity - 1) % self.capacity)
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Raw slot access, valid or not
    pub fn slot(&self, index: usize) -> Option<HistorySlot<'_>> {
        if index >= self.capacity || self.bin_count == 0 {
            return None;
        }
        let start = index * self.bin_count;
        Some(HistorySlot {
            magnitudes: &self.arena[start..start + self.bin_count],
            center_frequency: self.frequencies[index],
        })
    }

    /// Row written `age` frames ago (0 = newest)
    pub fn row(&self, age: usize) -> Option<HistorySlot<'_>> {
        if age >= self.filled {
            return None;
        }
        self.slot((self.cursor + self.capacity - 1 - age) % self.capacity)
    }

    /// Valid rows, newest first
    pub fn iter_newest(&self) -> impl Iterator<Item = HistorySlot<'_>> + '_ {
        (0..self.filled).filter_map(move |age| self.row(age))
    }

    /// Whole arena, slot-major, for texture uploads
    pub fn arena(&self) -> &[f32] {
        &self.arena
    }

    /// Captured frequency per slot, indexed by slot
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }
}
