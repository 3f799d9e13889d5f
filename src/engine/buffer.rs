//! Fixed-capacity input buffer
//!
//! Holds preprocessed tensors for up to `B` images in one contiguous
//! (rows, 3, H, W) array. With the mirror trick enabled the buffer has `2B`
//! rows: the first `B` hold the originals and the second `B` hold their
//! horizontal flips, paired slot for slot. Callers never compute the mirror
//! row themselves; they go through [`BatchBuffer::original`] /
//! [`BatchBuffer::mirror`] or [`PairedRows`] for network outputs.

use ndarray::{s, Array4, Axis, ArrayView1, ArrayView2, ArrayView3, ArrayView4};

use super::preprocess::flip_horizontal_into;
use crate::error::{ExtractorError, Result};

/// Reusable batch input buffer with paired original/mirror slots
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    data: Array4<f32>,
    capacity: usize,
    mirrored: bool,
    loaded: usize,
}

impl BatchBuffer {
    /// Allocate a buffer for `capacity` images of shape (3, height, width)
    pub fn new(capacity: usize, mirrored: bool, height: usize, width: usize) -> Self {
        let rows = if mirrored { capacity * 2 } else { capacity };
        Self {
            data: Array4::zeros((rows, 3, height, width)),
            capacity,
            mirrored,
            loaded: 0,
        }
    }

    /// Logical capacity `B`
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Physical rows: `B`, or `2B` when mirroring
    pub fn effective_capacity(&self) -> usize {
        self.data.dim().0
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Number of leading slots written since the last reset
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn is_full(&self) -> bool {
        self.loaded >= self.capacity
    }

    /// Start a new logical batch. Slot contents are kept; only the load
    /// count is cleared, so stale rows must be ignored by the reader.
    pub fn reset(&mut self) {
        self.loaded = 0;
    }

    /// Write a preprocessed (3, H, W) tensor into `slot`, plus its flip
    /// into the paired mirror slot when mirroring.
    pub fn load(&mut self, tensor: ArrayView3<'_, f32>, slot: usize) -> Result<()> {
        if slot >= self.capacity {
            return Err(ExtractorError::load_data(format!(
                "load index {slot} out of range, must be < batch size {}",
                self.capacity
            )));
        }

        let expected = (self.data.dim().1, self.data.dim().2, self.data.dim().3);
        if tensor.dim() != expected {
            return Err(ExtractorError::load_data(format!(
                "tensor shape {:?} does not match buffer slot shape {:?}",
                tensor.shape(),
                expected
            )));
        }

        self.data.slice_mut(s![slot, .., .., ..]).assign(&tensor);

        if self.mirrored {
            let (originals, mut mirrors) = self.data.view_mut().split_at(Axis(0), self.capacity);
            flip_horizontal_into(
                originals.slice(s![slot, .., .., ..]),
                mirrors.slice_mut(s![slot, .., .., ..]),
            );
        }

        self.loaded = self.loaded.max(slot + 1);
        Ok(())
    }

    /// Load into the next free slot, failing once `B` images are loaded
    pub fn push(&mut self, tensor: ArrayView3<'_, f32>) -> Result<usize> {
        if self.is_full() {
            return Err(ExtractorError::load_data(format!(
                "batch buffer is full ({} images), flush before loading more",
                self.capacity
            )));
        }
        let slot = self.loaded;
        self.load(tensor, slot)?;
        Ok(slot)
    }

    /// Original tensor at slot `i`
    pub fn original(&self, i: usize) -> Option<ArrayView3<'_, f32>> {
        (i < self.capacity).then(|| self.data.slice(s![i, .., .., ..]))
    }

    /// Mirrored tensor paired with slot `i`, if mirroring
    pub fn mirror(&self, i: usize) -> Option<ArrayView3<'_, f32>> {
        (self.mirrored && i < self.capacity).then(|| self.data.slice(s![self.capacity + i, .., .., ..]))
    }

    /// Whole buffer as the network input batch
    pub fn as_tensor(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// View a (rows, dim) network output through this buffer's slot layout
    pub fn paired_rows<'a>(&self, output: ArrayView2<'a, f32>) -> PairedRows<'a> {
        PairedRows {
            rows: output,
            capacity: self.capacity,
            mirrored: self.mirrored,
        }
    }
}

/// Per-slot access to an output tensor laid out like the input buffer
#[derive(Debug, Clone, Copy)]
pub struct PairedRows<'a> {
    rows: ArrayView2<'a, f32>,
    capacity: usize,
    mirrored: bool,
}

impl<'a> PairedRows<'a> {
    pub fn original(&self, i: usize) -> ArrayView1<'a, f32> {
        self.rows.index_axis_move(Axis(0), i)
    }

    pub fn mirror(&self, i: usize) -> Option<ArrayView1<'a, f32>> {
        self.mirrored
            .then(|| self.rows.index_axis_move(Axis(0), self.capacity + i))
    }

    /// Native width of one embedding
    pub fn dim(&self) -> usize {
        self.rows.ncols()
    }
}
