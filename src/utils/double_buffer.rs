//! # Double Buffering
//!
//! Two slots of the same buffer type. During block `k` workers fill the
//! compute slot while the coordinator drains the flush slot (block `k - 1`);
//! a swap at the block boundary exchanges their roles. The slots are only
//! reachable through [`ComputeSlot`] and [`FlushSlot`] handles, and the
//! flush handle is read-only, so the slot being written can never be the
//! slot being drained.
//!
//! Input blocks use the same pair the other way round: workers read the
//! active slot while the coordinator loads block `k + 1` into the idle one
//! ([`DoubleBuffer::split_prefetch`]).

use std::ops::{Deref, DerefMut};

/// A pair of buffers with one active (compute) slot
#[derive(Debug, Default)]
pub struct DoubleBuffer<T> {
    slots: [T; 2],
    active: usize,
}

/// Writable handle to the slot of the block being computed
pub struct ComputeSlot<'a, T>(&'a mut T);

/// Read-only handle to the slot of the block being flushed
pub struct FlushSlot<'a, T>(&'a T);

impl<T> Deref for ComputeSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<T> DerefMut for ComputeSlot<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.0
    }
}

impl<T> Deref for FlushSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<T> DoubleBuffer<T> {
    pub fn new(a: T, b: T) -> Self {
        Self {
            slots: [a, b],
            active: 0,
        }
    }

    /// Both handles at once
    pub fn split(&mut self) -> (ComputeSlot<'_, T>, FlushSlot<'_, T>) {
        let [a, b] = &mut self.slots;
        if self.active == 0 {
            (ComputeSlot(a), FlushSlot(b))
        } else {
            (ComputeSlot(b), FlushSlot(a))
        }
    }

    /// Active slot for reading, idle slot for loading the next block
    pub fn split_prefetch(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.slots;
        if self.active == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn compute_slot(&mut self) -> ComputeSlot<'_, T> {
        ComputeSlot(&mut self.slots[self.active])
    }

    /// Slot holding the previous block
    pub fn flush_slot(&self) -> FlushSlot<'_, T> {
        FlushSlot(&self.slots[1 - self.active])
    }

    /// Exchange roles at a block boundary
    pub fn swap(&mut self) {
        self.active = 1 - self.active;
    }
}
