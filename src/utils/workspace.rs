//! # Per-Thread Workspace
//!
//! Everything a worker mutates while exporting a block. Workspace `t` goes
//! to the job for part `t` of every block, whichever pool thread runs it,
//! so the per-variant path never allocates once the buffers have grown to
//! size.

use crate::data::VariantRecord;
use crate::export::EncodeScratch;
use crate::model::MissingnessAccumulator;

/// Buffers owned by one worker slot
pub struct ThreadWorkspace {
    /// Decoded variant under construction
    pub record: VariantRecord,
    /// Encoder scratch (raw payload, compressor contexts)
    pub scratch: EncodeScratch,
    /// Missing calls seen by this thread
    pub missing: MissingnessAccumulator,
}

impl ThreadWorkspace {
    pub fn new(sample_ct: usize) -> Self {
        Self {
            record: VariantRecord::new(sample_ct),
            scratch: EncodeScratch::new(),
            missing: MissingnessAccumulator::new(sample_ct),
        }
    }

    /// One workspace per worker
    pub fn for_threads(n_threads: usize, sample_ct: usize) -> Vec<Self> {
        (0..n_threads).map(|_| Self::new(sample_ct)).collect()
    }
}
