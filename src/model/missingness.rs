//! # Per-Sample Missing Call Counts
//!
//! Counting missing calls one sample at a time costs a branch per sample per
//! variant. Instead each variant contributes a 1-bit missing mask, added
//! 64 samples at a time into vertical 4-bit counters. Before a nibble can
//! overflow (15 variants) the nibbles are widened into 8-bit counters, and
//! before a byte can overflow (255 variants) the bytes are added into plain
//! `u32` totals.
//!
//! The widening steps never shuffle bits across lanes, so counters end up in
//! a fixed scrambled order. For 64-sample word `w`:
//! - nibble word `j` (0..4) lane `k` counts sample `64w + 4k + j`
//! - byte word `(j, h)` (h = 0 low nibbles, 1 high nibbles) lane `b` counts
//!   sample `64w + 8b + 4h + j`
//!
//! Only the final fold into `u32` totals undoes the scramble.

use bitvec::prelude::*;

use crate::data::packed::{pack_even_bits, LOW_BITS_2};
use crate::data::GenotypeRecord;

const NIBBLE_LANES: u64 = 0x1111_1111_1111_1111;
const LOW_NIBBLES: u64 = 0x0F0F_0F0F_0F0F_0F0F;

/// Variants a 4-bit counter can absorb
pub const NIBBLE_FLUSH_INTERVAL: u32 = 15;
/// Variants an 8-bit counter can absorb
pub const BYTE_FLUSH_INTERVAL: u32 = 255;

/// Per-thread missing-call accumulator
#[derive(Clone, Debug)]
pub struct MissingnessAccumulator {
    sample_ct: usize,
    word_ct: usize,
    /// Missing mask of the current variant, 64 samples per word
    mask: Vec<u64>,
    /// Four nibble-counter words per mask word
    nibbles: Vec<u64>,
    /// Eight byte-counter words per mask word
    bytes: Vec<u64>,
    totals: Vec<u32>,
    /// Variants sitting in the nibble counters
    nibble_load: u32,
    /// Variants sitting in the byte counters
    byte_load: u32,
    variant_ct: u64,
}

impl MissingnessAccumulator {
    pub fn new(sample_ct: usize) -> Self {
        let word_ct = sample_ct.div_ceil(64);
        Self {
            sample_ct,
            word_ct,
            mask: vec![0; word_ct],
            nibbles: vec![0; word_ct * 4],
            bytes: vec![0; word_ct * 8],
            totals: vec![0; sample_ct],
            nibble_load: 0,
            byte_load: 0,
            variant_ct: 0,
        }
    }

    pub fn sample_ct(&self) -> usize {
        self.sample_ct
    }

    /// Variants seen so far
    pub fn variant_ct(&self) -> u64 {
        self.variant_ct
    }

    /// Add one variant.
    ///
    /// A sample counts as missing when its hardcall is missing, it has no
    /// dosage, and (when `include` is given) its include bit is set.
    pub fn update(
        &mut self,
        genotypes: &GenotypeRecord,
        dosage_present: Option<&BitVec<u64, Lsb0>>,
        include: Option<&BitVec<u64, Lsb0>>,
    ) {
        debug_assert_eq!(genotypes.sample_ct(), self.sample_ct);
        let geno = genotypes.codes.words();
        for (w, slot) in self.mask.iter_mut().enumerate() {
            let lo = geno.get(2 * w).copied().unwrap_or(0);
            let hi = geno.get(2 * w + 1).copied().unwrap_or(0);
            let lo_missing = pack_even_bits(lo & (lo >> 1) & LOW_BITS_2) as u64;
            let hi_missing = pack_even_bits(hi & (hi >> 1) & LOW_BITS_2) as u64;
            *slot = lo_missing | (hi_missing << 32);
        }
        if let Some(present) = dosage_present {
            for (slot, &word) in self.mask.iter_mut().zip(present.as_raw_slice()) {
                *slot &= !word;
            }
        }
        if let Some(include) = include {
            for (slot, &word) in self.mask.iter_mut().zip(include.as_raw_slice()) {
                *slot &= word;
            }
        }
        self.add_mask();
    }

    fn add_mask(&mut self) {
        for (w, &m) in self.mask.iter().enumerate() {
            if m == 0 {
                continue;
            }
            let nib = &mut self.nibbles[w * 4..w * 4 + 4];
            for (j, counter) in nib.iter_mut().enumerate() {
                *counter += (m >> j) & NIBBLE_LANES;
            }
        }
        self.variant_ct += 1;
        self.nibble_load += 1;
        if self.nibble_load == NIBBLE_FLUSH_INTERVAL {
            self.fold_nibbles();
        }
    }

    fn fold_nibbles(&mut self) {
        if self.nibble_load == 0 {
            return;
        }
        for w in 0..self.word_ct {
            for j in 0..4 {
                let x = std::mem::take(&mut self.nibbles[w * 4 + j]);
                self.bytes[w * 8 + 2 * j] += x & LOW_NIBBLES;
                self.bytes[w * 8 + 2 * j + 1] += (x >> 4) & LOW_NIBBLES;
            }
        }
        self.byte_load += self.nibble_load;
        self.nibble_load = 0;
        if self.byte_load + NIBBLE_FLUSH_INTERVAL > BYTE_FLUSH_INTERVAL {
            self.fold_bytes();
        }
    }

    fn fold_bytes(&mut self) {
        if self.byte_load == 0 {
            return;
        }
        for w in 0..self.word_ct {
            for j in 0..4 {
                for h in 0..2 {
                    let x = std::mem::take(&mut self.bytes[w * 8 + 2 * j + h]);
                    if x == 0 {
                        continue;
                    }
                    for b in 0..8 {
                        let sample = 64 * w + 8 * b + 4 * h + j;
                        if sample < self.sample_ct {
                            self.totals[sample] += ((x >> (8 * b)) & 0xFF) as u32;
                        }
                    }
                }
            }
        }
        self.byte_load = 0;
    }

    /// Move everything into the `u32` totals (end of a block)
    pub fn flush(&mut self) {
        self.fold_nibbles();
        self.fold_bytes();
    }

    /// Flush and return the per-sample totals
    pub fn finalize(&mut self) -> &[u32] {
        self.flush();
        &self.totals
    }

    /// Missing count of one sample; only exact after [`flush`](Self::flush)
    pub fn missing_count(&self, sample: usize) -> u32 {
        self.totals[sample]
    }
}

/// Per-sample missing counts merged across worker threads
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissingCounts {
    pub counts: Vec<u32>,
    /// Variants counted
    pub variant_ct: u64,
    /// chrY variants, which non-male samples are not counted on
    pub chr_y_variant_ct: u64,
}

impl MissingCounts {
    pub fn new(sample_ct: usize) -> Self {
        Self {
            counts: vec![0; sample_ct],
            variant_ct: 0,
            chr_y_variant_ct: 0,
        }
    }

    /// Add finalized accumulators into `self`, starting at sample `offset`
    pub fn merge(&mut self, offset: usize, accumulators: &mut [MissingnessAccumulator]) {
        for acc in accumulators.iter_mut() {
            let totals = acc.finalize();
            for (dst, &src) in self.counts[offset..offset + totals.len()].iter_mut().zip(totals) {
                *dst += src;
            }
        }
    }

    /// Fraction of eligible variants where `sample` was missing
    pub fn missing_rate(&self, sample: usize, is_male: bool) -> f64 {
        let eligible = if is_male {
            self.variant_ct
        } else {
            self.variant_ct - self.chr_y_variant_ct
        };
        if eligible == 0 {
            0.0
        } else {
            self.counts[sample] as f64 / eligible as f64
        }
    }
}
