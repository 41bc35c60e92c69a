//! # BGEN Probability Tables
//!
//! BGEN v1.2/1.3 stores probabilities as `B`-bit integers packed LSB-first.
//! Hardcalls only ever produce a handful of bit patterns, so they are
//! precomputed once per export (before any worker starts) and looked up by
//! genotype nibble. Dosages go through [`quantize`] sample by sample.

use crate::data::{HET, HOM_FIRST, HOM_SECOND};
use crate::error::{ExportError, Result};

/// Highest supported bit precision (four values must fit a `u64`)
pub const MAX_BITS: u8 = 16;

/// Precomputed packed probability patterns for one bit precision
#[derive(Clone, Debug)]
pub struct BgenTables {
    bits: u8,
    /// Key `c0 | c1 << 2` for two consecutive unphased samples; value is
    /// `P0(AA), P0(AB), P1(AA), P1(AB)` packed in `4 * bits` bits
    unphased_pair: [u64; 16],
    /// Key `code`; value `P(AA), P(AB)` in `2 * bits` bits
    unphased_single: [u64; 4],
    /// Key `code | present << 2 | orientation << 3`; value
    /// `P(hap1 = A), P(hap2 = A)` in `2 * bits` bits
    phased: [u64; 16],
}

impl BgenTables {
    pub fn build(bits: u8) -> Result<Self> {
        if bits == 0 || bits > MAX_BITS {
            return Err(ExportError::config(format!(
                "BGEN bit precision must be in 1..={}, got {}",
                MAX_BITS, bits
            )));
        }
        let max = (1u32 << bits) - 1;
        let b = bits as u32;

        let mut unphased_single = [0u64; 4];
        for (code, slot) in unphased_single.iter_mut().enumerate() {
            let (aa, ab) = match code as u8 {
                HOM_FIRST => (max, 0),
                HET => (0, max),
                _ => (0, 0),
            };
            *slot = aa as u64 | ((ab as u64) << b);
        }

        let mut unphased_pair = [0u64; 16];
        for (key, slot) in unphased_pair.iter_mut().enumerate() {
            *slot = unphased_single[key & 3] | (unphased_single[key >> 2] << (2 * b));
        }

        let mut phased = [0u64; 16];
        for (key, slot) in phased.iter_mut().enumerate() {
            let code = (key & 3) as u8;
            let present = key & 4 != 0;
            let orientation = key & 8 != 0;
            let (h1, h2) = match code {
                HOM_FIRST => (max, max),
                HOM_SECOND => (0, 0),
                HET if present && orientation => (0, max),
                HET => (max, 0),
                _ => (0, 0),
            };
            *slot = h1 as u64 | ((h2 as u64) << b);
        }

        Ok(Self {
            bits,
            unphased_pair,
            unphased_single,
            phased,
        })
    }

    #[inline]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    #[inline]
    pub fn unphased_pair(&self, nibble: u8) -> u64 {
        self.unphased_pair[(nibble & 15) as usize]
    }

    #[inline]
    pub fn unphased_single(&self, code: u8) -> u64 {
        self.unphased_single[(code & 3) as usize]
    }

    #[inline]
    pub fn phased(&self, code: u8, present: bool, orientation: bool) -> u64 {
        let key = (code & 3) as usize | ((present as usize) << 2) | ((orientation as usize) << 3);
        self.phased[key]
    }
}

/// Scale probabilities given in 1/32768 units (summing to 32768) to `bits`-bit
/// integers summing to `2^bits - 1`.
///
/// Each value is floored, then the shortfall is handed out one unit at a time
/// to the largest remainders (lowest index first on ties).
pub fn quantize(probs: &[u32], bits: u8) -> [u32; 3] {
    debug_assert!(probs.len() <= 3);
    debug_assert_eq!(probs.iter().sum::<u32>(), 32768);
    let max = (1u64 << bits) - 1;
    let mut out = [0u32; 3];
    let mut rem = [0u64; 3];
    let mut assigned = 0u64;
    for (i, &p) in probs.iter().enumerate() {
        let scaled = p as u64 * max;
        out[i] = (scaled >> 15) as u32;
        rem[i] = scaled & 0x7FFF;
        assigned += out[i] as u64;
    }
    let mut shortfall = max - assigned;
    while shortfall > 0 {
        let mut best = 0;
        for i in 1..probs.len() {
            if rem[i] > rem[best] {
                best = i;
            }
        }
        out[best] += 1;
        rem[best] = 0;
        shortfall -= 1;
    }
    out
}

/// Appends fixed-width values to a byte buffer, least significant bit first
pub struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    acc: u128,
    pending: u32,
}

impl<'a> BitWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self {
            out,
            acc: 0,
            pending: 0,
        }
    }

    /// Append the low `width` bits of `value` (`width <= 64`)
    #[inline]
    pub fn push(&mut self, value: u64, width: u32) {
        debug_assert!(width <= 64);
        self.acc |= (value as u128) << self.pending;
        self.pending += width;
        while self.pending >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.pending -= 8;
        }
    }

    /// Flush a final partial byte
    pub fn finish(self) {
        if self.pending > 0 {
            self.out.push(self.acc as u8);
        }
    }
}
