//! # Genotype and Dosage Records
//!
//! One decoded variant restricted to the exported samples: 2-bit hardcalls,
//! optional hardcall phase, optional sparse dosages with optional dosage
//! phase. Records are owned by a worker thread and reused across variants.
//!
//! ## Dosage scale
//! Dosages count copies of the second allele in units of 1/16384, so a value
//! lies in `0..=DOSAGE_MAX` with `DOSAGE_MID` meaning one copy. Haploid
//! dosages use the same storage and are reported over 32768.

use bitvec::prelude::*;

use crate::data::packed::{PackedBits, LOW_BITS_2};

/// Homozygous for the first allele
pub const HOM_FIRST: u8 = 0;
/// Heterozygous
pub const HET: u8 = 1;
/// Homozygous for the second allele
pub const HOM_SECOND: u8 = 2;
/// Missing call
pub const MISSING: u8 = 3;

/// Two copies of the second allele
pub const DOSAGE_MAX: u16 = 32768;
/// One copy of the second allele
pub const DOSAGE_MID: u16 = 16384;

/// Hardcall phase for heterozygous samples
#[derive(Clone, Debug, Default)]
pub struct PhaseRecord {
    /// Sample has a phased het call
    pub present: BitVec<u64, Lsb0>,
    /// Set means `1|0`: the first haplotype carries the second allele
    pub orientation: BitVec<u64, Lsb0>,
}

impl PhaseRecord {
    pub fn reset(&mut self, sample_ct: usize) {
        self.present.clear();
        self.present.resize(sample_ct, false);
        self.orientation.clear();
        self.orientation.resize(sample_ct, false);
    }

    pub fn any(&self) -> bool {
        self.present.any()
    }
}

/// Hardcalls plus optional phase
#[derive(Clone, Debug)]
pub struct GenotypeRecord {
    pub codes: PackedBits,
    pub phase: PhaseRecord,
}

impl GenotypeRecord {
    pub fn new(sample_ct: usize) -> Self {
        let mut phase = PhaseRecord::default();
        phase.reset(sample_ct);
        Self {
            codes: PackedBits::new(sample_ct, 2),
            phase,
        }
    }

    pub fn reset(&mut self, sample_ct: usize) {
        self.codes.reset(sample_ct);
        self.phase.reset(sample_ct);
    }

    #[inline]
    pub fn sample_ct(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn code(&self, sample: usize) -> u8 {
        self.codes.get(sample)
    }

    /// Phase of sample `s` if it is a phased het: `Some(true)` means `1|0`
    #[inline]
    pub fn phase_of(&self, sample: usize) -> Option<bool> {
        if self.phase.present[sample] {
            Some(self.phase.orientation[sample])
        } else {
            None
        }
    }

    /// True when no sample is missing
    pub fn has_no_missing(&self) -> bool {
        self.codes
            .words()
            .iter()
            .all(|&w| w & (w >> 1) & LOW_BITS_2 == 0)
    }
}

/// Sparse dosages with optional dosage phase
#[derive(Clone, Debug, Default)]
pub struct DosageRecord {
    /// Samples carrying a dosage
    pub present: BitVec<u64, Lsb0>,
    /// One value per set bit of `present`, in sample order
    pub values: Vec<u16>,
    /// Samples carrying a dosage phase delta (subset of `present`)
    pub dphase_present: BitVec<u64, Lsb0>,
    /// One delta per set bit of `dphase_present`: hap1 dosage is
    /// `(d + delta) / 2`, hap2 dosage `(d - delta) / 2`
    pub dphase_deltas: Vec<i16>,
}

impl DosageRecord {
    pub fn reset(&mut self, sample_ct: usize) {
        self.present.clear();
        self.present.resize(sample_ct, false);
        self.values.clear();
        self.dphase_present.clear();
        self.dphase_present.resize(sample_ct, false);
        self.dphase_deltas.clear();
    }

    #[inline]
    pub fn dosage_ct(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a dosage for `sample`; samples must be pushed in increasing order
    pub fn push(&mut self, sample: usize, value: u16) {
        self.present.set(sample, true);
        self.values.push(value);
    }

    /// Append a dosage phase delta; `sample` must already carry a dosage
    pub fn push_dphase(&mut self, sample: usize, delta: i16) {
        self.dphase_present.set(sample, true);
        self.dphase_deltas.push(delta);
    }

    /// Sequential reader for encoders that walk samples in order
    pub fn cursor(&self) -> DosageCursor<'_> {
        DosageCursor {
            record: self,
            value_pos: 0,
            dphase_pos: 0,
        }
    }
}

/// Per-sample view produced by [`DosageCursor`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleDosage {
    pub value: u16,
    pub dphase: Option<i16>,
}

/// Walks dosage entries in sample order without per-sample rank queries
pub struct DosageCursor<'a> {
    record: &'a DosageRecord,
    value_pos: usize,
    dphase_pos: usize,
}

impl DosageCursor<'_> {
    /// Dosage of `sample`; must be called with non-decreasing sample indices,
    /// once per sample
    #[inline]
    pub fn next_for(&mut self, sample: usize) -> Option<SampleDosage> {
        if self.record.values.is_empty() || !self.record.present[sample] {
            return None;
        }
        let value = self.record.values[self.value_pos];
        self.value_pos += 1;
        let dphase = if self.record.dphase_present[sample] {
            let d = self.record.dphase_deltas[self.dphase_pos];
            self.dphase_pos += 1;
            Some(d)
        } else {
            None
        };
        Some(SampleDosage { value, dphase })
    }
}

/// One decoded variant
#[derive(Clone, Debug)]
pub struct VariantRecord {
    pub genotypes: GenotypeRecord,
    pub dosage: DosageRecord,
}

impl VariantRecord {
    pub fn new(sample_ct: usize) -> Self {
        let mut dosage = DosageRecord::default();
        dosage.reset(sample_ct);
        Self {
            genotypes: GenotypeRecord::new(sample_ct),
            dosage,
        }
    }

    pub fn reset(&mut self, sample_ct: usize) {
        self.genotypes.reset(sample_ct);
        self.dosage.reset(sample_ct);
    }

    #[inline]
    pub fn sample_ct(&self) -> usize {
        self.genotypes.sample_ct()
    }

    /// Check the cross-field invariants a decoder must uphold.
    ///
    /// Returns a description of the first violation.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let n = self.sample_ct();
        let g = &self.genotypes;
        if g.phase.present.len() != n || self.dosage.present.len() != n {
            return Err("bitset length does not match sample count".to_string());
        }
        for s in g.phase.present.iter_ones() {
            if g.code(s) != HET {
                return Err(format!("phase set on non-heterozygous sample {}", s));
            }
        }
        let d = &self.dosage;
        if d.present.count_ones() != d.values.len() {
            return Err("dosage count does not match presence bitset".to_string());
        }
        if d.dphase_present.count_ones() != d.dphase_deltas.len() {
            return Err("dosage phase count does not match presence bitset".to_string());
        }
        let mut cursor = d.cursor();
        for s in d.present.iter_ones() {
            let Some(entry) = cursor.next_for(s) else {
                continue;
            };
            if entry.value > DOSAGE_MAX {
                return Err(format!("dosage {} out of range at sample {}", entry.value, s));
            }
            let expected = match entry.value {
                0 => Some(HOM_FIRST),
                DOSAGE_MID => Some(HET),
                DOSAGE_MAX => Some(HOM_SECOND),
                _ => None,
            };
            if let Some(code) = expected {
                if g.code(s) != code {
                    return Err(format!(
                        "dosage {} disagrees with hardcall {} at sample {}",
                        entry.value,
                        g.code(s),
                        s
                    ));
                }
            }
            if let Some(delta) = entry.dphase {
                let limit = entry.value.min(DOSAGE_MAX - entry.value) as i32;
                if (delta as i32).abs() > limit {
                    return Err(format!("dosage phase delta {} out of range at sample {}", delta, s));
                }
            }
        }
        for s in d.dphase_present.iter_ones() {
            if !d.present[s] {
                return Err(format!("dosage phase without dosage at sample {}", s));
            }
        }
        Ok(())
    }

    /// Swap the roles of the two alleles in place
    pub fn flip_alleles(&mut self) {
        self.genotypes.codes.invert_alleles();
        let phase = &mut self.genotypes.phase;
        for (o, &p) in phase
            .orientation
            .as_raw_mut_slice()
            .iter_mut()
            .zip(phase.present.as_raw_slice())
        {
            *o ^= p;
        }
        for v in &mut self.dosage.values {
            *v = DOSAGE_MAX - *v;
        }
        for delta in &mut self.dosage.dphase_deltas {
            *delta = -*delta;
        }
    }
}
