//! # Genotype Sources
//!
//! The decoder side of the pipeline. A source is split into two steps so the
//! coordinator can do all I/O and the workers none:
//! - `stage_block` copies (or maps) the raw bytes of a block of variants.
//!   Only the coordinator calls it.
//! - `decode` / `decode_with_dosage_phase` turn one staged variant into a
//!   record restricted to the exported samples. Workers call these
//!   concurrently through `&self`.
//!
//! Decode failures mean the source is corrupt and are never retried.

use std::ops::Range;

use crate::data::{GenotypeRecord, SampleSubset, VariantRecord, HET};
use crate::error::{ExportError, Result};

/// Optional decode channels an encoder needs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeFeatures {
    pub phase: bool,
    pub dosage: bool,
    pub multiallelic: bool,
}

impl DecodeFeatures {
    pub const HARDCALLS: Self = Self {
        phase: false,
        dosage: false,
        multiallelic: false,
    };

    /// True when the plain hardcall decode is not enough
    pub fn needs_extended_decode(self) -> bool {
        self.phase || self.dosage
    }
}

/// How the source's dosages were produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DosageProvenance {
    /// Stored at full 1/16384 resolution
    #[default]
    Direct,
    /// Imported from BGEN v1.1 (rounded to 1/32768, then halved upwards)
    Bgen11,
}

/// What a source can provide
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceInfo {
    pub raw_sample_ct: usize,
    pub raw_variant_ct: usize,
    pub has_dosage: bool,
    pub has_phase: bool,
    pub has_dosage_phase: bool,
    pub provenance: DosageProvenance,
}

/// Decoder interface consumed by the export pipeline
pub trait GenotypeSource: Sync {
    /// Raw bytes of one staged block
    type Block: Default + Send + Sync;

    fn info(&self) -> SourceInfo;

    /// Bytes one raw variant occupies once staged (for memory planning)
    fn staged_bytes_per_variant(&self) -> usize;

    /// Load raw variants `raw_range` into `block`, replacing its contents
    fn stage_block(&self, raw_range: Range<usize>, block: &mut Self::Block) -> Result<()>;

    /// Decode hardcalls for `raw_idx` restricted to `samples`.
    ///
    /// `out` arrives reset to `samples.len()` samples.
    fn decode(
        &self,
        block: &Self::Block,
        raw_idx: usize,
        samples: &SampleSubset,
        out: &mut GenotypeRecord,
    ) -> Result<()>;

    /// Decode hardcalls plus whichever of phase and dosage `features` asks
    /// for. Sources without those channels fall back to plain hardcalls.
    fn decode_with_dosage_phase(
        &self,
        block: &Self::Block,
        raw_idx: usize,
        samples: &SampleSubset,
        features: DecodeFeatures,
        out: &mut VariantRecord,
    ) -> Result<()> {
        let _ = features;
        self.decode(block, raw_idx, samples, &mut out.genotypes)
    }
}

/// One variant held by [`MemorySource`], indexed by raw sample
#[derive(Clone, Debug, Default)]
pub struct MemoryVariant {
    pub codes: Vec<u8>,
    /// `Some(orientation)` for phased hets
    pub phase: Vec<Option<bool>>,
    pub dosages: Vec<Option<u16>>,
    pub dphase: Vec<Option<i16>>,
}

impl MemoryVariant {
    pub fn from_codes(codes: Vec<u8>) -> Self {
        Self {
            codes,
            ..Self::default()
        }
    }

    /// Attach phase to every het call (`orientation[s]` for sample `s`)
    pub fn with_phase(mut self, orientation: impl Fn(usize) -> bool) -> Self {
        self.phase = self
            .codes
            .iter()
            .enumerate()
            .map(|(s, &c)| (c == HET).then(|| orientation(s)))
            .collect();
        self
    }

    pub fn with_dosages(mut self, dosages: Vec<Option<u16>>) -> Self {
        self.dosages = dosages;
        self
    }

    pub fn with_dosage_phase(mut self, dphase: Vec<Option<i16>>) -> Self {
        self.dphase = dphase;
        self
    }
}

/// Staged range of a [`MemorySource`]
#[derive(Clone, Debug, Default)]
pub struct MemoryBlock {
    range: Range<usize>,
    /// Packed codes per staged variant, padding poisoned on request
    packed: Vec<Vec<u8>>,
}

/// In-memory genotype matrix, for library callers and tests
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    raw_sample_ct: usize,
    variants: Vec<MemoryVariant>,
    provenance: DosageProvenance,
    poison_padding: bool,
}

impl MemorySource {
    pub fn new(raw_sample_ct: usize, variants: Vec<MemoryVariant>) -> Self {
        Self {
            raw_sample_ct,
            variants,
            provenance: DosageProvenance::Direct,
            poison_padding: false,
        }
    }

    /// Convenience constructor from a variant-major code matrix
    pub fn from_codes(rows: &[Vec<u8>]) -> Self {
        let raw_sample_ct = rows.first().map_or(0, Vec::len);
        Self::new(
            raw_sample_ct,
            rows.iter().cloned().map(MemoryVariant::from_codes).collect(),
        )
    }

    pub fn with_provenance(mut self, provenance: DosageProvenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Fill the bits past the last sample of every staged variant with ones
    pub fn with_padding_poison(mut self, poison: bool) -> Self {
        self.poison_padding = poison;
        self
    }

    fn pack(&self, variant: &MemoryVariant) -> Vec<u8> {
        let mut bytes = vec![0u8; self.raw_sample_ct.div_ceil(32) * 8];
        for (s, &c) in variant.codes.iter().enumerate() {
            bytes[s / 4] |= (c & 3) << (2 * (s % 4));
        }
        if self.poison_padding {
            for s in self.raw_sample_ct..bytes.len() * 4 {
                bytes[s / 4] |= 3 << (2 * (s % 4));
            }
        }
        bytes
    }

    fn staged<'a>(&self, block: &'a MemoryBlock, raw_idx: usize) -> Result<&'a [u8]> {
        if !block.range.contains(&raw_idx) {
            return Err(ExportError::read_failed(raw_idx, "variant was not staged"));
        }
        Ok(&block.packed[raw_idx - block.range.start])
    }
}

impl GenotypeSource for MemorySource {
    type Block = MemoryBlock;

    fn info(&self) -> SourceInfo {
        SourceInfo {
            raw_sample_ct: self.raw_sample_ct,
            raw_variant_ct: self.variants.len(),
            has_dosage: self.variants.iter().any(|v| v.dosages.iter().any(Option::is_some)),
            has_phase: self.variants.iter().any(|v| v.phase.iter().any(Option::is_some)),
            has_dosage_phase: self.variants.iter().any(|v| v.dphase.iter().any(Option::is_some)),
            provenance: self.provenance,
        }
    }

    fn staged_bytes_per_variant(&self) -> usize {
        self.raw_sample_ct.div_ceil(32) * 8
    }

    fn stage_block(&self, raw_range: Range<usize>, block: &mut MemoryBlock) -> Result<()> {
        if raw_range.end > self.variants.len() {
            return Err(ExportError::read_failed(
                raw_range.end - 1,
                format!("source holds only {} variants", self.variants.len()),
            ));
        }
        block.packed.clear();
        for v in &self.variants[raw_range.clone()] {
            if v.codes.len() != self.raw_sample_ct {
                return Err(ExportError::read_failed(
                    raw_range.start + block.packed.len(),
                    format!("expected {} calls, found {}", self.raw_sample_ct, v.codes.len()),
                ));
            }
            block.packed.push(self.pack(v));
        }
        block.range = raw_range;
        Ok(())
    }

    fn decode(
        &self,
        block: &MemoryBlock,
        raw_idx: usize,
        samples: &SampleSubset,
        out: &mut GenotypeRecord,
    ) -> Result<()> {
        let packed = self.staged(block, raw_idx)?;
        if samples.is_identity(self.raw_sample_ct) {
            out.codes.load_bytes(packed);
            return Ok(());
        }
        for (i, &raw) in samples.raw_indices.iter().enumerate() {
            let raw = raw as usize;
            out.codes.set(i, (packed[raw / 4] >> (2 * (raw % 4))) & 3);
        }
        Ok(())
    }

    fn decode_with_dosage_phase(
        &self,
        block: &MemoryBlock,
        raw_idx: usize,
        samples: &SampleSubset,
        features: DecodeFeatures,
        out: &mut VariantRecord,
    ) -> Result<()> {
        self.decode(block, raw_idx, samples, &mut out.genotypes)?;
        let v = &self.variants[raw_idx];
        for (i, &raw) in samples.raw_indices.iter().enumerate() {
            let raw = raw as usize;
            if features.phase {
                if let Some(Some(orientation)) = v.phase.get(raw) {
                    if v.codes[raw] != HET {
                        return Err(ExportError::read_failed(
                            raw_idx,
                            format!("phase on non-heterozygous call of sample {}", raw),
                        ));
                    }
                    out.genotypes.phase.present.set(i, true);
                    out.genotypes.phase.orientation.set(i, *orientation);
                }
            }
            if features.dosage {
                if let Some(Some(d)) = v.dosages.get(raw) {
                    out.dosage.push(i, *d);
                    if features.phase {
                        if let Some(Some(delta)) = v.dphase.get(raw) {
                            out.dosage.push_dphase(i, *delta);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
