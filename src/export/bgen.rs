//! # BGEN Genotype Blocks
//!
//! ## v1.1
//! `N` triples of little-endian `u16` probabilities on a 1/32768 scale,
//! zlib-compressed and prefixed by the compressed length.
//!
//! ## v1.2 / v1.3 (layout 2)
//! ```text
//! N u32 | K u16 = 2 | Pmin u8 | Pmax u8 | ploidy byte per sample (0x80 = missing)
//! | phased u8 | B u8 | probabilities, B bits each, LSB-first
//! ```
//! Unphased samples store `P(AA), P(AB)`; phased samples store the
//! probability that each haplotype carries allele A. The block is stored as
//! `C u32 | D u32 | compressed` (or `C u32 | raw` when uncompressed).
//!
//! Only diploid data is written. Haploid chromosomes and male X/Y calls are
//! refused rather than padded into a diploid layout.

use bitvec::prelude::*;

use crate::data::{VariantRecord, HET, MISSING};
use crate::error::{ExportError, Result};
use crate::export::{
    dosage_to_probs, hardcall_probs, require_biallelic, zlib_bound, zstd_bound, EncodeScratch,
    FormatEncoder, VariantContext,
};
use crate::io::sink::checked_u32;
use crate::io::source::DecodeFeatures;
use crate::model::bgen_tables::{quantize, BgenTables, BitWriter};

/// zlib level used for every BGEN block
pub const ZLIB_LEVEL: u32 = 6;
/// zstd level used for BGEN v1.3 blocks
pub const ZSTD_LEVEL: i32 = 3;

/// Genotype block compression
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BgenCompression {
    None,
    #[default]
    Zlib,
    Zstd,
}

impl BgenCompression {
    /// Header flag bits 0-1
    pub fn flag(self) -> u32 {
        match self {
            BgenCompression::None => 0,
            BgenCompression::Zlib => 1,
            BgenCompression::Zstd => 2,
        }
    }
}

/// BGEN v1.1 encoder
#[derive(Clone, Debug)]
pub struct Bgen11Encoder {
    ref_first: bool,
    compressed: bool,
}

impl Bgen11Encoder {
    pub fn new(ref_first: bool, compressed: bool) -> Self {
        Self {
            ref_first,
            compressed,
        }
    }
}

impl FormatEncoder for Bgen11Encoder {
    fn name(&self) -> &'static str {
        "bgen-1.1"
    }

    fn required_decode_features(&self) -> DecodeFeatures {
        DecodeFeatures {
            phase: false,
            dosage: true,
            multiallelic: false,
        }
    }

    fn alt_first(&self) -> bool {
        !self.ref_first
    }

    fn max_encoded_len(&self, sample_ct: usize) -> usize {
        4 + zlib_bound(6 * sample_ct)
    }

    fn encode_variant(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        require_biallelic(self.name(), vctx)?;
        let n = record.sample_ct();
        scratch.raw.clear();
        scratch.raw.reserve(6 * n);
        let mut cursor = record.dosage.cursor();
        for s in 0..n {
            let probs = match cursor.next_for(s) {
                Some(entry) => dosage_to_probs(entry.value),
                None => hardcall_probs(record.genotypes.code(s)),
            };
            for p in probs {
                scratch.raw.extend_from_slice(&(p as u16).to_le_bytes());
            }
        }
        if self.compressed {
            scratch.deflate_raw(ZLIB_LEVEL)?;
            let c = checked_u32(scratch.compressed.len(), "compressed genotype block")?;
            out.extend_from_slice(&c.to_le_bytes());
            out.extend_from_slice(&scratch.compressed);
        } else {
            out.extend_from_slice(&scratch.raw);
        }
        Ok(())
    }
}

/// BGEN v1.2 / v1.3 layout-2 encoder
#[derive(Clone, Debug)]
pub struct Bgen13Encoder {
    ref_first: bool,
    minor_version: u8,
    compression: BgenCompression,
    tables: BgenTables,
}

impl Bgen13Encoder {
    /// `minor_version` is 2 or 3; v1.2 only allows zlib or no compression
    pub fn new(
        ref_first: bool,
        minor_version: u8,
        bits: u8,
        compression: BgenCompression,
    ) -> Result<Self> {
        if minor_version == 2 && compression == BgenCompression::Zstd {
            return Err(ExportError::config("zstd compression requires BGEN v1.3"));
        }
        Ok(Self {
            ref_first,
            minor_version,
            compression,
            tables: BgenTables::build(bits)?,
        })
    }

    pub fn bits(&self) -> u8 {
        self.tables.bits()
    }

    pub fn compression(&self) -> BgenCompression {
        self.compression
    }

    fn raw_len(&self, sample_ct: usize) -> usize {
        10 + sample_ct + (sample_ct * 2 * self.tables.bits() as usize).div_ceil(8)
    }

    /// A variant is written phased when every sample's haplotypes can be
    /// told apart: unphased het hardcalls and unphased fractional dosages
    /// force the unphased layout.
    fn is_phased(record: &VariantRecord) -> bool {
        let g = &record.genotypes;
        let d = &record.dosage;
        if !g.phase.any() && d.dphase_present.not_any() {
            return false;
        }
        let mut cursor = d.cursor();
        for s in 0..record.sample_ct() {
            let phased_call = g.phase.present[s];
            match cursor.next_for(s) {
                Some(entry) => {
                    let fractional = entry.value != 0 && entry.value != 32768;
                    if fractional && entry.dphase.is_none() && !phased_call {
                        return false;
                    }
                }
                None => {
                    if g.code(s) == HET && !phased_call {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn write_unphased(&self, record: &VariantRecord, w: &mut BitWriter<'_>) {
        let g = &record.genotypes;
        let n = record.sample_ct();
        let b = self.tables.bits() as u32;
        if record.dosage.is_empty() {
            let words = g.codes.words();
            for p in 0..n / 2 {
                let nibble = (words[p / 16] >> (4 * (p % 16))) & 0xF;
                w.push(self.tables.unphased_pair(nibble as u8), 4 * b);
            }
            if n % 2 == 1 {
                w.push(self.tables.unphased_single(g.code(n - 1)), 2 * b);
            }
            return;
        }
        let mut cursor = record.dosage.cursor();
        for s in 0..n {
            match cursor.next_for(s) {
                Some(entry) => {
                    let q = quantize(&dosage_to_probs(entry.value), self.tables.bits());
                    w.push(q[0] as u64 | ((q[1] as u64) << b), 2 * b);
                }
                None => w.push(self.tables.unphased_single(g.code(s)), 2 * b),
            }
        }
    }

    fn write_phased(&self, record: &VariantRecord, w: &mut BitWriter<'_>) {
        let g = &record.genotypes;
        let b = self.tables.bits() as u32;
        let mut cursor = record.dosage.cursor();
        for s in 0..record.sample_ct() {
            let present = g.phase.present[s];
            let orientation = g.phase.orientation[s];
            match cursor.next_for(s) {
                Some(entry) => {
                    let d = entry.value as i32;
                    let delta = match entry.dphase {
                        Some(delta) => delta as i32,
                        None if present => {
                            let m = d.min(32768 - d);
                            if orientation {
                                m
                            } else {
                                -m
                            }
                        }
                        None => 0,
                    };
                    let h1 = (d + delta) as u32;
                    let h2 = (d - delta) as u32;
                    let q1 = quantize(&[32768 - h1, h1], self.tables.bits());
                    let q2 = quantize(&[32768 - h2, h2], self.tables.bits());
                    w.push(q1[0] as u64 | ((q2[0] as u64) << b), 2 * b);
                }
                None => w.push(self.tables.phased(g.code(s), present, orientation), 2 * b),
            }
        }
    }
}

impl FormatEncoder for Bgen13Encoder {
    fn name(&self) -> &'static str {
        if self.minor_version == 2 {
            "bgen-1.2"
        } else {
            "bgen-1.3"
        }
    }

    fn required_decode_features(&self) -> DecodeFeatures {
        DecodeFeatures {
            phase: true,
            dosage: true,
            multiallelic: false,
        }
    }

    fn alt_first(&self) -> bool {
        !self.ref_first
    }

    fn max_encoded_len(&self, sample_ct: usize) -> usize {
        let raw = self.raw_len(sample_ct);
        8 + match self.compression {
            BgenCompression::None => raw,
            BgenCompression::Zlib => zlib_bound(raw),
            BgenCompression::Zstd => zstd_bound(raw),
        }
    }

    fn encode_variant(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if !vctx.ploidy.is_diploid() {
            let ploidy_of = |s: usize| vctx.ploidy.sample_ploidy(vctx.sexes[s]);
            if let Some(s) = (0..record.sample_ct()).find(|&s| ploidy_of(s) != 2) {
                return Err(ExportError::unsupported(format!(
                    "{} export of a sample with ploidy {} (sample {}, variant '{}')",
                    self.name(),
                    ploidy_of(s),
                    s + 1,
                    vctx.label()
                )));
            }
        }
        require_biallelic(self.name(), vctx)?;

        let n = record.sample_ct();
        let phased = Self::is_phased(record);
        let raw = &mut scratch.raw;
        raw.clear();
        raw.reserve(self.raw_len(n));
        raw.extend_from_slice(&checked_u32(n, "sample count")?.to_le_bytes());
        raw.extend_from_slice(&2u16.to_le_bytes());
        raw.push(2);
        raw.push(2);
        let missing_ct = record.genotypes.codes.count_value(MISSING);
        if missing_ct == 0 {
            raw.resize(raw.len() + n, 2);
        } else {
            let dosage_present: &BitSlice<u64, Lsb0> = &record.dosage.present;
            for s in 0..n {
                let missing = record.genotypes.code(s) == MISSING && !dosage_present[s];
                raw.push(if missing { 0x82 } else { 0x02 });
            }
        }
        raw.push(phased as u8);
        raw.push(self.tables.bits());

        let mut w = BitWriter::new(raw);
        if phased {
            self.write_phased(record, &mut w);
        } else {
            self.write_unphased(record, &mut w);
        }
        w.finish();

        let d = checked_u32(scratch.raw.len(), "genotype block")?;
        match self.compression {
            BgenCompression::None => {
                out.extend_from_slice(&d.to_le_bytes());
                out.extend_from_slice(&scratch.raw);
                return Ok(());
            }
            BgenCompression::Zlib => scratch.deflate_raw(ZLIB_LEVEL)?,
            BgenCompression::Zstd => scratch.zstd_raw(ZSTD_LEVEL)?,
        }
        let c = checked_u32(scratch.compressed.len() + 4, "compressed genotype block")?;
        out.extend_from_slice(&c.to_le_bytes());
        out.extend_from_slice(&d.to_le_bytes());
        out.extend_from_slice(&scratch.compressed);
        Ok(())
    }
}
