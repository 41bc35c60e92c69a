//! # Format Encoders
//!
//! One encoder per output format turns a decoded, allele-oriented variant
//! into the per-variant payload of that format. Encoders are built once
//! before any worker starts and are shared read-only across workers; each
//! worker brings its own [`EncodeScratch`].
//!
//! ## Allele orientation
//! Every format prints either REF or ALT first. The pipeline flips each record
//! before encoding so that code 0 always means "homozygous for the allele
//! printed first"; encoders never look at the REF choice themselves.
//!
//! ## What encoders do not write
//! Variant metadata (CHROM/POS/ID/alleles, BGEN variant id blocks) and file
//! headers belong to the output writers in `io`. Encoders only produce the
//! sample-dependent part.

pub mod bed;
pub mod bgen;
pub mod oxford;
pub mod vcf;

use crate::data::{PloidyContext, Sex, Variant, VariantRecord};
use crate::error::{ExportError, Result};
use crate::io::source::DecodeFeatures;

pub use bed::BedEncoder;
pub use bgen::{Bgen11Encoder, Bgen13Encoder, BgenCompression};
pub use oxford::{GenEncoder, HapsEncoder};
pub use vcf::{VcfDosageMode, VcfEncoder, VcfFields};

/// Per-variant inputs besides the record itself
#[derive(Clone, Copy, Debug)]
pub struct VariantContext<'a> {
    /// Position in the export order
    pub export_idx: usize,
    pub variant: &'a Variant,
    pub ploidy: PloidyContext,
    /// Sex of each exported sample (in this pass)
    pub sexes: &'a [Sex],
}

impl VariantContext<'_> {
    /// Variant id for error messages
    pub fn label(&self) -> String {
        if self.variant.id.is_empty() || self.variant.id == "." {
            format!("#{}", self.export_idx + 1)
        } else {
            self.variant.id.clone()
        }
    }
}

/// Per-thread reusable encoding buffers
pub struct EncodeScratch {
    /// Uncompressed payload under construction
    pub raw: Vec<u8>,
    /// Compressor output
    pub compressed: Vec<u8>,
    zstd: Option<zstd::bulk::Compressor<'static>>,
}

impl EncodeScratch {
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            compressed: Vec::new(),
            zstd: None,
        }
    }

    /// zlib-compress `raw` into `compressed`
    pub fn deflate_raw(&mut self, level: u32) -> Result<()> {
        use std::io::Write;
        self.compressed.clear();
        let mut encoder = flate2::write::ZlibEncoder::new(
            std::mem::take(&mut self.compressed),
            flate2::Compression::new(level),
        );
        encoder.write_all(&self.raw)?;
        self.compressed = encoder.finish()?;
        Ok(())
    }

    /// zstd-compress `raw` into `compressed`, reusing this thread's context
    pub fn zstd_raw(&mut self, level: i32) -> Result<()> {
        if self.zstd.is_none() {
            self.zstd = Some(zstd::bulk::Compressor::new(level)?);
        }
        self.compressed.clear();
        self.compressed
            .reserve(zstd::zstd_safe::compress_bound(self.raw.len()));
        if let Some(compressor) = self.zstd.as_mut() {
            compressor.compress_to_buffer(&self.raw, &mut self.compressed)?;
        }
        Ok(())
    }
}

impl Default for EncodeScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Worst-case zlib output size for `n` input bytes
pub fn zlib_bound(n: usize) -> usize {
    n + (n >> 12) + (n >> 14) + (n >> 25) + 13
}

/// Worst-case zstd output size for `n` input bytes
pub fn zstd_bound(n: usize) -> usize {
    zstd::zstd_safe::compress_bound(n)
}

/// Contract every output format implements
pub trait FormatEncoder: Sync {
    /// Format name for logs and errors
    fn name(&self) -> &'static str;

    /// Decode channels this format consumes
    fn required_decode_features(&self) -> DecodeFeatures;

    /// Whether the format prints ALT before REF
    fn alt_first(&self) -> bool;

    /// Upper bound on one variant's payload for `sample_ct` samples
    fn max_encoded_len(&self, sample_ct: usize) -> usize;

    /// Append the payload of one variant to `out`
    fn encode_variant(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()>;
}

/// The closed set of output encoders
pub enum Encoder {
    Vcf(VcfEncoder),
    Bgen11(Bgen11Encoder),
    Bgen13(Bgen13Encoder),
    OxfordGen(GenEncoder),
    Haps(HapsEncoder),
    Bed(BedEncoder),
}

impl FormatEncoder for Encoder {
    fn name(&self) -> &'static str {
        match self {
            Encoder::Vcf(e) => e.name(),
            Encoder::Bgen11(e) => e.name(),
            Encoder::Bgen13(e) => e.name(),
            Encoder::OxfordGen(e) => e.name(),
            Encoder::Haps(e) => e.name(),
            Encoder::Bed(e) => e.name(),
        }
    }

    fn required_decode_features(&self) -> DecodeFeatures {
        match self {
            Encoder::Vcf(e) => e.required_decode_features(),
            Encoder::Bgen11(e) => e.required_decode_features(),
            Encoder::Bgen13(e) => e.required_decode_features(),
            Encoder::OxfordGen(e) => e.required_decode_features(),
            Encoder::Haps(e) => e.required_decode_features(),
            Encoder::Bed(e) => e.required_decode_features(),
        }
    }

    fn alt_first(&self) -> bool {
        match self {
            Encoder::Vcf(e) => e.alt_first(),
            Encoder::Bgen11(e) => e.alt_first(),
            Encoder::Bgen13(e) => e.alt_first(),
            Encoder::OxfordGen(e) => e.alt_first(),
            Encoder::Haps(e) => e.alt_first(),
            Encoder::Bed(e) => e.alt_first(),
        }
    }

    fn max_encoded_len(&self, sample_ct: usize) -> usize {
        match self {
            Encoder::Vcf(e) => e.max_encoded_len(sample_ct),
            Encoder::Bgen11(e) => e.max_encoded_len(sample_ct),
            Encoder::Bgen13(e) => e.max_encoded_len(sample_ct),
            Encoder::OxfordGen(e) => e.max_encoded_len(sample_ct),
            Encoder::Haps(e) => e.max_encoded_len(sample_ct),
            Encoder::Bed(e) => e.max_encoded_len(sample_ct),
        }
    }

    fn encode_variant(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        match self {
            Encoder::Vcf(e) => e.encode_variant(vctx, record, scratch, out),
            Encoder::Bgen11(e) => e.encode_variant(vctx, record, scratch, out),
            Encoder::Bgen13(e) => e.encode_variant(vctx, record, scratch, out),
            Encoder::OxfordGen(e) => e.encode_variant(vctx, record, scratch, out),
            Encoder::Haps(e) => e.encode_variant(vctx, record, scratch, out),
            Encoder::Bed(e) => e.encode_variant(vctx, record, scratch, out),
        }
    }
}

/// Reject variants with more than two alleles
pub(crate) fn require_biallelic(format: &str, vctx: &VariantContext<'_>) -> Result<()> {
    if vctx.variant.allele_ct() > 2 {
        return Err(ExportError::unsupported(format!(
            "{} export of multiallelic variant '{}' ({} alleles)",
            format,
            vctx.label(),
            vctx.variant.allele_ct()
        )));
    }
    Ok(())
}

/// Diploid genotype probabilities in 1/32768 units from a dosage in 1/16384
/// allele copies: `[P(first/first), P(first/second), P(second/second)]`
#[inline]
pub fn dosage_to_probs(d: u16) -> [u32; 3] {
    let d = d as u32;
    if d <= 16384 {
        [32768 - 2 * d, 2 * d, 0]
    } else {
        [0, 65536 - 2 * d, 2 * d - 32768]
    }
}

/// Hardcall probabilities in 1/32768 units; missing is all zero
#[inline]
pub fn hardcall_probs(code: u8) -> [u32; 3] {
    match code {
        0 => [32768, 0, 0],
        1 => [0, 32768, 0],
        2 => [0, 0, 32768],
        _ => [0, 0, 0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dosage_to_probs_endpoints() {
        assert_eq!(dosage_to_probs(0), [32768, 0, 0]);
        assert_eq!(dosage_to_probs(16384), [0, 32768, 0]);
        assert_eq!(dosage_to_probs(32768), [0, 0, 32768]);
        assert_eq!(dosage_to_probs(8192), [16384, 16384, 0]);
        for d in (0..=32768u16).step_by(97) {
            assert_eq!(dosage_to_probs(d).iter().sum::<u32>(), 32768);
        }
    }

    #[test]
    fn test_scratch_compressors_round_trip() {
        use std::io::Read;
        let mut scratch = EncodeScratch::new();
        scratch.raw = (0..5000u32).map(|i| (i % 7) as u8).collect();
        scratch.deflate_raw(6).unwrap();
        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(&scratch.compressed[..])
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, scratch.raw);
        assert!(scratch.compressed.len() <= zlib_bound(scratch.raw.len()));

        scratch.zstd_raw(3).unwrap();
        let unpacked = zstd::decode_all(&scratch.compressed[..]).unwrap();
        assert_eq!(unpacked, scratch.raw);
    }
}
