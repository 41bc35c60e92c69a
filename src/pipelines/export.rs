//! # Export Pipeline
//!
//! Entry point of a run. `export` builds the encoder for the requested
//! format, plans blocks against the memory budget, then drives the block
//! scheduler. Variant-major formats go through the record path here; the
//! sample-major BED goes through [`transpose`](super::transpose).
//!
//! ## Record path
//! Each worker appends the payloads of its slice to one [`EncodedChunk`] and
//! remembers where each payload ends. The flush walks the chunks of a block
//! in part order, so output order is export order whatever thread finished
//! first.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{info, info_span};

use crate::data::{ChromTable, PloidyContext, SampleTable, VariantRecord, VariantTable};
use crate::error::{ExportError, Result};
use crate::export::{
    Bgen11Encoder, Bgen13Encoder, BgenCompression, BedEncoder, EncodeScratch, Encoder, FormatEncoder, GenEncoder,
    HapsEncoder, VariantContext, VcfDosageMode, VcfEncoder, VcfFields,
};
use crate::io::sink::{with_suffix, ExportMeta, RecordWriter};
use crate::io::source::{GenotypeSource, SourceInfo};
use crate::io::{BgenLayout, BgenRecordWriter, GenRecordWriter, HapsRecordWriter, VcfRecordWriter};
use crate::model::MissingCounts;
use crate::pipelines::context::{plan_blocks, ExportOptions, MemoryPlan, PipelineContext};
use crate::pipelines::scheduler::{run_blocks, BlockWorker};
use crate::pipelines::transpose;
use crate::utils::telemetry::Stage;
use crate::utils::{effective_thread_count, ThreadWorkspace};

/// Output format and its format-specific options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Vcf {
        dosage: VcfDosageMode,
        gp: bool,
        /// BGZF-compress into `.vcf.gz`
        bgz: bool,
    },
    Bgen11 {
        ref_first: bool,
    },
    Bgen12 {
        ref_first: bool,
        bits: u8,
    },
    Bgen13 {
        ref_first: bool,
        bits: u8,
        compression: BgenCompression,
    },
    Oxford {
        ref_first: bool,
    },
    Haps {
        ref_first: bool,
        /// `.hap` + `.legend` instead of `.haps`
        legend: bool,
    },
    IndMajorBed,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Vcf { .. } => "vcf",
            ExportFormat::Bgen11 { .. } => "bgen-1.1",
            ExportFormat::Bgen12 { .. } => "bgen-1.2",
            ExportFormat::Bgen13 { .. } => "bgen-1.3",
            ExportFormat::Oxford { .. } => "oxford",
            ExportFormat::Haps { legend: false, .. } => "haps",
            ExportFormat::Haps { legend: true, .. } => "hapslegend",
            ExportFormat::IndMajorBed => "ind-major-bed",
        }
    }

    /// Build the encoder; VCF fields are decided here, once per export
    pub fn encoder(&self, info: &SourceInfo) -> Result<Encoder> {
        Ok(match *self {
            ExportFormat::Vcf { dosage, gp, .. } => {
                Encoder::Vcf(VcfEncoder::new(VcfFields::decide(dosage, gp, info), info.provenance))
            }
            ExportFormat::Bgen11 { ref_first } => Encoder::Bgen11(Bgen11Encoder::new(ref_first, true)),
            ExportFormat::Bgen12 { ref_first, bits } => {
                Encoder::Bgen13(Bgen13Encoder::new(ref_first, 2, bits, BgenCompression::Zlib)?)
            }
            ExportFormat::Bgen13 {
                ref_first,
                bits,
                compression,
            } => Encoder::Bgen13(Bgen13Encoder::new(ref_first, 3, bits, compression)?),
            ExportFormat::Oxford { ref_first } => Encoder::OxfordGen(GenEncoder::new(ref_first)),
            ExportFormat::Haps { ref_first, legend } => Encoder::Haps(HapsEncoder::new(ref_first, legend)),
            ExportFormat::IndMajorBed => Encoder::Bed(BedEncoder::new()),
        })
    }

    /// Only VCF can carry more than one ALT allele
    fn allows_multiallelic(&self) -> bool {
        matches!(self, ExportFormat::Vcf { .. })
    }

    fn open_writer(&self, prefix: &Path, info: &SourceInfo, options: &ExportOptions) -> Result<Box<dyn RecordWriter>> {
        Ok(match *self {
            ExportFormat::Vcf { dosage, gp, bgz } => {
                let path = with_suffix(prefix, if bgz { "vcf.gz" } else { "vcf" });
                let fields = VcfFields::decide(dosage, gp, info);
                Box::new(VcfRecordWriter::create(&path, fields)?.with_passthrough(options.vcf_passthrough.clone()))
            }
            ExportFormat::Bgen11 { .. } => {
                Box::new(BgenRecordWriter::create(prefix, BgenLayout::V11 { compressed: true })?)
            }
            ExportFormat::Bgen12 { .. } => Box::new(BgenRecordWriter::create(
                prefix,
                BgenLayout::V12 {
                    compression: BgenCompression::Zlib,
                },
            )?),
            ExportFormat::Bgen13 { compression, .. } => {
                Box::new(BgenRecordWriter::create(prefix, BgenLayout::V12 { compression })?)
            }
            ExportFormat::Oxford { .. } => Box::new(GenRecordWriter::create(prefix)?),
            ExportFormat::Haps { legend, .. } => Box::new(HapsRecordWriter::create(prefix, legend)?),
            ExportFormat::IndMajorBed => {
                return Err(ExportError::config("the sample-major BED has no record writer"));
            }
        })
    }
}

/// What one export did
#[derive(Clone, Debug)]
pub struct ExportSummary {
    pub format: &'static str,
    pub variant_ct: usize,
    pub sample_ct: usize,
    pub threads: usize,
    /// Sample passes over the source (more than one only for a BED under a
    /// tight memory limit)
    pub passes: usize,
    pub blocks: usize,
    pub files: Vec<PathBuf>,
    pub missing: MissingCounts,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} variants x {} samples, {} thread(s), {} block(s), {} pass(es)",
            self.format, self.variant_ct, self.sample_ct, self.threads, self.blocks, self.passes
        )
    }
}

/// Payloads of one worker's slice, back to back
#[derive(Debug, Default)]
pub struct EncodedChunk {
    pub bytes: Vec<u8>,
    /// End offset of each variant's payload in `bytes`
    pub ends: Vec<usize>,
}

impl EncodedChunk {
    /// Payloads in order
    pub fn payloads(&self) -> impl Iterator<Item = &[u8]> {
        let starts = std::iter::once(0).chain(self.ends.iter().copied());
        starts.zip(&self.ends).map(|(start, &end)| &self.bytes[start..end])
    }
}

struct RecordWorker<'e> {
    encoder: &'e Encoder,
}

impl BlockWorker for RecordWorker<'_> {
    type Output = EncodedChunk;

    fn begin(&self, out: &mut EncodedChunk, part: &Range<usize>) {
        out.bytes.clear();
        out.ends.clear();
        out.ends.reserve(part.len());
    }

    fn process(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        scratch: &mut EncodeScratch,
        out: &mut EncodedChunk,
    ) -> Result<()> {
        self.encoder.encode_variant(vctx, record, scratch, &mut out.bytes)?;
        out.ends.push(out.bytes.len());
        Ok(())
    }
}

fn validate_selection(
    info: &SourceInfo,
    samples: &SampleTable,
    variants: &VariantTable,
    format: &ExportFormat,
) -> Result<()> {
    if let Some(s) = samples.iter().find(|s| s.raw_idx.as_usize() >= info.raw_sample_ct) {
        return Err(ExportError::config(format!(
            "sample '{}' has raw index {} but the source holds {} samples",
            s.output_id(),
            s.raw_idx.as_usize(),
            info.raw_sample_ct
        )));
    }
    if let Some(v) = variants.iter().find(|v| v.raw_idx >= info.raw_variant_ct) {
        return Err(ExportError::config(format!(
            "variant '{}' has raw index {} but the source holds {} variants",
            v.id, v.raw_idx, info.raw_variant_ct
        )));
    }
    if !format.allows_multiallelic() {
        if let Some(v) = variants.iter().find(|v| v.allele_ct() > 2) {
            return Err(ExportError::unsupported(format!(
                "{} export of multiallelic variant '{}' ({} alleles)",
                format.name(),
                v.id,
                v.allele_ct()
            )));
        }
    }
    Ok(())
}

/// Missing counts with the variant totals the rates are taken over
pub(crate) fn missing_totals(variants: &VariantTable, chroms: &ChromTable, sample_ct: usize) -> MissingCounts {
    let mut missing = MissingCounts::new(sample_ct);
    missing.variant_ct = variants.len() as u64;
    missing.chr_y_variant_ct = variants
        .iter()
        .filter(|v| chroms.ploidy_context(v.chrom) == PloidyContext::ChrY)
        .count() as u64;
    missing
}

/// Export `variants` x `samples` of `source` as `format` under `out_prefix`.
///
/// Samples and variants are exported in table order, which is storage
/// order. On error nothing is cleaned up; files already written stay behind
/// and must be treated as incomplete.
pub fn export<S: GenotypeSource>(
    source: &S,
    samples: &SampleTable,
    variants: &VariantTable,
    chroms: &ChromTable,
    format: &ExportFormat,
    out_prefix: &Path,
    options: &ExportOptions,
) -> Result<ExportSummary> {
    let info = source.info();
    validate_selection(&info, samples, variants, format)?;

    let encoder = format.encoder(&info)?;
    let threads = effective_thread_count(options.threads, variants.len());
    let telemetry = options.telemetry.as_deref();
    let ctx = PipelineContext {
        source,
        samples,
        variants,
        chroms,
        features: encoder.required_decode_features(),
        alt_first: encoder.alt_first(),
        threads,
        telemetry,
    };
    info!(
        format = format.name(),
        variants = variants.len(),
        samples = samples.len(),
        threads,
        "starting export"
    );

    if let ExportFormat::IndMajorBed = format {
        let mem = MemoryPlan::for_transpose(
            options.memory_limit,
            options.read_block_size,
            source.staged_bytes_per_variant(),
            samples.len(),
            variants.len(),
        )?;
        let plans = plan_blocks(variants, mem.read_block_size);
        let (files, missing) = transpose::export_sample_major(&ctx, &mem, &plans, out_prefix, options.memory_limit)?;
        return Ok(ExportSummary {
            format: format.name(),
            variant_ct: variants.len(),
            sample_ct: samples.len(),
            threads,
            passes: mem.passes,
            blocks: plans.len(),
            files,
            missing,
        });
    }

    let mem = MemoryPlan::for_records(
        options.memory_limit,
        options.read_block_size,
        source.staged_bytes_per_variant(),
        encoder.max_encoded_len(samples.len()),
        samples.len(),
    )?;
    let plans = plan_blocks(variants, mem.read_block_size);
    if let Some(t) = telemetry {
        t.set_stage(Stage::Exporting);
        t.set_totals(1, plans.len() as u64, variants.len() as u64);
    }

    let meta = ExportMeta {
        samples,
        variants,
        chroms,
        alt_first: ctx.alt_first,
    };
    let mut writer = format.open_writer(out_prefix, &info, options)?;
    writer.write_header(&meta)?;

    let subset = samples.subset();
    let mut workspaces = ThreadWorkspace::for_threads(threads, samples.len());
    let worker = RecordWorker { encoder: &encoder };
    run_blocks(&ctx, &subset, &plans, &worker, 1, &mut workspaces, |_plan, outputs| {
        for (part, chunk) in outputs.iter() {
            debug_assert_eq!(chunk.ends.len(), part.len());
            for (export_idx, payload) in part.clone().zip(chunk.payloads()) {
                writer.write_record(&meta, variants.get(export_idx), payload)?;
            }
        }
        Ok(())
    })?;

    let mut missing = missing_totals(variants, chroms, samples.len());
    for ws in &mut workspaces {
        missing.merge(0, std::slice::from_mut(&mut ws.missing));
    }

    if let Some(t) = telemetry {
        t.set_stage(Stage::WritingCompanions);
    }
    let files = info_span!("write_companions").in_scope(|| writer.finish(&meta, &missing))?;

    Ok(ExportSummary {
        format: format.name(),
        variant_ct: variants.len(),
        sample_ct: samples.len(),
        threads,
        passes: 1,
        blocks: plans.len(),
        files,
        missing,
    })
}
