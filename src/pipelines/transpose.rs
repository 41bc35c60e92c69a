//! # Sample-Major BED Export
//!
//! Workers encode their slice of a block as variant-major PLINK1 rows and
//! transpose them into a tile holding one sample-major row fragment per
//! sample. The coordinator ORs each tile into the pass's sample rows, which
//! are written out once every block of the pass has been flushed.
//!
//! When the rows of all samples do not fit the memory limit the source is
//! read once per sample pass; pass `k` exports samples
//! `k * samples_per_pass ..`, and its rows follow those of pass `k - 1`
//! in the `.bed`.

use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{debug, info_span};

use crate::data::VariantRecord;
use crate::error::{ExportError, Result};
use crate::export::{BedEncoder, EncodeScratch, FormatEncoder, VariantContext};
use crate::io::plink1::{write_bim, write_fam, BED_MAGIC, SAMPLE_MAJOR};
use crate::io::sink::{create_output, with_suffix, ExportMeta};
use crate::io::source::GenotypeSource;
use crate::model::{transpose_tile, MissingCounts};
use crate::pipelines::context::{BlockPlan, MemoryPlan, PipelineContext};
use crate::pipelines::export::missing_totals;
use crate::pipelines::scheduler::{run_blocks, BlockWorker};
use crate::utils::telemetry::Stage;
use crate::utils::ThreadWorkspace;

/// One worker's slice, first as variant-major rows, then as a tile
#[derive(Debug, Default)]
pub struct TileChunk {
    /// Variant-major rows of the slice
    rows: Vec<u8>,
    /// Variants encoded
    n: usize,
    /// Export index of the first variant
    first: usize,
    /// Column of the first variant within its output byte
    lead: usize,
    /// Sample-major tile, `tile_row_bytes` per sample
    tile: Vec<u8>,
    tile_row_bytes: usize,
}

impl TileChunk {
    /// OR the tile into `out`, which holds `sample_ct` rows of
    /// `out_row_bytes` bytes
    fn merge_into(&self, out: &mut [u8], out_row_bytes: usize) {
        if self.n == 0 {
            return;
        }
        let byte_offset = (self.first - self.lead) / 4;
        for (dst_row, src_row) in out
            .chunks_exact_mut(out_row_bytes)
            .zip(self.tile.chunks_exact(self.tile_row_bytes))
        {
            for (d, &s) in dst_row[byte_offset..byte_offset + self.tile_row_bytes].iter_mut().zip(src_row) {
                *d |= s;
            }
        }
    }
}

struct TransposeWorker {
    encoder: BedEncoder,
    sample_ct: usize,
}

impl BlockWorker for TransposeWorker {
    type Output = TileChunk;

    fn begin(&self, out: &mut TileChunk, part: &Range<usize>) {
        out.rows.clear();
        out.n = 0;
        out.first = part.start;
        out.lead = part.start % 4;
    }

    fn process(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        scratch: &mut EncodeScratch,
        out: &mut TileChunk,
    ) -> Result<()> {
        self.encoder.encode_variant(vctx, record, scratch, &mut out.rows)?;
        out.n += 1;
        Ok(())
    }

    fn finish(&self, out: &mut TileChunk, _part: &Range<usize>) -> Result<()> {
        out.tile_row_bytes = transpose_tile(
            &out.rows,
            BedEncoder::row_bytes(self.sample_ct),
            self.sample_ct,
            out.n,
            out.lead,
            &mut out.tile,
        );
        Ok(())
    }
}

/// Write `.bed` (sample-major) + `.bim` + `.fam`.
///
/// Returns the written paths and the per-sample missing counts.
pub(crate) fn export_sample_major<S: GenotypeSource>(
    ctx: &PipelineContext<'_, S>,
    mem: &MemoryPlan,
    plans: &[BlockPlan],
    prefix: &Path,
    memory_limit: Option<usize>,
) -> Result<(Vec<PathBuf>, MissingCounts)> {
    let sample_ct = ctx.samples.len();
    let variant_ct = ctx.variants.len();
    let out_row_bytes = variant_ct.div_ceil(4);
    if let Some(t) = ctx.telemetry {
        t.set_stage(Stage::TransposePass);
        t.set_totals(mem.passes as u64, plans.len() as u64, variant_ct as u64);
    }

    let bed_path = with_suffix(prefix, "bed");
    let mut bed = create_output(&bed_path)?;
    bed.write_all(&BED_MAGIC)?;
    bed.write_all(&[SAMPLE_MAJOR])?;

    // the first pass is the widest
    let needed = mem.samples_per_pass.min(sample_ct) * out_row_bytes;
    let mut rows: Vec<u8> = Vec::new();
    rows.try_reserve_exact(needed)
        .map_err(|_| ExportError::out_of_memory("sample-major rows", needed, memory_limit.unwrap_or(needed)))?;

    let mut missing = missing_totals(ctx.variants, ctx.chroms, sample_ct);
    for pass in 0..mem.passes {
        let range = mem.pass_range(pass, sample_ct);
        let pass_ct = range.len();
        let _span = info_span!("transpose_pass", pass, samples = pass_ct).entered();
        if let Some(t) = ctx.telemetry {
            t.set_pass(pass as u64 + 1);
        }

        let subset = ctx.samples.subset_range(range.start, range.end);
        rows.clear();
        rows.resize(pass_ct * out_row_bytes, 0);
        let mut workspaces = ThreadWorkspace::for_threads(ctx.threads, pass_ct);
        let worker = TransposeWorker {
            encoder: BedEncoder::new(),
            sample_ct: pass_ct,
        };
        run_blocks(ctx, &subset, plans, &worker, 4, &mut workspaces, |_plan, outputs| {
            for (_, chunk) in outputs.iter() {
                chunk.merge_into(&mut rows, out_row_bytes);
            }
            Ok(())
        })?;

        for ws in &mut workspaces {
            missing.merge(range.start, std::slice::from_mut(&mut ws.missing));
        }
        bed.write_all(&rows)?;
        debug!(pass, samples = pass_ct, "sample pass written");
    }
    bed.flush()?;

    if let Some(t) = ctx.telemetry {
        t.set_stage(Stage::WritingCompanions);
    }
    let meta = ExportMeta {
        samples: ctx.samples,
        variants: ctx.variants,
        chroms: ctx.chroms,
        alt_first: ctx.alt_first,
    };
    let bim_path = with_suffix(prefix, "bim");
    let fam_path = with_suffix(prefix, "fam");
    write_bim(&bim_path, &meta)?;
    write_fam(&fam_path, &meta)?;
    Ok((vec![bed_path, bim_path, fam_path], missing))
}
