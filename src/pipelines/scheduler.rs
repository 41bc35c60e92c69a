//! # Block Scheduler
//!
//! Runs a plan of blocks on a named rayon pool. While the workers compute
//! block n, the calling thread stages block n+1 and flushes block n-1:
//!
//! ```text
//! stage(0)
//! spawn workers(n) -> stage(n+1) -> flush(n-1) -> join(n) -> swap both buffers
//! ```
//!
//! Staged input and encoded output are both double buffered. Workers never
//! touch files and the coordinator never decodes. Each worker owns a
//! contiguous slice of the block and one [`ThreadWorkspace`]; results land
//! in that worker's output slot, so the flush can walk variants in export
//! order no matter which thread finished first.
//!
//! The first error from any worker, from staging or from the flush is
//! latched. Every spawned worker is joined before the error is returned,
//! and no further block is started.

use std::ops::Range;

use tracing::{debug, info_span};

use crate::data::{PloidyContext, SampleSubset, VariantRecord};
use crate::error::{ExportError, Result};
use crate::export::{EncodeScratch, VariantContext};
use crate::io::source::GenotypeSource;
use crate::pipelines::context::{BlockPlan, PipelineContext};
use crate::utils::{build_thread_pool, DoubleBuffer, ErrorLatch, ThreadWorkspace};

/// Per-variant work plugged into the scheduler
pub trait BlockWorker: Sync {
    /// What one worker produces for its slice of a block
    type Output: Send + Default;

    /// Prepare `out` for the export indices in `part`
    fn begin(&self, out: &mut Self::Output, part: &Range<usize>);

    /// Consume one decoded, oriented variant
    fn process(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        scratch: &mut EncodeScratch,
        out: &mut Self::Output,
    ) -> Result<()>;

    /// Called once after the last variant of `part`
    fn finish(&self, _out: &mut Self::Output, _part: &Range<usize>) -> Result<()> {
        Ok(())
    }
}

/// Worker slices of one block and what each produced
#[derive(Debug, Default)]
pub struct BlockOutputs<O> {
    /// Export index range per worker, in order
    pub parts: Vec<Range<usize>>,
    pub outputs: Vec<O>,
}

impl<O: Default> BlockOutputs<O> {
    pub fn new(n_threads: usize) -> Self {
        Self {
            parts: Vec::with_capacity(n_threads),
            outputs: (0..n_threads).map(|_| O::default()).collect(),
        }
    }

    /// `(part, output)` pairs in export order, skipping idle workers
    pub fn iter(&self) -> impl Iterator<Item = (&Range<usize>, &O)> {
        self.parts.iter().zip(&self.outputs).filter(|(p, _)| !p.is_empty())
    }
}

/// Split `len` variants starting at export index `base` across `n_threads`.
///
/// Bounds are `i * len / n_threads`. With `granularity > 1` every internal
/// bound is rounded down to an absolute multiple of `granularity`, so only
/// the first and last slices can be ragged. Slices may be empty.
pub fn partition(len: usize, n_threads: usize, granularity: usize, base: usize) -> Vec<Range<usize>> {
    let n_threads = n_threads.max(1);
    let g = granularity.max(1);
    let end = base + len;
    let mut bounds = Vec::with_capacity(n_threads + 1);
    bounds.push(base);
    for i in 1..n_threads {
        let b = base + i * len / n_threads;
        let rounded = (b - b % g).max(base);
        let prev = bounds[bounds.len() - 1];
        bounds.push(rounded.max(prev));
    }
    bounds.push(end);
    bounds.windows(2).map(|w| w[0]..w[1]).collect()
}

fn stage<S: GenotypeSource>(
    ctx: &PipelineContext<'_, S>,
    block_idx: usize,
    plan: &BlockPlan,
    into: &mut S::Block,
) -> Result<()> {
    info_span!("stage_block", block = block_idx, raw_start = plan.raw_range.start)
        .in_scope(|| ctx.source.stage_block(plan.raw_range.clone(), into))
}

/// Run every block of `plans`; `flush` receives each finished block in order.
///
/// `workspaces` must hold one workspace per thread, sized for `samples`.
pub fn run_blocks<S, W, F>(
    ctx: &PipelineContext<'_, S>,
    samples: &SampleSubset,
    plans: &[BlockPlan],
    worker: &W,
    granularity: usize,
    workspaces: &mut [ThreadWorkspace],
    mut flush: F,
) -> Result<()>
where
    S: GenotypeSource,
    W: BlockWorker,
    F: FnMut(&BlockPlan, &BlockOutputs<W::Output>) -> Result<()>,
{
    let n_threads = workspaces.len().max(1);
    let blocks: Vec<(usize, &BlockPlan)> = plans
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_empty())
        .collect();
    let Some(&(first_idx, first)) = blocks.first() else {
        return Ok(());
    };
    let pool = build_thread_pool(n_threads)?;
    let mut staged = DoubleBuffer::new(S::Block::default(), S::Block::default());
    let mut outputs = DoubleBuffer::new(BlockOutputs::new(n_threads), BlockOutputs::new(n_threads));
    let mut pending: Option<&BlockPlan> = None;

    stage(ctx, first_idx, first, &mut *staged.compute_slot())?;

    for (i, &(block_idx, plan)) in blocks.iter().enumerate() {
        let next = blocks.get(i + 1);
        let latch = ErrorLatch::new();
        let (current, idle) = staged.split_prefetch();
        let (mut compute, flush_slot) = outputs.split();
        let BlockOutputs { parts, outputs: slots } = &mut *compute;
        *parts = partition(plan.len(), n_threads, granularity, plan.variants.start);

        let _span = info_span!("compute_block", block = block_idx, variants = plan.len()).entered();
        pool.in_place_scope(|scope| {
            for ((part, out), ws) in parts.iter().zip(slots.iter_mut()).zip(workspaces.iter_mut()) {
                if part.is_empty() {
                    continue;
                }
                let latch = &latch;
                scope.spawn(move |_| run_part(ctx, samples, worker, current, part, ws, out, latch));
            }

            if let Some(&(next_idx, next_plan)) = next {
                if !latch.is_set() {
                    if let Err(e) = stage(ctx, next_idx, next_plan, idle) {
                        latch.record(e);
                    }
                }
            }

            if let Some(prev) = pending {
                let _flush = info_span!("flush_block", variants = prev.len()).entered();
                if let Err(e) = flush(prev, &*flush_slot) {
                    latch.record(e);
                }
                if let Some(t) = ctx.telemetry {
                    t.block_flushed();
                }
            }
        });

        if let Some(err) = latch.into_error() {
            debug!(block = block_idx, "aborting export after first error");
            return Err(err);
        }
        staged.swap();
        outputs.swap();
        pending = Some(plan);
    }

    if let Some(prev) = pending {
        let _flush = info_span!("flush_block", variants = prev.len()).entered();
        flush(prev, &*outputs.flush_slot())?;
        if let Some(t) = ctx.telemetry {
            t.block_flushed();
        }
    }
    Ok(())
}

/// Body of one worker job
#[allow(clippy::too_many_arguments)]
fn run_part<S: GenotypeSource, W: BlockWorker>(
    ctx: &PipelineContext<'_, S>,
    samples: &SampleSubset,
    worker: &W,
    staged: &S::Block,
    part: &Range<usize>,
    ws: &mut ThreadWorkspace,
    out: &mut W::Output,
    latch: &ErrorLatch,
) {
    worker.begin(out, part);
    let mut done = 0u64;
    let result = (|| -> Result<()> {
        for export_idx in part.clone() {
            if latch.is_set() {
                return Ok(());
            }
            let variant = ctx.variants.get(export_idx);
            let record = &mut ws.record;
            record.reset(samples.len());
            if ctx.features.needs_extended_decode() {
                ctx.source
                    .decode_with_dosage_phase(staged, variant.raw_idx, samples, ctx.features, record)?;
            } else {
                ctx.source
                    .decode(staged, variant.raw_idx, samples, &mut record.genotypes)?;
            }
            record
                .validate()
                .map_err(|message| ExportError::read_failed(variant.raw_idx, message))?;

            let ploidy = ctx.chroms.ploidy_context(variant.chrom);
            let include = (ploidy == PloidyContext::ChrY).then_some(&samples.male_mask);
            ws.missing
                .update(&record.genotypes, Some(&record.dosage.present), include);

            if variant.needs_flip(ctx.alt_first) {
                record.flip_alleles();
            }
            let vctx = VariantContext {
                export_idx,
                variant,
                ploidy,
                sexes: &samples.sexes,
            };
            worker.process(&vctx, record, &mut ws.scratch, out)?;
            done += 1;
        }
        worker.finish(out, part)
    })();
    ws.missing.flush();
    if let Some(t) = ctx.telemetry {
        t.add_variants(done);
    }
    if let Err(e) = result {
        latch.record(e);
    }
}
