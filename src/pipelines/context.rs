//! # Pipeline Context and Planning
//!
//! Everything fixed before the first worker starts: the immutable context
//! shared by every thread, the block plan, and the memory plan that sizes
//! blocks (and, for the sample-major BED, sample passes).

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::data::{ChromTable, SampleTable, VariantTable};
use crate::error::{ExportError, Result};
use crate::io::source::{DecodeFeatures, GenotypeSource};
use crate::utils::telemetry::TelemetryBlackboard;

/// Raw variants per read block unless configured otherwise
pub const DEFAULT_READ_BLOCK_SIZE: usize = 65536;

/// Library-level run options
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Requested worker threads (clamped to `1..=MAX_EXPORT_THREADS`)
    pub threads: usize,
    /// Byte budget for block buffers and sample-major rows
    pub memory_limit: Option<usize>,
    /// Raw variant slots per block before memory planning
    pub read_block_size: usize,
    /// Meta lines copied into a VCF header
    pub vcf_passthrough: Vec<String>,
    pub telemetry: Option<Arc<TelemetryBlackboard>>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            memory_limit: None,
            read_block_size: DEFAULT_READ_BLOCK_SIZE,
            vcf_passthrough: Vec::new(),
            telemetry: None,
        }
    }
}

impl ExportOptions {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_read_block_size(mut self, size: usize) -> Self {
        self.read_block_size = size;
        self
    }
}

/// Read-only state shared by every worker of a run
pub struct PipelineContext<'a, S: GenotypeSource> {
    pub source: &'a S,
    pub samples: &'a SampleTable,
    pub variants: &'a VariantTable,
    pub chroms: &'a ChromTable,
    /// Decode channels the encoder consumes
    pub features: DecodeFeatures,
    /// The encoder prints ALT first
    pub alt_first: bool,
    pub threads: usize,
    pub telemetry: Option<&'a TelemetryBlackboard>,
}

/// One block: raw slots to stage and the export indices they hold
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockPlan {
    pub raw_range: Range<usize>,
    pub variants: Range<usize>,
}

impl BlockPlan {
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Cut the selection into read blocks of `read_block_size` raw slots.
///
/// Windows with no selected variant produce no block. The staged range is
/// narrowed to the selected variants of the window.
pub fn plan_blocks(variants: &VariantTable, read_block_size: usize) -> Vec<BlockPlan> {
    let rbs = read_block_size.max(1);
    let n = variants.len();
    let mut plans = Vec::new();
    let mut i = 0;
    while i < n {
        let window = variants.get(i).raw_idx / rbs;
        let start = i;
        while i < n && variants.get(i).raw_idx / rbs == window {
            i += 1;
        }
        plans.push(BlockPlan {
            raw_range: variants.get(start).raw_idx..variants.get(i - 1).raw_idx + 1,
            variants: start..i,
        });
    }
    plans
}

/// Block size and sample passes that fit the memory budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryPlan {
    pub read_block_size: usize,
    pub samples_per_pass: usize,
    pub passes: usize,
}

fn fit_block_size(budget: usize, requested: usize, per_variant: usize) -> Result<usize> {
    let mut rbs = requested.max(1);
    loop {
        let needed = rbs.saturating_mul(per_variant);
        if needed <= budget {
            return Ok(rbs);
        }
        if rbs == 1 {
            return Err(ExportError::out_of_memory("one block of variants", needed, budget));
        }
        rbs /= 2;
    }
}

impl MemoryPlan {
    /// Variant-major formats: two staged blocks plus two encoded blocks
    pub fn for_records(
        limit: Option<usize>,
        read_block_size: usize,
        staged_per_variant: usize,
        max_encoded_len: usize,
        sample_ct: usize,
    ) -> Result<Self> {
        let per_variant = 2 * (staged_per_variant + max_encoded_len);
        let read_block_size = match limit {
            Some(budget) => fit_block_size(budget, read_block_size, per_variant)?,
            None => read_block_size.max(1),
        };
        Ok(Self {
            read_block_size,
            samples_per_pass: sample_ct,
            passes: 1,
        })
    }

    /// Sample-major BED: blocks get half the budget, sample rows the rest.
    ///
    /// Every pass holds `samples_per_pass` output rows of
    /// `variant_ct.div_ceil(4)` bytes until the pass is written.
    pub fn for_transpose(
        limit: Option<usize>,
        read_block_size: usize,
        staged_per_variant: usize,
        sample_ct: usize,
        variant_ct: usize,
    ) -> Result<Self> {
        let out_row_bytes = variant_ct.div_ceil(4);
        // staged input plus variant-major rows and their transposed tile,
        // all double buffered
        let per_variant = 2 * staged_per_variant + 4 * sample_ct.div_ceil(4);
        let Some(budget) = limit else {
            return Ok(Self {
                read_block_size: read_block_size.max(1),
                samples_per_pass: sample_ct,
                passes: usize::from(sample_ct > 0),
            });
        };

        let read_block_size = fit_block_size(budget / 2, read_block_size, per_variant)?;
        let row_budget = budget - read_block_size.min(variant_ct.max(1)) * per_variant;
        let samples_per_pass = if out_row_bytes == 0 {
            sample_ct
        } else {
            (row_budget / out_row_bytes).min(sample_ct)
        };
        if samples_per_pass == 0 && sample_ct > 0 {
            return Err(ExportError::out_of_memory("one sample-major row", out_row_bytes, row_budget));
        }
        let passes = if sample_ct == 0 { 0 } else { sample_ct.div_ceil(samples_per_pass) };
        debug!(read_block_size, samples_per_pass, passes, "transpose memory plan");
        Ok(Self {
            read_block_size,
            samples_per_pass,
            passes,
        })
    }

    /// Output sample range of pass `pass`
    pub fn pass_range(&self, pass: usize, sample_ct: usize) -> Range<usize> {
        let start = pass * self.samples_per_pass;
        start..(start + self.samples_per_pass).min(sample_ct)
    }
}
