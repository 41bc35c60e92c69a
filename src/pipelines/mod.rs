//! # Pipeline Module
//!
//! Orchestrates one export: planning, the block scheduler, and the two
//! output paths (variant-major records and the sample-major BED transpose).

pub mod context;
pub mod export;
pub mod scheduler;
pub mod transpose;

pub use context::{plan_blocks, BlockPlan, ExportOptions, MemoryPlan, PipelineContext, DEFAULT_READ_BLOCK_SIZE};
pub use export::{export, EncodedChunk, ExportFormat, ExportSummary};
pub use scheduler::{partition, run_blocks, BlockOutputs, BlockWorker};
