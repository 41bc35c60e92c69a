//! # gtexport Library
//!
//! Multithreaded export of 2-bit genotype matrices, with optional dosages
//! and phase, to VCF, BGEN v1.1/1.2/1.3, Oxford gen/haps/legend and
//! sample-major PLINK1 BED.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: Packed genotype records and sample/variant/chromosome tables
//! - `error`: Error types and result aliases
//! - `export`: Per-format payload encoders
//! - `io`: Genotype sources and output writers
//! - `model`: Decimal codec, missingness counters, transpose, BGEN tables
//! - `pipelines`: Block planning, the threaded scheduler and `export`
//! - `utils`: Double buffer, error latch, workspaces, telemetry

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use data::{ChromTable, Sample, SampleTable, Sex, Variant, VariantTable};
pub use error::{ExportError, Result};
pub use export::{BgenCompression, VcfDosageMode};
pub use io::{BedSource, GenotypeSource, MemorySource, MemoryVariant, Plink1Fileset};
pub use model::MissingCounts;
pub use pipelines::export::export;
pub use pipelines::{ExportFormat, ExportOptions, ExportSummary};
