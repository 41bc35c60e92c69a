//! # I/O Module
//!
//! File boundaries of an export. Sources decode stored genotypes into
//! records; writers interleave variant metadata with encoded payloads and
//! write companion files.

pub mod bgen;
pub mod oxford;
pub mod plink1;
pub mod sink;
pub mod source;
pub mod vcf;

pub use bgen::{BgenLayout, BgenRecordWriter};
pub use oxford::{GenRecordWriter, HapsRecordWriter};
pub use plink1::{BedSource, Plink1Fileset, SampleIdList};
pub use sink::{ExportMeta, RecordWriter};
pub use source::{DecodeFeatures, DosageProvenance, GenotypeSource, MemorySource, MemoryVariant, SourceInfo};
pub use vcf::VcfRecordWriter;
