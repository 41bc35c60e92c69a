//! # Data Module
//!
//! In-memory representations of one exported variant and of the metadata
//! around it.
//!
//! ## Design
//! - **Bit-packed records:** genotypes are 2-bit codes in `u64` words with
//!   zeroed padding; phase and dosage presence are 1-bit sets.
//! - **Zero-cost newtypes:** `SampleIdx` and `ChromIdx` keep raw storage
//!   indices apart from output positions.
//! - **Sorted tables:** samples and variants are always held in storage order,
//!   which is also output order.

pub mod chrom;
pub mod genotype;
pub mod packed;
pub mod sample;
pub mod variant;

pub use chrom::{ChromInfo, ChromKind, ChromTable, PloidyContext};
pub use genotype::{
    DosageRecord, GenotypeRecord, PhaseRecord, SampleDosage, VariantRecord, DOSAGE_MAX,
    DOSAGE_MID, HET, HOM_FIRST, HOM_SECOND, MISSING,
};
pub use packed::PackedBits;
pub use sample::{Sample, SampleIdx, SampleSubset, SampleTable, Sex};
pub use variant::{RefAllele, Variant, VariantTable};

/// Chromosome identifier (0-based index into the chromosome table)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChromIdx(pub u16);

impl ChromIdx {
    pub fn new(idx: u16) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for ChromIdx {
    fn from(idx: u16) -> Self {
        Self(idx)
    }
}
