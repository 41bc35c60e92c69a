//! # Sample Metadata
//!
//! The exported samples in output order, and the raw-index subset handed to
//! decoders.

use bitvec::prelude::*;

/// Zero-cost newtype for raw sample indices in the source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SampleIdx(pub u32);

impl SampleIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for SampleIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl From<SampleIdx> for usize {
    fn from(idx: SampleIdx) -> usize {
        idx.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    /// PLINK .fam encoding: 1 male, 2 female, anything else unknown
    pub fn from_code(code: &str) -> Self {
        match code {
            "1" => Sex::Male,
            "2" => Sex::Female,
            _ => Sex::Unknown,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "1",
            Sex::Female => "2",
            Sex::Unknown => "0",
        }
    }
}

/// One exported sample
#[derive(Clone, Debug)]
pub struct Sample {
    pub raw_idx: SampleIdx,
    pub fid: String,
    pub iid: String,
    pub father: String,
    pub mother: String,
    pub sex: Sex,
    pub phenotype: String,
}

impl Sample {
    pub fn new(raw_idx: usize, fid: &str, iid: &str, sex: Sex) -> Self {
        Self {
            raw_idx: SampleIdx::from(raw_idx),
            fid: fid.to_string(),
            iid: iid.to_string(),
            father: "0".to_string(),
            mother: "0".to_string(),
            sex,
            phenotype: "-9".to_string(),
        }
    }

    /// Single-token ID: IID alone when FID is a placeholder or repeats it
    pub fn output_id(&self) -> String {
        if self.fid == "0" || self.fid == self.iid {
            self.iid.clone()
        } else {
            format!("{}_{}", self.fid, self.iid)
        }
    }
}

/// Exported samples, sorted by raw index
#[derive(Clone, Debug, Default)]
pub struct SampleTable {
    samples: Vec<Sample>,
}

impl SampleTable {
    /// Build from samples; they are sorted by raw index so output order is
    /// always storage order
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.raw_idx);
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Sample {
        &self.samples[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn sexes(&self) -> Vec<Sex> {
        self.samples.iter().map(|s| s.sex).collect()
    }

    /// Subset covering every sample
    pub fn subset(&self) -> SampleSubset {
        self.subset_range(0, self.samples.len())
    }

    /// Subset covering output positions `start..end`
    pub fn subset_range(&self, start: usize, end: usize) -> SampleSubset {
        let slice = &self.samples[start..end];
        let mut male_mask = bitvec![u64, Lsb0; 0; slice.len()];
        for (i, s) in slice.iter().enumerate() {
            if s.sex == Sex::Male {
                male_mask.set(i, true);
            }
        }
        SampleSubset {
            raw_indices: slice.iter().map(|s| s.raw_idx.0).collect(),
            sexes: slice.iter().map(|s| s.sex).collect(),
            male_mask,
            offset: start,
        }
    }
}

/// Raw indices handed to decoders, plus per-sample sex for ploidy decisions
#[derive(Clone, Debug)]
pub struct SampleSubset {
    /// Strictly increasing raw sample indices
    pub raw_indices: Vec<u32>,
    pub sexes: Vec<Sex>,
    pub male_mask: BitVec<u64, Lsb0>,
    /// Output position of the first sample (non-zero for later BED passes)
    pub offset: usize,
}

impl SampleSubset {
    pub fn len(&self) -> usize {
        self.raw_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_indices.is_empty()
    }

    /// True when the subset is `0..raw_sample_ct` with nothing skipped
    pub fn is_identity(&self, raw_sample_ct: usize) -> bool {
        self.raw_indices.len() == raw_sample_ct
            && self
                .raw_indices
                .last()
                .is_none_or(|&last| last as usize == raw_sample_ct - 1)
    }
}
