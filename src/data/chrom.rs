//! # Chromosome Table and Ploidy
//!
//! Chromosome names as written to output, plus the ploidy rules each one
//! implies for male and non-male samples.

use std::collections::HashMap;

use crate::data::sample::Sex;
use crate::data::ChromIdx;

/// How a chromosome is inherited
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromKind {
    Autosome,
    X,
    Y,
    /// Pseudo-autosomal region of X, diploid for everyone
    XY,
    Mt,
    /// Any other haploid contig (e.g. a haploid organism)
    Haploid,
}

impl ChromKind {
    /// Classify a chromosome by its name
    pub fn from_name(name: &str) -> Self {
        let bare = name
            .strip_prefix("chr")
            .or_else(|| name.strip_prefix("CHR"))
            .unwrap_or(name);
        match bare.to_ascii_uppercase().as_str() {
            "X" | "23" => ChromKind::X,
            "Y" | "24" => ChromKind::Y,
            "XY" | "25" | "PAR1" | "PAR2" => ChromKind::XY,
            "MT" | "M" | "26" => ChromKind::Mt,
            _ => ChromKind::Autosome,
        }
    }

    pub fn ploidy_context(self) -> PloidyContext {
        match self {
            ChromKind::Autosome | ChromKind::XY => PloidyContext::Diploid,
            ChromKind::X => PloidyContext::ChrX,
            ChromKind::Y => PloidyContext::ChrY,
            ChromKind::Mt | ChromKind::Haploid => PloidyContext::Haploid,
        }
    }
}

/// Ploidy rule for one variant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PloidyContext {
    Diploid,
    Haploid,
    /// Males haploid, everyone else diploid
    ChrX,
    /// Males haploid, everyone else absent
    ChrY,
}

impl PloidyContext {
    /// Ploidy of a sample of the given sex: 0, 1 or 2
    #[inline]
    pub fn sample_ploidy(self, sex: Sex) -> u8 {
        match self {
            PloidyContext::Diploid => 2,
            PloidyContext::Haploid => 1,
            PloidyContext::ChrX => {
                if sex == Sex::Male {
                    1
                } else {
                    2
                }
            }
            PloidyContext::ChrY => {
                if sex == Sex::Male {
                    1
                } else {
                    0
                }
            }
        }
    }

    /// True when every sample has ploidy 2
    pub fn is_diploid(self) -> bool {
        self == PloidyContext::Diploid
    }
}

/// One chromosome
#[derive(Clone, Debug)]
pub struct ChromInfo {
    pub name: String,
    pub kind: ChromKind,
    pub length: Option<u64>,
}

/// Chromosome names in first-seen order
#[derive(Clone, Debug, Default)]
pub struct ChromTable {
    chroms: Vec<ChromInfo>,
    by_name: HashMap<String, ChromIdx>,
}

impl ChromTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or add a chromosome by name
    pub fn intern(&mut self, name: &str) -> ChromIdx {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = ChromIdx::new(self.chroms.len() as u16);
        self.chroms.push(ChromInfo {
            name: name.to_string(),
            kind: ChromKind::from_name(name),
            length: None,
        });
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    pub fn get(&self, idx: ChromIdx) -> &ChromInfo {
        &self.chroms[idx.as_usize()]
    }

    pub fn name(&self, idx: ChromIdx) -> &str {
        &self.chroms[idx.as_usize()].name
    }

    pub fn index_of(&self, name: &str) -> Option<ChromIdx> {
        self.by_name.get(name).copied()
    }

    /// Override the inherited kind (e.g. for haploid organisms)
    pub fn set_kind(&mut self, idx: ChromIdx, kind: ChromKind) {
        self.chroms[idx.as_usize()].kind = kind;
    }

    pub fn set_length(&mut self, idx: ChromIdx, length: u64) {
        self.chroms[idx.as_usize()].length = Some(length);
    }

    pub fn ploidy_context(&self, idx: ChromIdx) -> PloidyContext {
        self.get(idx).kind.ploidy_context()
    }

    pub fn len(&self) -> usize {
        self.chroms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chroms.is_empty()
    }
}
