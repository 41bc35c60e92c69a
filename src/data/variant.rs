//! # Variant Metadata
//!
//! The selected variants in storage order. Encoders never look at these
//! strings; the output coordinator interleaves them with encoded payloads.

use crate::data::ChromIdx;

/// Which stored allele is reported as REF
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RefAllele {
    /// Stored allele 0 (the usual case)
    #[default]
    First,
    /// Stored allele 1
    Second,
}

/// One selected variant
#[derive(Clone, Debug)]
pub struct Variant {
    /// Index in the source
    pub raw_idx: usize,
    pub chrom: ChromIdx,
    pub pos: u32,
    pub id: String,
    /// Stored allele 0
    pub allele0: String,
    /// Stored allele 1 onwards
    pub alt: Vec<String>,
    pub ref_allele: RefAllele,
}

impl Variant {
    pub fn new(raw_idx: usize, chrom: ChromIdx, pos: u32, id: &str, allele0: &str, allele1: &str) -> Self {
        Self {
            raw_idx,
            chrom,
            pos,
            id: id.to_string(),
            allele0: allele0.to_string(),
            alt: vec![allele1.to_string()],
            ref_allele: RefAllele::First,
        }
    }

    pub fn allele_ct(&self) -> usize {
        1 + self.alt.len()
    }

    /// Reported REF allele
    pub fn ref_str(&self) -> &str {
        match self.ref_allele {
            RefAllele::First => &self.allele0,
            RefAllele::Second => &self.alt[0],
        }
    }

    /// Reported first ALT allele
    pub fn alt_str(&self) -> &str {
        match self.ref_allele {
            RefAllele::First => &self.alt[0],
            RefAllele::Second => &self.allele0,
        }
    }

    /// Reported ALT column for VCF (comma-joined)
    pub fn alt_list(&self) -> String {
        let mut alts: Vec<&str> = Vec::with_capacity(self.alt.len());
        alts.push(self.alt_str());
        alts.extend(self.alt.iter().skip(1).map(String::as_str));
        alts.join(",")
    }

    /// Allele pair in output order for a format printing ALT first or REF first
    pub fn ordered_alleles(&self, alt_first: bool) -> (&str, &str) {
        if alt_first {
            (self.alt_str(), self.ref_str())
        } else {
            (self.ref_str(), self.alt_str())
        }
    }

    /// Whether decoded records must have allele roles swapped so that code 0
    /// means homozygous for the first printed allele
    #[inline]
    pub fn needs_flip(&self, alt_first: bool) -> bool {
        (self.ref_allele == RefAllele::Second) != alt_first
    }
}

/// Selected variants sorted by raw index
#[derive(Clone, Debug, Default)]
pub struct VariantTable {
    variants: Vec<Variant>,
}

impl VariantTable {
    pub fn new(mut variants: Vec<Variant>) -> Self {
        variants.sort_by_key(|v| v.raw_idx);
        Self { variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> &Variant {
        &self.variants[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter()
    }

    /// Chromosomes in order of first appearance
    pub fn chrom_order(&self) -> Vec<ChromIdx> {
        let mut seen = Vec::new();
        for v in &self.variants {
            if !seen.contains(&v.chrom) {
                seen.push(v.chrom);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allele_order() {
        let mut v = Variant::new(0, ChromIdx::new(0), 100, "rs1", "A", "G");
        assert_eq!(v.ordered_alleles(false), ("A", "G"));
        assert_eq!(v.ordered_alleles(true), ("G", "A"));
        assert!(!v.needs_flip(false));
        assert!(v.needs_flip(true));

        v.ref_allele = RefAllele::Second;
        assert_eq!(v.ordered_alleles(false), ("G", "A"));
        assert!(v.needs_flip(false));
        assert!(!v.needs_flip(true));
    }

    #[test]
    fn test_alt_list_keeps_extra_alleles() {
        let mut v = Variant::new(0, ChromIdx::new(0), 1, ".", "A", "C");
        v.alt.push("T".to_string());
        assert_eq!(v.alt_list(), "C,T");
        v.ref_allele = RefAllele::Second;
        assert_eq!(v.alt_list(), "A,T");
    }

    #[test]
    fn test_table_sorted() {
        let t = VariantTable::new(vec![
            Variant::new(5, ChromIdx::new(1), 1, "b", "A", "C"),
            Variant::new(2, ChromIdx::new(0), 1, "a", "A", "C"),
        ]);
        assert_eq!(t.get(0).id, "a");
        assert_eq!(t.chrom_order(), vec![ChromIdx::new(0), ChromIdx::new(1)]);
    }
}
