//! # Oxford .gen / .haps Sample Fields
//!
//! `.gen` lines carry three genotype probabilities per sample; `.haps` and
//! `.hap` lines carry two 0/1 haplotype alleles per sample and therefore need
//! fully phased, non-missing calls.

use crate::data::{VariantRecord, HET, HOM_FIRST, HOM_SECOND};
use crate::error::{ExportError, Result};
use crate::export::vcf::write_probs_16384;
use crate::export::{require_biallelic, EncodeScratch, FormatEncoder, VariantContext};
use crate::io::source::DecodeFeatures;
use crate::model::decimal::{write_fixed, HAPLOID_DENOM, MAX_WIDTH};

/// `.gen` probability triples
#[derive(Clone, Debug)]
pub struct GenEncoder {
    ref_first: bool,
}

impl GenEncoder {
    pub fn new(ref_first: bool) -> Self {
        Self { ref_first }
    }
}

impl FormatEncoder for GenEncoder {
    fn name(&self) -> &'static str {
        "oxford"
    }

    fn required_decode_features(&self) -> DecodeFeatures {
        DecodeFeatures {
            phase: false,
            dosage: true,
            multiallelic: false,
        }
    }

    fn alt_first(&self) -> bool {
        !self.ref_first
    }

    fn max_encoded_len(&self, sample_ct: usize) -> usize {
        sample_ct * 3 * (1 + MAX_WIDTH)
    }

    fn encode_variant(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        _scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        require_biallelic(self.name(), vctx)?;
        let mut cursor = record.dosage.cursor();
        for s in 0..record.sample_ct() {
            out.push(b' ');
            let ploidy = vctx.ploidy.sample_ploidy(vctx.sexes[s]);
            match (cursor.next_for(s), ploidy) {
                (Some(entry), 1) => {
                    let d = entry.value as u32;
                    write_fixed(32768 - d, HAPLOID_DENOM, out);
                    out.extend_from_slice(b" 0 ");
                    write_fixed(d, HAPLOID_DENOM, out);
                }
                (Some(entry), _) => write_probs_16384(entry.value, b' ', out),
                (None, 0) => out.extend_from_slice(b"0 0 0"),
                (None, _) => out.extend_from_slice(match record.genotypes.code(s) {
                    HOM_FIRST => b"1 0 0",
                    HET => b"0 1 0",
                    HOM_SECOND => b"0 0 1",
                    _ => b"0 0 0",
                }),
            }
        }
        Ok(())
    }
}

/// `.haps` / `.hap` haplotype pairs
#[derive(Clone, Debug)]
pub struct HapsEncoder {
    ref_first: bool,
    legend: bool,
}

impl HapsEncoder {
    pub fn new(ref_first: bool, legend: bool) -> Self {
        Self { ref_first, legend }
    }
}

impl FormatEncoder for HapsEncoder {
    fn name(&self) -> &'static str {
        if self.legend {
            "hapslegend"
        } else {
            "haps"
        }
    }

    fn required_decode_features(&self) -> DecodeFeatures {
        DecodeFeatures {
            phase: true,
            dosage: false,
            multiallelic: false,
        }
    }

    fn alt_first(&self) -> bool {
        !self.ref_first
    }

    fn max_encoded_len(&self, sample_ct: usize) -> usize {
        sample_ct * 4
    }

    fn encode_variant(
        &self,
        vctx: &VariantContext<'_>,
        record: &VariantRecord,
        _scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        require_biallelic(self.name(), vctx)?;
        let g = &record.genotypes;
        for s in 0..record.sample_ct() {
            let ploidy = vctx.ploidy.sample_ploidy(vctx.sexes[s]);
            let code = g.code(s);
            let pair: &[u8; 4] = match (ploidy, code) {
                (0, _) => b" - -",
                (1, HOM_FIRST) => b" 0 -",
                (1, HOM_SECOND) => b" 1 -",
                (1, HET) => {
                    return Err(ExportError::inconsistent(
                        vctx.label(),
                        format!("heterozygous haploid call for sample {}", s + 1),
                    ))
                }
                (_, HOM_FIRST) => b" 0 0",
                (_, HOM_SECOND) => b" 1 1",
                (_, HET) => match g.phase_of(s) {
                    Some(false) => b" 0 1",
                    Some(true) => b" 1 0",
                    None => {
                        return Err(ExportError::inconsistent(
                            vctx.label(),
                            format!("unphased heterozygous call for sample {}", s + 1),
                        ))
                    }
                },
                _ => {
                    return Err(ExportError::inconsistent(
                        vctx.label(),
                        format!("missing call for sample {}", s + 1),
                    ))
                }
            };
            out.extend_from_slice(pair);
        }
        Ok(())
    }
}
